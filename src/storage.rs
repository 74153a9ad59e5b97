//! File layout of external snapshot chains
//!
//! Delta files live at `{snapshot_dir}/{domain}.{snapshot}`; the base image
//! of a chain uses the configured suffix in place of the snapshot name.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Domain, RevertTarget, SnapshotId};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves backing file paths from the configured snapshot directory
#[derive(Debug, Clone, Copy)]
pub struct StorageLayout<'a> {
    config: &'a Config,
}

impl<'a> StorageLayout<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Delta file written by the hypervisor for an external snapshot
    pub fn delta_file(&self, domain: &Domain, snapshot: &SnapshotId) -> PathBuf {
        self.file_for(domain, snapshot.name())
    }

    /// Pristine image underneath every external snapshot of the domain
    pub fn base_image(&self, domain: &Domain) -> PathBuf {
        self.file_for(domain, &self.config.base_image_suffix)
    }

    /// File a revert to `target` would point the disk at
    pub fn backing_file(&self, domain: &Domain, target: &RevertTarget) -> PathBuf {
        match target {
            RevertTarget::Snapshot(id) => self.delta_file(domain, id),
            RevertTarget::Original => self.base_image(domain),
        }
    }

    /// Fail with `MissingBackingFile` unless `path` exists
    pub fn require_existing(&self, path: &Path) -> Result<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(Error::MissingBackingFile(path.to_path_buf()))
        }
    }

    /// Remove the delta file of a deleted external snapshot
    pub fn remove_delta(&self, domain: &Domain, snapshot: &SnapshotId) -> std::io::Result<PathBuf> {
        let path = self.delta_file(domain, snapshot);
        debug!(path = %path.display(), "Removing snapshot delta file");
        fs::remove_file(&path)?;
        Ok(path)
    }

    fn file_for(&self, domain: &Domain, suffix: &str) -> PathBuf {
        self.config
            .snapshot_dir
            .join(format!("{}.{}", domain.name(), suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm1() -> Domain {
        Domain::new("vm1")
    }

    #[test]
    fn test_delta_file_path() {
        let config = Config::default();
        let layout = StorageLayout::new(&config);
        let snap = SnapshotId::new("s1").unwrap();

        assert_eq!(
            layout.delta_file(&vm1(), &snap),
            PathBuf::from("/var/lib/libvirt/images/vm1.s1")
        );
    }

    #[test]
    fn test_original_uses_base_suffix() {
        let config = Config::default();
        let layout = StorageLayout::new(&config);

        assert_eq!(
            layout.backing_file(&vm1(), &RevertTarget::Original),
            PathBuf::from("/var/lib/libvirt/images/vm1.qcow2")
        );
    }

    #[test]
    fn test_require_existing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_snapshot_dir(dir.path());
        let layout = StorageLayout::new(&config);
        let path = layout.base_image(&vm1());

        match layout.require_existing(&path) {
            Err(Error::MissingBackingFile(p)) => assert_eq!(p, path),
            other => panic!("unexpected result: {:?}", other),
        }

        fs::write(&path, b"").unwrap();
        assert!(layout.require_existing(&path).is_ok());
    }

    #[test]
    fn test_remove_delta() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_snapshot_dir(dir.path());
        let layout = StorageLayout::new(&config);
        let snap = SnapshotId::new("s1").unwrap();
        let path = dir.path().join("vm1.s1");
        fs::write(&path, b"delta").unwrap();

        assert_eq!(layout.remove_delta(&vm1(), &snap).unwrap(), path);
        assert!(!path.exists());
        assert!(layout.remove_delta(&vm1(), &snap).is_err());
    }
}
