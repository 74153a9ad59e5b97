//! Snapshot lifecycle: list, create, delete and revert.
//!
//! Internal snapshots are handled entirely by the hypervisor. External ones
//! additionally involve delta files on disk: deleting removes the file after
//! the metadata, and reverting repoints the disk's source at a backing file
//! instead of calling a revert primitive.

use crate::backend::SnapshotBackend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::StorageLayout;
use crate::tree::SnapshotForest;
use crate::types::{
    DiskDevice, Domain, PendingSnapshot, RevertTarget, SnapshotId, SnapshotKind, SnapshotTable,
};
use crate::xml;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Runs snapshot operations against a backend
pub struct SnapshotManager<'a, B: SnapshotBackend> {
    backend: &'a B,
    config: &'a Config,
}

impl<'a, B: SnapshotBackend> SnapshotManager<'a, B> {
    pub fn new(backend: &'a B, config: &'a Config) -> Self {
        Self { backend, config }
    }

    pub fn layout(&self) -> StorageLayout<'a> {
        StorageLayout::new(self.config)
    }

    /// All domains, erroring with `NotFound` when there are none
    pub fn domains(&self) -> Result<Vec<Domain>> {
        let domains = self.backend.list_domains()?;
        if domains.is_empty() {
            return Err(Error::NotFound("domains"));
        }
        Ok(domains)
    }

    /// Find a domain by name
    pub fn domain(&self, name: &str) -> Result<Domain> {
        self.backend
            .list_domains()?
            .into_iter()
            .find(|d| d.name() == name)
            .ok_or_else(|| Error::DomainNotFound(name.to_string()))
    }

    pub fn is_active(&self, domain: &Domain) -> Result<bool> {
        self.backend.domain_is_active(domain)
    }

    /// Disk devices from the domain's current definition
    pub fn disks(&self, domain: &Domain) -> Result<Vec<DiskDevice>> {
        xml::parse_disks(&self.backend.domain_xml(domain)?)
    }

    /// Look up a disk by target name in the current definition
    pub fn disk(&self, domain: &Domain, target: &str) -> Result<DiskDevice> {
        self.disks(domain)?
            .into_iter()
            .find(|d| d.target == target)
            .ok_or_else(|| Error::DiskNotFound(target.to_string()))
    }

    /// Snapshot tables for both storage kinds
    #[instrument(skip(self), fields(domain = %domain))]
    pub fn list(&self, domain: &Domain) -> Result<SnapshotTable> {
        let external = SnapshotForest::load(self.backend, domain, SnapshotKind::External)?;
        let internal = SnapshotForest::load(self.backend, domain, SnapshotKind::Internal)?;

        Ok(SnapshotTable {
            external: external.rows(self.backend, domain)?,
            internal: internal.rows(self.backend, domain)?,
        })
    }

    /// External snapshots followed by internal ones, in listing order
    pub fn snapshots(&self, domain: &Domain) -> Result<Vec<SnapshotId>> {
        let mut all = self.backend.list_snapshots(domain, SnapshotKind::External)?;
        all.extend(self.backend.list_snapshots(domain, SnapshotKind::Internal)?);
        Ok(all)
    }

    /// Storage kind of a snapshot, from the kind-filtered listings.
    ///
    /// A snapshot found in neither listing (or both) means the hypervisor's
    /// view is inconsistent and the operation must not guess.
    pub fn kind_of(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<SnapshotKind> {
        let external = self
            .backend
            .list_snapshots(domain, SnapshotKind::External)?
            .contains(snapshot);
        let internal = self
            .backend
            .list_snapshots(domain, SnapshotKind::Internal)?
            .contains(snapshot);

        match (external, internal) {
            (true, false) => Ok(SnapshotKind::External),
            (false, true) => Ok(SnapshotKind::Internal),
            _ => Err(Error::AmbiguousSnapshotKind {
                domain: domain.name().to_string(),
                snapshot: snapshot.name().to_string(),
            }),
        }
    }

    /// Submit a snapshot descriptor
    ///
    /// External snapshots are disk-only and need exactly one disk, which is
    /// checked against the current definition before anything is submitted.
    #[instrument(skip(self, pending), fields(domain = %domain, snapshot = %pending.name, kind = %pending.kind))]
    pub fn create(&self, domain: &Domain, pending: &PendingSnapshot) -> Result<SnapshotId> {
        let disk_only = match pending.kind {
            SnapshotKind::Internal => false,
            SnapshotKind::External => {
                let target = pending.disk.as_deref().ok_or(Error::DiskRequired)?;
                self.disk(domain, target)?;
                true
            }
        };

        let descriptor = xml::snapshot_descriptor(pending)?;
        let id = self.backend.create_snapshot(domain, &descriptor, disk_only)?;

        info!(snapshot = %id, "Snapshot created");
        Ok(id)
    }

    /// Delete a snapshot, returning the delta file removed for external ones
    ///
    /// External metadata is deleted first; if the delta file then cannot be
    /// removed the result is `PartialDeleteFailure`.
    #[instrument(skip(self), fields(domain = %domain, snapshot = %snapshot))]
    pub fn delete(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Option<PathBuf>> {
        match self.kind_of(domain, snapshot)? {
            SnapshotKind::Internal => {
                self.backend.delete_snapshot(domain, snapshot, false)?;
                info!("Internal snapshot deleted");
                Ok(None)
            }
            SnapshotKind::External => {
                let children = self.backend.snapshot_children(domain, snapshot)?;
                if !children.is_empty() {
                    warn!(
                        children = children.len(),
                        "Deleting external snapshot that later snapshots are layered on"
                    );
                }

                self.backend.delete_snapshot(domain, snapshot, true)?;

                let path = self
                    .layout()
                    .remove_delta(domain, snapshot)
                    .map_err(|source| Error::PartialDeleteFailure {
                        snapshot: snapshot.name().to_string(),
                        path: self.layout().delta_file(domain, snapshot),
                        source,
                    })?;
                info!(path = %path.display(), "External snapshot deleted");
                Ok(Some(path))
            }
        }
    }

    /// Revert a domain to a snapshot or to its original base image
    ///
    /// `disk` names the target device to repoint and is only consulted for
    /// external snapshots and the original image.
    #[instrument(skip(self), fields(domain = %domain, target = %target))]
    pub fn revert(&self, domain: &Domain, target: &RevertTarget, disk: Option<&str>) -> Result<()> {
        if let RevertTarget::Snapshot(snapshot) = target {
            if self.kind_of(domain, snapshot)? == SnapshotKind::Internal {
                self.backend.revert_to_snapshot(domain, snapshot)?;
                info!("Reverted to internal snapshot");
                return Ok(());
            }
        }

        let disk = self.disk(domain, disk.ok_or(Error::DiskRequired)?)?;
        self.revert_disk(domain, target, &disk)
    }

    /// Point `disk` at the backing file for `target`, if that file exists
    fn revert_disk(&self, domain: &Domain, target: &RevertTarget, disk: &DiskDevice) -> Result<()> {
        if disk.source.is_none() {
            return Err(Error::MissingDiskSource(disk.target.clone()));
        }

        let layout = self.layout();
        let path = layout.backing_file(domain, target);
        layout.require_existing(&path)?;

        let device_xml = xml::with_source_file(&disk.xml, &path.to_string_lossy())?;
        self.backend.update_device(domain, &device_xml)?;

        info!(disk = %disk.target, path = %path.display(), "Disk repointed");
        Ok(())
    }
}
