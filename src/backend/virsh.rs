//! Backend driving the `virsh` command-line client

use crate::backend::SnapshotBackend;
use crate::error::{Error, Result};
use crate::types::{Domain, SnapshotId, SnapshotKind};
use crate::xml;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Snapshot backend built on `virsh -c <uri>`
///
/// Every call spawns virsh, so state is always read fresh from libvirtd.
pub struct VirshBackend {
    uri: String,
}

impl VirshBackend {
    /// Connect to the given URI, verifying libvirtd answers
    pub fn connect(uri: &str) -> Result<Self> {
        info!(uri = %uri, "Connecting to libvirt via virsh");
        let backend = Self {
            uri: uri.to_string(),
        };
        backend
            .virsh(&["uri"])
            .map_err(|e| Error::ConnectionFailed {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;
        Ok(backend)
    }

    /// Run virsh against the configured URI and return stdout
    fn virsh(&self, args: &[&str]) -> Result<String> {
        let output = self.virsh_output(args)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(Error::CommandFailed {
                command: format!("virsh -c {} {}", self.uri, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Run virsh, returning Ok(None) instead of an error on failure
    fn virsh_optional(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self.virsh_output(args)?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
        } else {
            Ok(None)
        }
    }

    fn virsh_output(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!(args = ?args, "Running virsh");
        Ok(Command::new("virsh")
            .arg("-c")
            .arg(&self.uri)
            .args(args)
            .output()?)
    }

    /// Write XML to a temporary file that lives as long as the handle
    fn xml_file(&self, contents: &str) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    /// Parse `--name` listings: one name per line, blank lines ignored
    fn parse_names(output: &str) -> Vec<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// `--current` updates the live domain when running and the
    /// persistent definition when shut off
    fn update_device_args<'a>(domain: &'a str, file: &'a str) -> [&'a str; 4] {
        ["update-device", domain, file, "--current"]
    }

    fn parse_snapshot_names(output: &str) -> Result<Vec<SnapshotId>> {
        Self::parse_names(output)
            .into_iter()
            .map(|name| SnapshotId::new(name).map_err(Error::Hypervisor))
            .collect()
    }
}

impl SnapshotBackend for VirshBackend {
    fn list_domains(&self) -> Result<Vec<Domain>> {
        let output = self.virsh(&["list", "--all", "--name"])?;
        Ok(Self::parse_names(&output)
            .into_iter()
            .map(Domain::new)
            .collect())
    }

    fn domain_is_active(&self, domain: &Domain) -> Result<bool> {
        let output = self.virsh(&["list", "--name"])?;
        Ok(Self::parse_names(&output)
            .iter()
            .any(|name| name == domain.name()))
    }

    fn domain_xml(&self, domain: &Domain) -> Result<String> {
        self.virsh(&["dumpxml", domain.name()])
    }

    fn list_snapshots(&self, domain: &Domain, kind: SnapshotKind) -> Result<Vec<SnapshotId>> {
        let filter = match kind {
            SnapshotKind::Internal => "--internal",
            SnapshotKind::External => "--external",
        };
        let output = self.virsh(&["snapshot-list", domain.name(), "--name", filter])?;
        Self::parse_snapshot_names(&output)
    }

    fn snapshot_parent(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Option<SnapshotId>> {
        let descriptor = self.virsh(&["snapshot-dumpxml", domain.name(), snapshot.name()])?;
        match xml::descriptor_parent(&descriptor)? {
            Some(name) => Ok(Some(SnapshotId::new(name).map_err(Error::Hypervisor)?)),
            None => Ok(None),
        }
    }

    fn snapshot_children(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Vec<SnapshotId>> {
        let output = self.virsh(&[
            "snapshot-list",
            domain.name(),
            "--from",
            snapshot.name(),
            "--name",
        ])?;
        Self::parse_snapshot_names(&output)
    }

    fn snapshot_is_current(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<bool> {
        // snapshot-current fails when the domain has no current snapshot
        let current = self.virsh_optional(&["snapshot-current", domain.name(), "--name"])?;
        Ok(current
            .map(|name| name.trim() == snapshot.name())
            .unwrap_or(false))
    }

    #[instrument(skip(self, descriptor), fields(domain = %domain))]
    fn create_snapshot(&self, domain: &Domain, descriptor: &str, disk_only: bool) -> Result<SnapshotId> {
        let name = xml::descriptor_name(descriptor)?
            .ok_or_else(|| Error::Xml("snapshot descriptor has no name".to_string()))?;
        let file = self.xml_file(descriptor)?;
        let path = file.path().to_string_lossy().to_string();

        let mut args = vec!["snapshot-create", domain.name(), "--xmlfile", path.as_str()];
        if disk_only {
            args.push("--disk-only");
        }
        self.virsh(&args)?;

        info!(snapshot = %name, "Snapshot created via virsh");
        SnapshotId::new(name).map_err(Error::Hypervisor)
    }

    #[instrument(skip(self), fields(domain = %domain, snapshot = %snapshot))]
    fn delete_snapshot(&self, domain: &Domain, snapshot: &SnapshotId, metadata_only: bool) -> Result<()> {
        let mut args = vec![
            "snapshot-delete",
            domain.name(),
            "--snapshotname",
            snapshot.name(),
        ];
        if metadata_only {
            args.push("--metadata");
        }
        self.virsh(&args)?;
        Ok(())
    }

    #[instrument(skip(self), fields(domain = %domain, snapshot = %snapshot))]
    fn revert_to_snapshot(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<()> {
        self.virsh(&[
            "snapshot-revert",
            domain.name(),
            "--snapshotname",
            snapshot.name(),
        ])?;
        Ok(())
    }

    #[instrument(skip(self, device_xml), fields(domain = %domain))]
    fn update_device(&self, domain: &Domain, device_xml: &str) -> Result<()> {
        let file = self.xml_file(device_xml)?;
        let path = file.path().to_string_lossy().to_string();
        self.virsh(&Self::update_device_args(domain.name(), &path))?;
        Ok(())
    }
}
