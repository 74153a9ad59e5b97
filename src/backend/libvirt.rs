//! Native libvirt backend.

use crate::backend::SnapshotBackend;
use crate::error::{Error, Result};
use crate::types::{Domain, SnapshotId, SnapshotKind};
use crate::xml;
use tracing::{info, instrument};
use virt::connect::Connect;
use virt::domain::Domain as VirtDomain;
use virt::domain_snapshot::DomainSnapshot;
use virt::sys;

fn hypervisor_error(e: virt::error::Error) -> Error {
    Error::Hypervisor(e.to_string())
}

/// Snapshot backend using the libvirt C API through the `virt` crate.
pub struct LibvirtBackend {
    connection: Connect,
}

impl LibvirtBackend {
    /// Open a connection to the specified URI.
    pub fn connect(uri: &str) -> Result<Self> {
        info!(uri = %uri, "Connecting to libvirt");

        let connection = Connect::open(Some(uri)).map_err(|e| Error::ConnectionFailed {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { connection })
    }

    fn lookup(&self, domain: &Domain) -> Result<VirtDomain> {
        VirtDomain::lookup_by_name(&self.connection, domain.name())
            .map_err(|e| Error::DomainNotFound(format!("{}: {}", domain, e)))
    }

    fn lookup_snapshot(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<DomainSnapshot> {
        let dom = self.lookup(domain)?;
        DomainSnapshot::lookup_by_name(&dom, snapshot.name(), 0)
            .map_err(|e| Error::SnapshotNotFound(format!("{}: {}", snapshot, e)))
    }

    fn ids(snapshots: Vec<DomainSnapshot>) -> Result<Vec<SnapshotId>> {
        snapshots
            .iter()
            .map(|s| {
                let name = s.get_name().map_err(hypervisor_error)?;
                SnapshotId::new(name).map_err(Error::Hypervisor)
            })
            .collect()
    }
}

impl SnapshotBackend for LibvirtBackend {
    fn list_domains(&self) -> Result<Vec<Domain>> {
        let domains = self
            .connection
            .list_all_domains(0)
            .map_err(hypervisor_error)?;
        domains
            .iter()
            .map(|d| d.get_name().map(Domain::new).map_err(hypervisor_error))
            .collect()
    }

    fn domain_is_active(&self, domain: &Domain) -> Result<bool> {
        self.lookup(domain)?.is_active().map_err(hypervisor_error)
    }

    fn domain_xml(&self, domain: &Domain) -> Result<String> {
        self.lookup(domain)?.get_xml_desc(0).map_err(hypervisor_error)
    }

    fn list_snapshots(&self, domain: &Domain, kind: SnapshotKind) -> Result<Vec<SnapshotId>> {
        let flags = match kind {
            SnapshotKind::Internal => sys::VIR_DOMAIN_SNAPSHOT_LIST_INTERNAL,
            SnapshotKind::External => sys::VIR_DOMAIN_SNAPSHOT_LIST_EXTERNAL,
        };
        let snapshots = self
            .lookup(domain)?
            .list_all_snapshots(flags)
            .map_err(hypervisor_error)?;
        Self::ids(snapshots)
    }

    fn snapshot_parent(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Option<SnapshotId>> {
        // virDomainSnapshotGetParent reports a missing parent as an error;
        // the descriptor tells roots apart without guessing at error codes.
        let descriptor = self
            .lookup_snapshot(domain, snapshot)?
            .get_xml_desc(0)
            .map_err(hypervisor_error)?;
        match xml::descriptor_parent(&descriptor)? {
            Some(name) => Ok(Some(SnapshotId::new(name).map_err(Error::Hypervisor)?)),
            None => Ok(None),
        }
    }

    fn snapshot_children(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Vec<SnapshotId>> {
        let children = self
            .lookup_snapshot(domain, snapshot)?
            .list_all_children(0)
            .map_err(hypervisor_error)?;
        Self::ids(children)
    }

    fn snapshot_is_current(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<bool> {
        self.lookup_snapshot(domain, snapshot)?
            .is_current(0)
            .map_err(hypervisor_error)
    }

    #[instrument(skip(self, descriptor), fields(domain = %domain))]
    fn create_snapshot(&self, domain: &Domain, descriptor: &str, disk_only: bool) -> Result<SnapshotId> {
        let flags = if disk_only {
            sys::VIR_DOMAIN_SNAPSHOT_CREATE_DISK_ONLY
        } else {
            0
        };
        let dom = self.lookup(domain)?;
        let snapshot = DomainSnapshot::create_xml(&dom, descriptor, flags).map_err(hypervisor_error)?;
        let name = snapshot.get_name().map_err(hypervisor_error)?;

        info!(snapshot = %name, "Snapshot created");
        SnapshotId::new(name).map_err(Error::Hypervisor)
    }

    #[instrument(skip(self), fields(domain = %domain, snapshot = %snapshot))]
    fn delete_snapshot(&self, domain: &Domain, snapshot: &SnapshotId, metadata_only: bool) -> Result<()> {
        let flags = if metadata_only {
            sys::VIR_DOMAIN_SNAPSHOT_DELETE_METADATA_ONLY
        } else {
            0
        };
        self.lookup_snapshot(domain, snapshot)?
            .delete(flags)
            .map(|_| ())
            .map_err(hypervisor_error)
    }

    #[instrument(skip(self), fields(domain = %domain, snapshot = %snapshot))]
    fn revert_to_snapshot(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<()> {
        self.lookup_snapshot(domain, snapshot)?
            .revert(0)
            .map(|_| ())
            .map_err(hypervisor_error)
    }

    #[instrument(skip(self, device_xml), fields(domain = %domain))]
    fn update_device(&self, domain: &Domain, device_xml: &str) -> Result<()> {
        self.lookup(domain)?
            .update_device_flags(device_xml, sys::VIR_DOMAIN_AFFECT_CURRENT)
            .map(|_| ())
            .map_err(hypervisor_error)
    }
}
