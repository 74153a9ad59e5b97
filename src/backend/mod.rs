//! Backend trait and implementations for hypervisor access

mod mock;
mod virsh;

#[cfg(feature = "libvirt")]
mod libvirt;

#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtBackend;
pub use mock::{MockBackend, MockCall, MockOperation};
pub use virsh::VirshBackend;

use crate::error::Result;
use crate::types::{Domain, SnapshotId, SnapshotKind};

/// Trait defining the hypervisor calls the snapshot engine relies on
///
/// Snapshot handles are names resolved against the domain on every call;
/// implementations must not cache ancestry between calls.
pub trait SnapshotBackend {
    // === Domains ===

    /// List all defined domains, running or not
    fn list_domains(&self) -> Result<Vec<Domain>>;

    /// Check if a domain is currently running
    fn domain_is_active(&self, domain: &Domain) -> Result<bool>;

    /// Get the domain's XML definition
    fn domain_xml(&self, domain: &Domain) -> Result<String>;

    // === Snapshot Queries ===

    /// List snapshots of one storage kind, in hypervisor order
    fn list_snapshots(&self, domain: &Domain, kind: SnapshotKind) -> Result<Vec<SnapshotId>>;

    /// Get a snapshot's parent, None for roots
    fn snapshot_parent(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Option<SnapshotId>>;

    /// List a snapshot's direct children, of any storage kind
    fn snapshot_children(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Vec<SnapshotId>>;

    /// Check if a snapshot is the domain's current snapshot
    fn snapshot_is_current(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<bool>;

    // === Snapshot Operations ===

    /// Create a snapshot from a `<domainsnapshot>` descriptor
    fn create_snapshot(&self, domain: &Domain, descriptor: &str, disk_only: bool) -> Result<SnapshotId>;

    /// Delete a snapshot; `metadata_only` leaves storage untouched
    fn delete_snapshot(&self, domain: &Domain, snapshot: &SnapshotId, metadata_only: bool) -> Result<()>;

    /// Atomically revert to an internal snapshot
    fn revert_to_snapshot(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<()>;

    // === Devices ===

    /// Apply a device definition to the domain's current state: the live
    /// domain when running, the persistent definition otherwise
    fn update_device(&self, domain: &Domain, device_xml: &str) -> Result<()>;
}
