//! domsnap: Manage libvirt domain snapshots
//!
//! Snapshots come in two storage kinds. Internal snapshots keep memory and
//! disk state inside the domain's image and are reverted by the hypervisor.
//! External snapshots are chains of delta files in a snapshot directory;
//! this library keeps those files consistent with the hypervisor's metadata.

pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod output;
pub mod prompt;
pub mod session;
pub mod storage;
pub mod tree;
pub mod types;
pub mod xml;

pub use backend::SnapshotBackend;
pub use config::Config;
pub use error::{Error, Result};
pub use manager::SnapshotManager;
pub use session::Session;
pub use types::{
    Action, DiskDevice, Domain, Outcome, PendingSnapshot, RevertTarget, SnapshotChoice, SnapshotId,
    SnapshotKind, SnapshotRow, SnapshotTable,
};
