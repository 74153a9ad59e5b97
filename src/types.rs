//! Core types for snapshot management

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A libvirt domain, identified by its name within a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Domain(String);

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Domain(name.into())
    }

    /// Get the domain name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a snapshot's state is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Memory and disk state embedded in the domain's disk image
    Internal,
    /// Disk state captured as a delta file layered on the previous image
    External,
}

impl SnapshotKind {
    /// Kinds in the order they are listed to the operator
    pub const ALL: [SnapshotKind; 2] = [SnapshotKind::External, SnapshotKind::Internal];

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Internal => "internal",
            SnapshotKind::External => "external",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A snapshot name, unique within a domain
///
/// Two ids compare equal when their names do; kind scoping is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Create a new snapshot id from a name
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Snapshot name cannot be empty".to_string());
        }
        if name.contains('/') {
            return Err("Snapshot name cannot contain '/'".to_string());
        }
        Ok(SnapshotId(name))
    }

    /// Get the snapshot name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SnapshotId::new(s)
    }
}

/// One disk device from a domain definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskDevice {
    /// Backing file path, absent for empty drives
    pub source: Option<String>,
    /// Image format reported by the driver element (e.g. qcow2)
    pub driver_type: Option<String>,
    /// Guest target device name (e.g. vda)
    pub target: String,
    /// The `<disk>` element as it appears in the domain definition
    #[serde(skip)]
    pub xml: String,
}

impl DiskDevice {
    /// Display triple: source, driver type, target
    pub fn label(&self) -> String {
        format!(
            "{}, {}, {}",
            self.source.as_deref().unwrap_or("None"),
            self.driver_type.as_deref().unwrap_or("None"),
            self.target
        )
    }
}

/// A listed snapshot with its resolved parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRow {
    pub name: SnapshotId,
    /// None for roots of the forest
    pub parent: Option<SnapshotId>,
    pub current: bool,
}

/// Result of listing a domain's snapshots, one table per storage kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotTable {
    pub external: Vec<SnapshotRow>,
    pub internal: Vec<SnapshotRow>,
}

impl SnapshotTable {
    pub fn rows(&self, kind: SnapshotKind) -> &[SnapshotRow] {
        match kind {
            SnapshotKind::External => &self.external,
            SnapshotKind::Internal => &self.internal,
        }
    }
}

/// What the operator picked from a snapshot menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotChoice {
    Existing(SnapshotId),
    /// The pristine base image under an external chain
    RevertToOriginal,
    /// Nothing was available to choose from
    NoneFound,
}

/// Where a revert should point the domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertTarget {
    Snapshot(SnapshotId),
    Original,
}

impl fmt::Display for RevertTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertTarget::Snapshot(id) => write!(f, "{}", id),
            RevertTarget::Original => write!(f, "original base image"),
        }
    }
}

/// Snapshot descriptor assembled before submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub name: SnapshotId,
    pub description: Option<String>,
    pub kind: SnapshotKind,
    /// Target device to snapshot; required for external snapshots
    pub disk: Option<String>,
}

impl PendingSnapshot {
    pub fn internal(name: SnapshotId) -> Self {
        Self {
            name,
            description: None,
            kind: SnapshotKind::Internal,
            disk: None,
        }
    }

    pub fn external(name: SnapshotId, disk: impl Into<String>) -> Self {
        Self {
            name,
            description: None,
            kind: SnapshotKind::External,
            disk: Some(disk.into()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }
}

/// Operator actions offered for a selected domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Create,
    Revert,
    Delete,
    Exit,
}

impl Action {
    /// All actions, in menu order
    pub const ALL: [Action; 5] = [
        Action::List,
        Action::Create,
        Action::Revert,
        Action::Delete,
        Action::Exit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Action::List => "List snapshots",
            Action::Create => "Create snapshot",
            Action::Revert => "Revert snapshot",
            Action::Delete => "Delete snapshot",
            Action::Exit => "Exit",
        }
    }

    /// Whether the action changes hypervisor or filesystem state
    pub fn is_mutating(&self) -> bool {
        matches!(self, Action::Create | Action::Revert | Action::Delete)
    }
}

/// How an action finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Listed(SnapshotTable),
    Created(SnapshotId),
    Deleted {
        snapshot: SnapshotId,
        removed_file: Option<PathBuf>,
    },
    Reverted(RevertTarget),
    /// No snapshots were available for the action
    NothingFound,
    /// The operator declined to continue
    Abandoned,
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_id_rejects_blank_names() {
        assert!(SnapshotId::new("").is_err());
        assert!(SnapshotId::new("   ").is_err());
        assert!(SnapshotId::new("a/b").is_err());
        assert_eq!(SnapshotId::new("snap1").unwrap().name(), "snap1");
    }

    #[test]
    fn test_description_empty_is_none() {
        let id = SnapshotId::new("s").unwrap();
        let pending = PendingSnapshot::internal(id).with_description("");
        assert_eq!(pending.description, None);
    }

    #[test]
    fn test_disk_label_uses_placeholders() {
        let disk = DiskDevice {
            source: None,
            driver_type: Some("raw".to_string()),
            target: "sda".to_string(),
            xml: String::new(),
        };
        assert_eq!(disk.label(), "None, raw, sda");
    }

    #[test]
    fn test_only_list_and_exit_are_read_only() {
        let mutating: Vec<_> = Action::ALL.iter().filter(|a| a.is_mutating()).collect();
        assert_eq!(mutating, [&Action::Create, &Action::Revert, &Action::Delete]);
    }
}
