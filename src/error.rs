//! Error types for domsnap

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for domsnap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing snapshots
#[derive(Error, Debug)]
pub enum Error {
    #[error("No {0} found")]
    NotFound(&'static str),

    #[error("Domain '{0}' not found")]
    DomainNotFound(String),

    #[error("Snapshot '{0}' not found")]
    SnapshotNotFound(String),

    #[error("Disk '{0}' not found in domain definition")]
    DiskNotFound(String),

    #[error("Invalid snapshot name: {0}")]
    InvalidName(String),

    #[error("External snapshots require a target disk")]
    DiskRequired,

    #[error("Disk '{0}' has no source file")]
    MissingDiskSource(String),

    #[error("Could not determine snapshot type of '{snapshot}' in domain '{domain}'")]
    AmbiguousSnapshotKind { domain: String, snapshot: String },

    #[error("Backing file {} does not exist", .0.display())]
    MissingBackingFile(PathBuf),

    #[error(
        "Snapshot '{snapshot}' metadata was deleted but {} could not be removed: {source}",
        path.display()
    )]
    PartialDeleteFailure {
        snapshot: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Hypervisor error: {0}")]
    Hypervisor(String),

    #[error("Command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to connect to '{uri}': {reason}")]
    ConnectionFailed { uri: String, reason: String },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input closed")]
    EndOfInput,
}

impl Error {
    /// Whether the error came back from the hypervisor itself
    pub fn is_hypervisor_failure(&self) -> bool {
        matches!(self, Error::Hypervisor(_) | Error::CommandFailed { .. })
    }
}
