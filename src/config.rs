//! Process-wide configuration

use std::path::PathBuf;

/// Settings fixed at startup and shared by reference
#[derive(Debug, Clone)]
pub struct Config {
    /// Hypervisor connection URI (e.g., qemu:///system)
    pub uri: String,
    /// Directory holding external snapshot delta files and base images
    pub snapshot_dir: PathBuf,
    /// Suffix of the base image, used in place of a snapshot name
    pub base_image_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uri: "qemu:///system".to_string(),
            snapshot_dir: PathBuf::from("/var/lib/libvirt/images"),
            base_image_suffix: "qcow2".to_string(),
        }
    }
}

impl Config {
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }
}
