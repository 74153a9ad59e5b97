//! Snapshot ancestry reconstructed from flat hypervisor queries.
//!
//! A forest holds the snapshots of one storage kind for one domain. It is
//! rebuilt on every operation and never cached, since snapshots may be
//! created or deleted outside this tool between calls.

use crate::backend::SnapshotBackend;
use crate::error::Result;
use crate::types::{Domain, SnapshotId, SnapshotKind, SnapshotRow};
use std::collections::HashSet;
use tracing::debug;

/// A snapshot and the children the hypervisor reports for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    pub id: SnapshotId,
    /// Direct children of any storage kind
    pub children: Vec<SnapshotId>,
    pub current: bool,
}

/// Roots of a snapshot set: nodes no node in the set names as a child.
///
/// Children are taken from each node's own child list rather than from
/// parent pointers, so a node whose parent lies outside the set is a root.
/// Any number of roots is valid; listing order is preserved.
pub fn resolve_roots(nodes: &[SnapshotNode]) -> Vec<&SnapshotNode> {
    let children: HashSet<&SnapshotId> = nodes.iter().flat_map(|n| n.children.iter()).collect();
    nodes.iter().filter(|n| !children.contains(&n.id)).collect()
}

/// Snapshots of one storage kind for one domain
#[derive(Debug, Clone)]
pub struct SnapshotForest {
    nodes: Vec<SnapshotNode>,
}

impl SnapshotForest {
    pub fn new(nodes: Vec<SnapshotNode>) -> Self {
        Self { nodes }
    }

    /// Query the backend for the domain's snapshots of `kind`
    pub fn load(backend: &impl SnapshotBackend, domain: &Domain, kind: SnapshotKind) -> Result<Self> {
        let mut nodes = Vec::new();
        for id in backend.list_snapshots(domain, kind)? {
            let children = backend.snapshot_children(domain, &id)?;
            let current = backend.snapshot_is_current(domain, &id)?;
            nodes.push(SnapshotNode {
                id,
                children,
                current,
            });
        }
        debug!(domain = %domain, kind = %kind, count = nodes.len(), "Loaded snapshot forest");
        Ok(Self { nodes })
    }

    pub fn roots(&self) -> Vec<&SnapshotId> {
        resolve_roots(&self.nodes).into_iter().map(|n| &n.id).collect()
    }

    /// Table rows in listing order; roots render without a parent
    pub fn rows(&self, backend: &impl SnapshotBackend, domain: &Domain) -> Result<Vec<SnapshotRow>> {
        let roots: HashSet<&SnapshotId> = self.roots().into_iter().collect();
        let mut rows = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let parent = if roots.contains(&node.id) {
                None
            } else {
                backend.snapshot_parent(domain, &node.id)?
            };
            rows.push(SnapshotRow {
                name: node.id.clone(),
                parent,
                current: node.current,
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> SnapshotId {
        SnapshotId::new(name).unwrap()
    }

    fn node(name: &str, children: &[&str]) -> SnapshotNode {
        SnapshotNode {
            id: id(name),
            children: children.iter().map(|c| id(c)).collect(),
            current: false,
        }
    }

    fn root_names(nodes: &[SnapshotNode]) -> Vec<&str> {
        resolve_roots(nodes).iter().map(|n| n.id.name()).collect()
    }

    #[test]
    fn test_linear_chain_has_one_root() {
        let nodes = vec![
            node("s3", &["s4"]),
            node("s1", &["s2"]),
            node("s4", &[]),
            node("s2", &["s3"]),
        ];
        assert_eq!(root_names(&nodes), vec!["s1"]);
    }

    #[test]
    fn test_empty_set_has_no_roots() {
        assert!(resolve_roots(&[]).is_empty());
    }

    #[test]
    fn test_multiple_roots_are_tolerated() {
        let nodes = vec![node("a", &["b"]), node("b", &[]), node("c", &["d"]), node("d", &[])];
        assert_eq!(root_names(&nodes), vec!["a", "c"]);
    }

    #[test]
    fn test_parent_outside_set_makes_root() {
        // "ext2" hangs off an internal snapshot not present in this set
        let nodes = vec![node("ext2", &["ext3"]), node("ext3", &[])];
        assert_eq!(root_names(&nodes), vec!["ext2"]);
    }

    #[test]
    fn test_children_outside_set_are_ignored() {
        let nodes = vec![node("a", &["elsewhere"]), node("b", &[])];
        assert_eq!(root_names(&nodes), vec!["a", "b"]);
    }

    #[test]
    fn test_branching_tree() {
        let nodes = vec![
            node("base", &["left", "right"]),
            node("left", &[]),
            node("right", &["leaf"]),
            node("leaf", &[]),
        ];
        let forest = SnapshotForest::new(nodes);

        assert_eq!(forest.roots(), vec![&id("base")]);
    }
}
