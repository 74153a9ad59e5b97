//! In-memory backend for testing and development.

use crate::backend::SnapshotBackend;
use crate::error::{Error, Result};
use crate::types::{Domain, SnapshotId, SnapshotKind};
use crate::xml;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, instrument};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    ListDomains,
    ListSnapshots,
    CreateSnapshot,
    DeleteSnapshot,
    RevertToSnapshot,
    UpdateDevice,
}

/// A mutating call received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateSnapshot {
        domain: String,
        descriptor: String,
        disk_only: bool,
    },
    DeleteSnapshot {
        domain: String,
        snapshot: String,
        metadata_only: bool,
    },
    RevertToSnapshot {
        domain: String,
        snapshot: String,
    },
    UpdateDevice {
        domain: String,
        device_xml: String,
    },
}

struct MockDisk {
    source: String,
    driver_type: String,
    target: String,
}

struct MockSnapshot {
    name: String,
    kind: SnapshotKind,
    parent: Option<String>,
}

#[derive(Default)]
struct MockDomain {
    active: bool,
    disks: Vec<MockDisk>,
    snapshots: Vec<MockSnapshot>,
    current: Option<String>,
}

impl MockDomain {
    fn snapshot(&self, name: &str) -> Result<&MockSnapshot> {
        self.snapshots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::SnapshotNotFound(name.to_string()))
    }

    fn xml(&self, name: &str) -> String {
        let disks: String = self
            .disks
            .iter()
            .map(|d| {
                format!(
                    "<disk type='file' device='disk'><driver name='qemu' type='{}'/>\
                     <source file='{}'/><target dev='{}' bus='virtio'/></disk>",
                    d.driver_type, d.source, d.target
                )
            })
            .collect();
        format!(
            "<domain type='kvm'><name>{}</name><devices>{}</devices></domain>",
            name, disks
        )
    }
}

/// Mock snapshot backend.
///
/// Domains and snapshots live in memory; parent links behave like libvirt's
/// (new snapshots hang off the current one, deleting a snapshot re-parents
/// its children). Mutating calls are recorded for inspection.
#[derive(Default)]
pub struct MockBackend {
    domains: RwLock<Vec<(String, MockDomain)>>,
    calls: RwLock<Vec<MockCall>>,
    failures: RwLock<HashMap<MockOperation, String>>,
    one_shot: RwLock<HashMap<MockOperation, String>>,
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Hypervisor("Lock poisoned".to_string())
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn domain_mut(&mut self, name: &str) -> &mut MockDomain {
        let domains = self.domains.get_mut().unwrap_or_else(PoisonError::into_inner);
        let index = match domains.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                domains.push((name.to_string(), MockDomain::default()));
                domains.len() - 1
            }
        };
        &mut domains[index].1
    }

    /// Add a domain
    pub fn with_domain(mut self, name: &str, active: bool) -> Self {
        self.domain_mut(name).active = active;
        self
    }

    /// Add a file-backed disk to a domain
    pub fn with_disk(mut self, domain: &str, source: &str, driver_type: &str, target: &str) -> Self {
        self.domain_mut(domain).disks.push(MockDisk {
            source: source.to_string(),
            driver_type: driver_type.to_string(),
            target: target.to_string(),
        });
        self
    }

    /// Add a snapshot with an explicit parent
    pub fn with_snapshot(mut self, domain: &str, name: &str, kind: SnapshotKind, parent: Option<&str>) -> Self {
        self.domain_mut(domain).snapshots.push(MockSnapshot {
            name: name.to_string(),
            kind,
            parent: parent.map(str::to_string),
        });
        self
    }

    /// Mark a snapshot as the domain's current one
    pub fn with_current(mut self, domain: &str, name: &str) -> Self {
        self.domain_mut(domain).current = Some(name.to_string());
        self
    }

    /// Make every later call of `operation` fail with `message`
    pub fn fail_on(&self, operation: MockOperation, message: &str) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, message.to_string());
    }

    /// Make only the next call of `operation` fail with `message`
    pub fn fail_once(&self, operation: MockOperation, message: &str) {
        self.one_shot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, message.to_string());
    }

    /// Mutating calls received so far, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded calls matching `operation`
    pub fn call_count(&self, operation: MockOperation) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    (operation, call),
                    (MockOperation::CreateSnapshot, MockCall::CreateSnapshot { .. })
                        | (MockOperation::DeleteSnapshot, MockCall::DeleteSnapshot { .. })
                        | (MockOperation::RevertToSnapshot, MockCall::RevertToSnapshot { .. })
                        | (MockOperation::UpdateDevice, MockCall::UpdateDevice { .. })
                )
            })
            .count()
    }

    fn check(&self, operation: MockOperation) -> Result<()> {
        if let Some(message) = self.one_shot.write().map_err(poisoned)?.remove(&operation) {
            return Err(Error::Hypervisor(message));
        }
        match self.failures.read().map_err(poisoned)?.get(&operation) {
            Some(message) => Err(Error::Hypervisor(message.clone())),
            None => Ok(()),
        }
    }

    fn record(&self, call: MockCall) -> Result<()> {
        debug!(?call, "Mock call");
        self.calls.write().map_err(poisoned)?.push(call);
        Ok(())
    }

    fn read<T>(&self, domain: &Domain, f: impl FnOnce(&MockDomain) -> Result<T>) -> Result<T> {
        let domains = self.domains.read().map_err(poisoned)?;
        let (_, found) = domains
            .iter()
            .find(|(name, _)| name == domain.name())
            .ok_or_else(|| Error::DomainNotFound(domain.name().to_string()))?;
        f(found)
    }

    fn write<T>(&self, domain: &Domain, f: impl FnOnce(&mut MockDomain) -> Result<T>) -> Result<T> {
        let mut domains = self.domains.write().map_err(poisoned)?;
        let (_, found) = domains
            .iter_mut()
            .find(|(name, _)| name == domain.name())
            .ok_or_else(|| Error::DomainNotFound(domain.name().to_string()))?;
        f(found)
    }
}

impl SnapshotBackend for MockBackend {
    fn list_domains(&self) -> Result<Vec<Domain>> {
        self.check(MockOperation::ListDomains)?;
        let domains = self.domains.read().map_err(poisoned)?;
        Ok(domains.iter().map(|(name, _)| Domain::new(name.clone())).collect())
    }

    fn domain_is_active(&self, domain: &Domain) -> Result<bool> {
        self.read(domain, |d| Ok(d.active))
    }

    fn domain_xml(&self, domain: &Domain) -> Result<String> {
        self.read(domain, |d| Ok(d.xml(domain.name())))
    }

    fn list_snapshots(&self, domain: &Domain, kind: SnapshotKind) -> Result<Vec<SnapshotId>> {
        self.check(MockOperation::ListSnapshots)?;
        self.read(domain, |d| {
            d.snapshots
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| SnapshotId::new(s.name.clone()).map_err(Error::Hypervisor))
                .collect()
        })
    }

    fn snapshot_parent(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Option<SnapshotId>> {
        self.read(domain, |d| match &d.snapshot(snapshot.name())?.parent {
            Some(parent) => Ok(Some(SnapshotId::new(parent.clone()).map_err(Error::Hypervisor)?)),
            None => Ok(None),
        })
    }

    fn snapshot_children(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<Vec<SnapshotId>> {
        self.read(domain, |d| {
            d.snapshot(snapshot.name())?;
            d.snapshots
                .iter()
                .filter(|s| s.parent.as_deref() == Some(snapshot.name()))
                .map(|s| SnapshotId::new(s.name.clone()).map_err(Error::Hypervisor))
                .collect()
        })
    }

    fn snapshot_is_current(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<bool> {
        self.read(domain, |d| Ok(d.current.as_deref() == Some(snapshot.name())))
    }

    #[instrument(skip(self, descriptor), fields(domain = %domain))]
    fn create_snapshot(&self, domain: &Domain, descriptor: &str, disk_only: bool) -> Result<SnapshotId> {
        self.check(MockOperation::CreateSnapshot)?;
        self.record(MockCall::CreateSnapshot {
            domain: domain.name().to_string(),
            descriptor: descriptor.to_string(),
            disk_only,
        })?;

        let name = xml::descriptor_name(descriptor)?
            .ok_or_else(|| Error::Xml("snapshot descriptor has no name".to_string()))?;
        let id = SnapshotId::new(name.clone()).map_err(Error::Hypervisor)?;

        self.write(domain, |d| {
            if d.snapshots.iter().any(|s| s.name == name) {
                return Err(Error::Hypervisor(format!("snapshot '{}' already exists", name)));
            }
            let kind = if disk_only {
                SnapshotKind::External
            } else {
                SnapshotKind::Internal
            };
            d.snapshots.push(MockSnapshot {
                name: name.clone(),
                kind,
                parent: d.current.clone(),
            });
            d.current = Some(name.clone());
            Ok(())
        })?;

        Ok(id)
    }

    #[instrument(skip(self), fields(domain = %domain, snapshot = %snapshot))]
    fn delete_snapshot(&self, domain: &Domain, snapshot: &SnapshotId, metadata_only: bool) -> Result<()> {
        self.check(MockOperation::DeleteSnapshot)?;
        self.record(MockCall::DeleteSnapshot {
            domain: domain.name().to_string(),
            snapshot: snapshot.name().to_string(),
            metadata_only,
        })?;

        self.write(domain, |d| {
            let parent = d.snapshot(snapshot.name())?.parent.clone();
            d.snapshots.retain(|s| s.name != snapshot.name());
            for child in d.snapshots.iter_mut() {
                if child.parent.as_deref() == Some(snapshot.name()) {
                    child.parent = parent.clone();
                }
            }
            if d.current.as_deref() == Some(snapshot.name()) {
                d.current = parent;
            }
            Ok(())
        })
    }

    #[instrument(skip(self), fields(domain = %domain, snapshot = %snapshot))]
    fn revert_to_snapshot(&self, domain: &Domain, snapshot: &SnapshotId) -> Result<()> {
        self.check(MockOperation::RevertToSnapshot)?;
        self.record(MockCall::RevertToSnapshot {
            domain: domain.name().to_string(),
            snapshot: snapshot.name().to_string(),
        })?;

        self.write(domain, |d| {
            d.snapshot(snapshot.name())?;
            d.current = Some(snapshot.name().to_string());
            Ok(())
        })
    }

    #[instrument(skip(self, device_xml), fields(domain = %domain))]
    fn update_device(&self, domain: &Domain, device_xml: &str) -> Result<()> {
        self.check(MockOperation::UpdateDevice)?;
        self.record(MockCall::UpdateDevice {
            domain: domain.name().to_string(),
            device_xml: device_xml.to_string(),
        })?;

        let updated = xml::parse_disks(&format!(
            "<domain><devices>{}</devices></domain>",
            device_xml
        ))?;
        self.write(domain, |d| {
            for new in updated {
                let disk = d
                    .disks
                    .iter_mut()
                    .find(|disk| disk.target == new.target)
                    .ok_or_else(|| Error::DiskNotFound(new.target.clone()))?;
                if let Some(source) = new.source {
                    disk.source = source;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MockBackend {
        MockBackend::new()
            .with_domain("vm1", false)
            .with_snapshot("vm1", "s1", SnapshotKind::Internal, None)
            .with_snapshot("vm1", "s2", SnapshotKind::Internal, Some("s1"))
            .with_current("vm1", "s2")
    }

    #[test]
    fn test_create_hangs_off_current() {
        let backend = backend();
        let vm1 = Domain::new("vm1");
        let id = backend
            .create_snapshot(&vm1, "<domainsnapshot><name>s3</name></domainsnapshot>", false)
            .unwrap();

        assert_eq!(id.name(), "s3");
        assert_eq!(backend.snapshot_parent(&vm1, &id).unwrap().unwrap().name(), "s2");
        assert!(backend.snapshot_is_current(&vm1, &id).unwrap());
        assert_eq!(backend.call_count(MockOperation::CreateSnapshot), 1);
    }

    #[test]
    fn test_delete_reparents_children() {
        let backend = backend()
            .with_snapshot("vm1", "s3", SnapshotKind::Internal, Some("s2"));
        let vm1 = Domain::new("vm1");
        let s2 = SnapshotId::new("s2").unwrap();
        let s3 = SnapshotId::new("s3").unwrap();

        backend.delete_snapshot(&vm1, &s2, false).unwrap();

        assert_eq!(backend.snapshot_parent(&vm1, &s3).unwrap().unwrap().name(), "s1");
        assert!(backend
            .snapshot_is_current(&vm1, &SnapshotId::new("s1").unwrap())
            .unwrap());
    }

    #[test]
    fn test_injected_failure() {
        let backend = backend();
        backend.fail_on(MockOperation::RevertToSnapshot, "domain is locked");

        let err = backend
            .revert_to_snapshot(&Domain::new("vm1"), &SnapshotId::new("s1").unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "Hypervisor error: domain is locked");
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_one_shot_failure() {
        let backend = backend();
        backend.fail_once(MockOperation::ListDomains, "connection reset");

        assert!(backend.list_domains().is_err());
        assert_eq!(backend.list_domains().unwrap(), vec![Domain::new("vm1")]);
    }

    #[test]
    fn test_unknown_domain() {
        let backend = backend();
        assert!(matches!(
            backend.domain_xml(&Domain::new("nope")),
            Err(Error::DomainNotFound(_))
        ));
    }
}
