//! Libvirt XML descriptors: domain disks and snapshot definitions.

use crate::error::{Error, Result};
use crate::types::{DiskDevice, PendingSnapshot, SnapshotKind};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr.unescape_value().map_err(xml_error)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// A `<disk>` element being copied out of a domain definition
struct DiskCapture {
    writer: Writer<Vec<u8>>,
    depth: usize,
    source: Option<String>,
    driver_type: Option<String>,
    target: Option<String>,
}

impl DiskCapture {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            depth: 0,
            source: None,
            driver_type: None,
            target: None,
        }
    }

    /// Read attributes of the disk's direct children only; nested
    /// backingStore elements carry their own `source`.
    fn inspect(&mut self, e: &BytesStart<'_>) -> Result<()> {
        if self.depth != 1 {
            return Ok(());
        }
        match e.name().as_ref() {
            b"source" => self.source = attribute(e, "file")?,
            b"driver" => self.driver_type = attribute(e, "type")?,
            b"target" => self.target = attribute(e, "dev")?,
            _ => {}
        }
        Ok(())
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(xml_error)
    }

    fn finish(self) -> Result<Option<DiskDevice>> {
        let xml = String::from_utf8(self.writer.into_inner()).map_err(xml_error)?;
        Ok(self.target.map(|target| DiskDevice {
            source: self.source,
            driver_type: self.driver_type,
            target,
            xml,
        }))
    }
}

/// Extract every `<domain><devices><disk>` element from a domain definition.
///
/// Disks without a target device name are skipped.
pub fn parse_disks(domain_xml: &str) -> Result<Vec<DiskDevice>> {
    let mut reader = Reader::from_str(domain_xml);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut capture: Option<DiskCapture> = None;
    let mut disks = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let name = element_name(&e);
                if capture.is_none() && name == "disk" && path == ["domain", "devices"] {
                    capture = Some(DiskCapture::new());
                }
                if let Some(disk) = capture.as_mut() {
                    disk.inspect(&e)?;
                    disk.write(Event::Start(e))?;
                    disk.depth += 1;
                }
                path.push(name);
            }
            Event::Empty(e) => {
                if let Some(disk) = capture.as_mut() {
                    disk.inspect(&e)?;
                    disk.write(Event::Empty(e))?;
                }
            }
            Event::End(e) => {
                path.pop();
                if let Some(disk) = capture.as_mut() {
                    disk.write(Event::End(e))?;
                    disk.depth -= 1;
                    if disk.depth == 0 {
                        if let Some(done) = capture.take() {
                            disks.extend(done.finish()?);
                        }
                    }
                }
            }
            Event::Eof => break,
            other => {
                if let Some(disk) = capture.as_mut() {
                    disk.write(other)?;
                }
            }
        }
    }

    Ok(disks)
}

/// Return `disk_xml` with its direct `<source file=...>` pointed at `file`.
pub fn with_source_file(disk_xml: &str, file: &str) -> Result<String> {
    let mut reader = Reader::from_str(disk_xml);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut replaced = false;

    let rewrite = |e: &BytesStart<'_>| -> Result<BytesStart<'static>> {
        let mut source = BytesStart::new("source");
        for attr in e.attributes() {
            let attr = attr.map_err(xml_error)?;
            if attr.key.as_ref() != b"file" {
                source.push_attribute(attr);
            }
        }
        source.push_attribute(("file", file));
        Ok(source.into_owned())
    };

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        let event = match event {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 && e.name().as_ref() == b"source" {
                    replaced = true;
                    Event::Start(rewrite(&e)?)
                } else {
                    Event::Start(e)
                }
            }
            Event::Empty(e) if depth == 1 && e.name().as_ref() == b"source" => {
                replaced = true;
                Event::Empty(rewrite(&e)?)
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                Event::End(e)
            }
            Event::Eof => break,
            other => other,
        };
        writer.write_event(event).map_err(xml_error)?;
    }

    if !replaced {
        return Err(Error::Xml("disk element has no source".to_string()));
    }
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

/// Build the `<domainsnapshot>` descriptor submitted on create.
///
/// External snapshots carry a `<disks>` override marking the chosen device
/// `snapshot="external"`.
pub fn snapshot_descriptor(pending: &PendingSnapshot) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    let mut write = |event: Event<'_>| writer.write_event(event).map_err(xml_error);

    write(Event::Start(BytesStart::new("domainsnapshot")))?;

    write(Event::Start(BytesStart::new("name")))?;
    write(Event::Text(BytesText::new(pending.name.name())))?;
    write(Event::End(BytesEnd::new("name")))?;

    if let Some(description) = &pending.description {
        write(Event::Start(BytesStart::new("description")))?;
        write(Event::Text(BytesText::new(description)))?;
        write(Event::End(BytesEnd::new("description")))?;
    }

    if pending.kind == SnapshotKind::External {
        let disk = pending.disk.as_deref().ok_or(Error::DiskRequired)?;
        write(Event::Start(BytesStart::new("disks")))?;
        write(Event::Empty(
            BytesStart::new("disk").with_attributes([("name", disk), ("snapshot", "external")]),
        ))?;
        write(Event::End(BytesEnd::new("disks")))?;
    }

    write(Event::End(BytesEnd::new("domainsnapshot")))?;
    drop(write);

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

/// Text of the element at exactly `path` (root first), if present
fn text_at(xml: &str, wanted: &[&str]) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => path.push(element_name(&e)),
            Event::End(_) => {
                path.pop();
            }
            Event::Text(t) if path == wanted => {
                return Ok(Some(t.unescape().map_err(xml_error)?.into_owned()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Snapshot name from a `<domainsnapshot>` descriptor
pub fn descriptor_name(xml: &str) -> Result<Option<String>> {
    text_at(xml, &["domainsnapshot", "name"])
}

/// Parent snapshot name from a `<domainsnapshot>` descriptor
pub fn descriptor_parent(xml: &str) -> Result<Option<String>> {
    text_at(xml, &["domainsnapshot", "parent", "name"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SnapshotId;

    const DOMAIN: &str = r#"<domain type='kvm'>
  <name>vm1</name>
  <devices>
    <emulator>/usr/bin/qemu-system-x86_64</emulator>
    <disk type='file' device='disk'>
      <driver name='qemu' type='qcow2'/>
      <source file='/var/lib/libvirt/images/vm1.s1'/>
      <backingStore type='file'>
        <format type='qcow2'/>
        <source file='/var/lib/libvirt/images/vm1.qcow2'/>
      </backingStore>
      <target dev='vda' bus='virtio'/>
    </disk>
    <disk type='file' device='cdrom'>
      <driver name='qemu' type='raw'/>
      <target dev='sda' bus='sata'/>
      <readonly/>
    </disk>
  </devices>
</domain>"#;

    #[test]
    fn test_parse_disks() {
        let disks = parse_disks(DOMAIN).unwrap();

        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].target, "vda");
        assert_eq!(disks[0].driver_type.as_deref(), Some("qcow2"));
        assert_eq!(
            disks[0].source.as_deref(),
            Some("/var/lib/libvirt/images/vm1.s1")
        );
        assert!(disks[0].xml.starts_with("<disk"));
        assert!(disks[0].xml.ends_with("</disk>"));

        assert_eq!(disks[1].target, "sda");
        assert_eq!(disks[1].source, None);
    }

    #[test]
    fn test_parse_disks_without_devices() {
        let disks = parse_disks("<domain><name>empty</name></domain>").unwrap();
        assert!(disks.is_empty());
    }

    #[test]
    fn test_with_source_file_only_touches_direct_source() {
        let disks = parse_disks(DOMAIN).unwrap();
        let xml = with_source_file(&disks[0].xml, "/var/lib/libvirt/images/vm1.qcow2").unwrap();

        let reparsed = parse_disks(&format!("<domain><devices>{}</devices></domain>", xml)).unwrap();
        assert_eq!(
            reparsed[0].source.as_deref(),
            Some("/var/lib/libvirt/images/vm1.qcow2")
        );
        assert_eq!(xml.matches("vm1.qcow2").count(), 2);
        assert!(!xml.contains("vm1.s1"));
    }

    #[test]
    fn test_with_source_file_requires_source() {
        let disks = parse_disks(DOMAIN).unwrap();
        assert!(with_source_file(&disks[1].xml, "/tmp/x").is_err());
    }

    #[test]
    fn test_internal_descriptor() {
        let pending = PendingSnapshot::internal(SnapshotId::new("snap1").unwrap())
            .with_description("before <upgrade>");
        let xml = snapshot_descriptor(&pending).unwrap();

        assert_eq!(
            xml,
            "<domainsnapshot><name>snap1</name>\
             <description>before &lt;upgrade&gt;</description></domainsnapshot>"
        );
    }

    #[test]
    fn test_external_descriptor_marks_disk() {
        let pending = PendingSnapshot::external(SnapshotId::new("s1").unwrap(), "vda");
        let xml = snapshot_descriptor(&pending).unwrap();

        assert!(xml.contains(r#"<disks><disk name="vda" snapshot="external"/></disks>"#));
        assert!(!xml.contains("<description>"));
        assert_eq!(descriptor_name(&xml).unwrap().as_deref(), Some("s1"));
    }

    #[test]
    fn test_external_descriptor_without_disk() {
        let mut pending = PendingSnapshot::external(SnapshotId::new("s1").unwrap(), "vda");
        pending.disk = None;
        assert!(matches!(snapshot_descriptor(&pending), Err(Error::DiskRequired)));
    }

    #[test]
    fn test_descriptor_parent() {
        let xml = "<domainsnapshot><name>s2</name><parent><name>s1</name></parent>\
                   <domain><name>vm1</name></domain></domainsnapshot>";
        assert_eq!(descriptor_name(xml).unwrap().as_deref(), Some("s2"));
        assert_eq!(descriptor_parent(xml).unwrap().as_deref(), Some("s1"));

        let root = "<domainsnapshot><name>s1</name></domainsnapshot>";
        assert_eq!(descriptor_parent(root).unwrap(), None);
    }
}
