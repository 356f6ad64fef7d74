//! Virtual disks attached to a guest for installation

use std::os::unix::fs::FileTypeExt;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Result;
use serde::Serialize;

use crate::xml_utils::XmlWriter;

/// Device class of a virtual disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskDevice {
    /// A plain block disk
    Disk,
    /// A CD-ROM drive
    Cdrom,
}

impl DiskDevice {
    /// The libvirt `device` attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Cdrom => "cdrom",
        }
    }
}

/// A disk description handed to guest definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VirtualDisk {
    /// Backing file or device
    pub path: Utf8PathBuf,
    /// Device class
    pub device: DiskDevice,
    /// Attach read-only
    pub read_only: bool,
    /// Discard guest writes when the domain stops
    pub transient: bool,
}

impl VirtualDisk {
    /// A read-only, transient disk exposing install media
    pub fn install_media(path: impl Into<Utf8PathBuf>, device: DiskDevice) -> Self {
        Self {
            path: path.into(),
            device,
            read_only: true,
            transient: true,
        }
    }

    /// Write the libvirt `<disk>` element for this disk
    pub fn write_xml(&self, writer: &mut XmlWriter, target_dev: &str, bus: &str) -> Result<()> {
        let (disk_type, source_attr) = if is_block_device(&self.path) {
            ("block", "dev")
        } else {
            ("file", "file")
        };

        writer.start_element("disk", &[("type", disk_type), ("device", self.device.as_str())])?;
        writer.write_empty_element("driver", &[("name", "qemu"), ("type", "raw")])?;
        writer.write_empty_element("source", &[(source_attr, self.path.as_str())])?;
        writer.write_empty_element("target", &[("dev", target_dev), ("bus", bus)])?;
        if self.read_only {
            writer.write_empty_element("readonly", &[])?;
        }
        if self.transient {
            writer.write_empty_element("transient", &[])?;
        }
        writer.end_element("disk")
    }
}

fn is_block_device(path: &Utf8Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.file_type().is_block_device())
}
