//! Guest architecture configuration
//!
//! Fetchers need the guest architecture to pick the right kernel, and the
//! boot descriptor needs the matching machine type. The default guest
//! architecture is the host's.

use color_eyre::{eyre::eyre, Result};

use crate::xml_utils::XmlWriter;

/// Architecture configuration for a guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchConfig {
    /// Architecture string for libvirt (e.g., "x86_64", "aarch64")
    pub arch: &'static str,
    /// Machine type for libvirt (e.g., "q35", "virt")
    pub machine: &'static str,
    /// OS type for libvirt (usually "hvm")
    pub os_type: &'static str,
}

impl ArchConfig {
    /// Configuration for a named guest architecture
    pub fn for_arch(arch: &str) -> Result<Self> {
        match arch {
            "x86_64" => Ok(Self {
                arch: "x86_64",
                machine: "q35",
                os_type: "hvm",
            }),
            "i686" | "i386" => Ok(Self {
                arch: "i686",
                machine: "pc",
                os_type: "hvm",
            }),
            "aarch64" => Ok(Self {
                arch: "aarch64",
                machine: "virt",
                os_type: "hvm",
            }),
            unsupported => Err(eyre!(
                "Unsupported architecture: {}. Supported architectures: x86_64, i686, aarch64",
                unsupported
            )),
        }
    }

    /// Detect host architecture and return appropriate configuration
    pub fn detect() -> Result<Self> {
        Self::for_arch(std::env::consts::ARCH)
    }

    /// Write the `<type>` element of the `<os>` block
    pub fn write_os_type(&self, writer: &mut XmlWriter) -> Result<()> {
        writer.write_text_element_with_attrs(
            "type",
            self.os_type,
            &[("arch", self.arch), ("machine", self.machine)],
        )
    }

    /// Bus used for CD-ROM devices on this machine type
    pub fn cdrom_bus(&self) -> &'static str {
        match self.machine {
            "pc" => "ide",
            "virt" => "scsi",
            _ => "sata",
        }
    }
}
