//! The slice of guest configuration media preparation needs

use crate::arch::ArchConfig;
use crate::disk::VirtualDisk;

/// Guest definition being assembled by the creation pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guest {
    /// Domain name
    pub name: String,
    /// Guest architecture
    pub arch: ArchConfig,
    /// OS family, when set explicitly by the user or by detection
    pub os_type: Option<String>,
    /// OS variant within the family
    pub os_variant: Option<String>,
    /// Disks attached to the guest
    pub disks: Vec<VirtualDisk>,
}

impl Guest {
    /// Create a guest for an explicit architecture
    pub fn with_arch(name: &str, arch: ArchConfig) -> Self {
        Self {
            name: name.to_owned(),
            arch,
            os_type: None,
            os_variant: None,
            disks: Vec::new(),
        }
    }
}
