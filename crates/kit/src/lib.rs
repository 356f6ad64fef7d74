//! Install-source resolution and install media preparation for new guests.
//!
//! A user names install media as a local path or device, a storage volume,
//! or an NFS/HTTP/FTP install tree. [`resolver::LocationResolver`] turns that
//! into a canonical [`location::Location`], and
//! [`installer::DistroInstaller`] prepares the boot media: an attached
//! CD-ROM or a kernel/initrd pair, fetched on demand and cleaned up when no
//! longer needed.

pub mod arch;
pub mod cmdext;
pub mod config;
pub mod connection;
pub mod disk;
pub mod distro;
pub mod error;
pub mod fetch;
pub mod guest;
pub mod installer;
pub mod location;
pub mod privilege;
pub mod progress;
pub mod resolver;
pub mod storage;
pub mod url_utils;
pub mod xml_utils;
