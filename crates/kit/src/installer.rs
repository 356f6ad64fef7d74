//! Install media preparation
//!
//! A [`DistroInstaller`] owns the resolved install location and everything
//! produced while preparing to boot from it. Preparation takes one of two
//! branches, chosen by configuration rather than by the location:
//!
//! - CD-ROM boot: attach the local medium, or a boot ISO fetched from a
//!   network tree, as a read-only transient CD-ROM.
//! - Kernel boot: use an explicit kernel/initrd pair, or fetch one from the
//!   install tree; a local medium is additionally exposed as a disk.
//!
//! Every fetched file is registered as a temporary artifact as soon as it
//! exists and is removed by [`DistroInstaller::cleanup`], which also runs at
//! the start of every [`DistroInstaller::prepare`] and on drop.

use std::io::ErrorKind;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::arch::ArchConfig;
use crate::connection::Connection;
use crate::disk::{DiskDevice, VirtualDisk};
use crate::distro::{detect_distro, DistroIdentity, DistroProbe, OsRegistry};
use crate::error::InstallError;
use crate::fetch::{DistroFetcher, FetchRequest};
use crate::guest::Guest;
use crate::location::{Location, RawLocation};
use crate::privilege::PrivilegePolicy;
use crate::progress::ProgressSink;
use crate::resolver::LocationResolver;
use crate::storage::StorageBackend;
use crate::xml_utils::XmlWriter;

/// How the guest boots the installer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootMode {
    /// Boot from an attached CD-ROM
    Cdrom,
    /// Direct kernel boot
    KernelInitrd,
}

/// A local kernel and initrd supplied by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootFiles {
    /// Kernel image
    pub kernel: Utf8PathBuf,
    /// Initial ramdisk
    pub initrd: Utf8PathBuf,
}

/// The outcome of preparing install media
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstallPlan {
    /// Selected boot mechanism
    pub boot_mode: BootMode,
    /// Kernel for direct boot, empty otherwise
    pub kernel: String,
    /// Initrd for direct boot, empty otherwise
    pub initrd: String,
    /// Extra kernel command line, empty when none
    pub extra_args: String,
    /// Disk exposing the install medium, if one is needed
    pub install_disk: Option<VirtualDisk>,
    /// Files owned by this plan, removed on cleanup
    pub temporary_artifacts: Vec<Utf8PathBuf>,
}

impl InstallPlan {
    fn new(boot_mode: BootMode) -> Self {
        Self {
            boot_mode,
            kernel: String::new(),
            initrd: String::new(),
            extra_args: String::new(),
            install_disk: None,
            temporary_artifacts: Vec::new(),
        }
    }

    /// Write the `<os>` element that boots this plan.
    ///
    /// `isinstall` selects the first (installer) boot; afterwards the guest
    /// boots from its hard disk.
    pub fn write_os_xml(
        &self,
        writer: &mut XmlWriter,
        arch: &ArchConfig,
        isinstall: bool,
    ) -> Result<()> {
        writer.start_element("os", &[])?;
        arch.write_os_type(writer)?;
        if isinstall && self.boot_mode == BootMode::KernelInitrd && !self.kernel.is_empty() {
            writer.write_text_element("kernel", &self.kernel)?;
            writer.write_text_element("initrd", &self.initrd)?;
            writer.write_text_element("cmdline", &self.extra_args)?;
        } else {
            let bootdev = if isinstall { "cdrom" } else { "hd" };
            writer.write_empty_element("boot", &[("dev", bootdev)])?;
        }
        writer.end_element("os")
    }
}

/// Collaborators the installer delegates to
pub struct Collaborators {
    /// Storage volume lookup
    pub storage: Box<dyn StorageBackend>,
    /// Privilege checks
    pub policy: Box<dyn PrivilegePolicy>,
    /// Boot media downloads
    pub fetcher: Box<dyn DistroFetcher>,
    /// Known OS types
    pub registry: Arc<OsRegistry>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("registry", &self.registry.types.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Installer that boots from a distribution's install media
#[derive(Debug)]
pub struct DistroInstaller {
    collaborators: Collaborators,
    connection: Option<Connection>,
    scratchdir: Utf8PathBuf,
    cdrom: bool,
    boot: Option<BootFiles>,
    extra_args: Option<String>,
    os_type: Option<String>,
    location: Option<Location>,
    plan: Option<InstallPlan>,
}

impl DistroInstaller {
    /// Create an installer writing fetched media below `scratchdir`
    pub fn new(collaborators: Collaborators, scratchdir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            collaborators,
            connection: None,
            scratchdir: scratchdir.into(),
            cdrom: false,
            boot: None,
            extra_args: None,
            os_type: None,
            location: None,
            plan: None,
        }
    }

    /// Use a hypervisor connection for storage lookups and privilege scope
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Boot the installer from a CD-ROM instead of a kernel
    pub fn with_cdrom(mut self, cdrom: bool) -> Self {
        self.cdrom = cdrom;
        self
    }

    /// Boot an explicit local kernel and initrd
    pub fn with_boot(mut self, boot: BootFiles) -> Self {
        self.boot = Some(boot);
        self
    }

    /// Extra kernel arguments
    pub fn with_extra_args(mut self, args: &str) -> Self {
        self.extra_args = Some(args.to_owned());
        self
    }

    /// OS type hint handed to the fetcher
    pub fn with_os_type(mut self, os_type: &str) -> Self {
        self.os_type = Some(os_type.to_owned());
        self
    }

    /// The resolved install location, if any
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// The current install plan, if preparation has run
    pub fn plan(&self) -> Option<&InstallPlan> {
        self.plan.as_ref()
    }

    /// Scratch directory for fetched media
    pub fn scratchdir(&self) -> &Utf8Path {
        &self.scratchdir
    }

    /// Resolve and set the install location.
    ///
    /// On failure the previously set location is kept.
    pub fn set_location(&mut self, raw: impl Into<RawLocation>) -> Result<&Location, InstallError> {
        let raw = raw.into();
        let resolver = LocationResolver::new(
            self.connection.as_ref(),
            self.collaborators.storage.as_ref(),
            self.collaborators.policy.as_ref(),
        );
        let location = resolver.resolve(&raw)?;
        info!("Install location: {} ({})", location, location.kind());
        Ok(self.location.insert(location))
    }

    /// Detect the distribution on the install media, best effort
    pub fn detect_distro(&self, probe: &dyn DistroProbe, arch: &str) -> Option<DistroIdentity> {
        let location = self.location.as_ref()?;
        detect_distro(probe, location, arch, &self.collaborators.registry)
    }

    /// Prepare install media for `guest`.
    ///
    /// Artifacts of any earlier preparation are released first. On failure,
    /// artifacts created so far stay registered until [`Self::cleanup`].
    pub fn prepare(
        &mut self,
        guest: &mut Guest,
        distro: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<&InstallPlan, InstallError> {
        if let Some(previous) = self.plan.as_ref().and_then(|p| p.install_disk.as_ref()) {
            guest.disks.retain(|d| d != previous);
        }
        self.cleanup();

        let boot_mode = if self.cdrom {
            BootMode::Cdrom
        } else {
            BootMode::KernelInitrd
        };
        let mut plan = InstallPlan::new(boot_mode);
        let result = match boot_mode {
            BootMode::Cdrom => self.prepare_cdrom(&mut plan, guest, distro, progress),
            BootMode::KernelInitrd => {
                self.prepare_kernel_and_initrd(&mut plan, guest, distro, progress)
            }
        };
        let plan = self.plan.insert(plan);
        result?;

        if let Some(disk) = &plan.install_disk {
            debug!("Attaching install media {} as {}", disk.path, disk.device.as_str());
            guest.disks.push(disk.clone());
        }
        Ok(plan)
    }

    fn fetch_request<'a>(
        &'a self,
        location: &'a Location,
        guest: &'a Guest,
        distro: Option<&'a str>,
        progress: &'a dyn ProgressSink,
    ) -> FetchRequest<'a> {
        FetchRequest {
            location,
            arch: guest.arch.arch,
            scratchdir: &self.scratchdir,
            distro,
            progress,
        }
    }

    fn prepare_cdrom(
        &self,
        plan: &mut InstallPlan,
        guest: &Guest,
        distro: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<(), InstallError> {
        let Some(location) = &self.location else {
            debug!("No install location; booting from a CD-ROM already attached to the guest");
            return Ok(());
        };

        let media = if location.is_path() {
            Utf8PathBuf::from(location.as_str())
        } else {
            // Network trees need a boot.iso to attach
            let req = self.fetch_request(location, guest, distro, progress);
            let iso = self
                .collaborators
                .fetcher
                .acquire_boot_image(&req)
                .map_err(|e| InstallError::media(location.as_str(), e))?;
            plan.temporary_artifacts.push(iso.clone());
            iso
        };

        plan.install_disk = Some(VirtualDisk::install_media(media, DiskDevice::Cdrom));
        Ok(())
    }

    fn prepare_kernel_and_initrd(
        &self,
        plan: &mut InstallPlan,
        guest: &mut Guest,
        distro: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<(), InstallError> {
        if let Some(boot) = &self.boot {
            plan.kernel = boot.kernel.to_string();
            plan.initrd = boot.initrd.to_string();
            if let Some(args) = &self.extra_args {
                plan.extra_args = args.clone();
            }
        } else {
            let Some(location) = &self.location else {
                return Err(InstallError::Configuration(
                    "An install location or an explicit kernel and initrd is required".into(),
                ));
            };
            let req = self.fetch_request(location, guest, distro, progress);
            let fetched = self
                .collaborators
                .fetcher
                .acquire_kernel_initrd(guest, &req, self.os_type.as_deref())
                .map_err(|e| InstallError::media(location.as_str(), e))?;
            plan.temporary_artifacts.push(fetched.kernel.clone());
            plan.temporary_artifacts.push(fetched.initrd.clone());

            // Only set the OS type if the user didn't explicitly pass one
            if guest.os_type.is_none() {
                if let Some(os_type) = fetched.os_type {
                    debug!("Setting guest OS type from install tree: {}", os_type);
                    guest.os_type = Some(os_type);
                }
            }

            plan.kernel = fetched.kernel.into_string();
            plan.initrd = fetched.initrd.into_string();
            // User arguments follow the ones the install tree needs
            let mut args = fetched.args;
            if let Some(user) = self.extra_args.as_deref().filter(|a| !a.is_empty()) {
                if !args.is_empty() {
                    args.push(' ');
                }
                args.push_str(user);
            }
            plan.extra_args = args;
        }

        // A local file or device is mapped through to a virtual CD or disk
        if let Some(path) = self.location.as_ref().and_then(Location::as_path) {
            if !path.is_dir() {
                let registry = &self.collaborators.registry;
                let device = if registry.requires_pv_cdrom_install(
                    guest.os_type.as_deref(),
                    guest.os_variant.as_deref(),
                ) {
                    DiskDevice::Cdrom
                } else {
                    DiskDevice::Disk
                };
                plan.install_disk = Some(VirtualDisk::install_media(path, device));
            }
        }
        Ok(())
    }

    /// Take ownership of the current plan's artifacts so cleanup leaves them alone
    pub fn keep_artifacts(&mut self) -> Vec<Utf8PathBuf> {
        self.plan
            .as_mut()
            .map(|p| std::mem::take(&mut p.temporary_artifacts))
            .unwrap_or_default()
    }

    /// Remove all temporary artifacts of the current plan
    pub fn cleanup(&mut self) {
        let Some(plan) = self.plan.as_mut() else {
            return;
        };
        for path in plan.temporary_artifacts.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed temporary file {}", path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove temporary file {}: {}", path, e),
            }
        }
    }
}

impl Drop for DistroInstaller {
    fn drop(&mut self) {
        self.cleanup();
    }
}
