//! Command-line entry point for `vinst`

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::Context as _, Report, Result};
use indicatif::{ProgressBar, ProgressDrawTarget};
use serde::Serialize;

use vinst::arch::ArchConfig;
use vinst::config::InstallerConfig;
use vinst::connection::Connection;
use vinst::disk::{DiskDevice, VirtualDisk};
use vinst::distro::{validate, DistroIdentity};
use vinst::fetch::{TreeFetcher, TreeinfoProbe};
use vinst::guest::Guest;
use vinst::installer::{BootFiles, Collaborators, DistroInstaller, InstallPlan};
use vinst::location::{Location, RawLocation};
use vinst::privilege::EuidPolicy;
use vinst::resolver::LocationResolver;
use vinst::storage::VirshStorage;
use vinst::xml_utils::XmlWriter;

/// Resolve install sources and prepare install media for new guests.
///
/// vinst accepts a local file or device, a libvirt storage volume, or an
/// NFS/HTTP/FTP install tree, validates it, and prepares the boot media a
/// guest needs to start its installer.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/vinst/config.toml)
    #[clap(long, global = true)]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Install location arguments shared by several commands
#[derive(Parser)]
struct LocationOpts {
    /// Path, device, storage volume or network install tree
    location: String,

    /// Treat LOCATION as a volume in this storage pool
    #[clap(long)]
    pool: Option<String>,

    /// Libvirt connection URI
    #[clap(long)]
    connect: Option<String>,
}

impl LocationOpts {
    fn raw(&self) -> RawLocation {
        match &self.pool {
            Some(pool) => RawLocation::storage(pool.as_str(), self.location.as_str()),
            None => RawLocation::from(self.location.as_str()),
        }
    }
}

#[derive(Parser)]
struct ResolveOpts {
    #[clap(flatten)]
    location: LocationOpts,

    /// Output as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Parser)]
struct PrepareOpts {
    #[clap(flatten)]
    location: LocationOpts,

    /// Boot the installer from a CD-ROM
    #[clap(long, conflicts_with_all = ["kernel", "initrd"])]
    cdrom: bool,

    /// Local kernel to boot instead of fetching one
    #[clap(long, requires = "initrd")]
    kernel: Option<Utf8PathBuf>,

    /// Local initrd to boot instead of fetching one
    #[clap(long, requires = "kernel")]
    initrd: Option<Utf8PathBuf>,

    /// Extra kernel command line arguments
    #[clap(long)]
    extra_args: Option<String>,

    /// Guest OS type
    #[clap(long)]
    os_type: Option<String>,

    /// Distribution hint passed to the fetcher
    #[clap(long)]
    distro: Option<String>,

    /// Guest architecture (defaults to the host architecture)
    #[clap(long)]
    arch: Option<String>,

    /// Keep fetched media instead of removing it on exit
    #[clap(long)]
    keep: bool,

    /// Output as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Parser)]
struct ValidateDistroOpts {
    /// OS type reported by detection
    os_type: String,

    /// OS variant reported by detection
    variant: Option<String>,

    /// Output as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Parser)]
struct DetectOpts {
    #[clap(flatten)]
    location: LocationOpts,

    /// Guest architecture (defaults to the host architecture)
    #[clap(long)]
    arch: Option<String>,

    /// Output as JSON
    #[clap(long)]
    json: bool,
}

/// Available vinst commands
#[derive(Subcommand)]
enum Commands {
    /// Resolve an install location and print its canonical form
    Resolve(ResolveOpts),

    /// Prepare install media and print the resulting plan
    Prepare(PrepareOpts),

    /// Check an OS type and variant against the registry
    #[clap(name = "validate-distro")]
    ValidateDistro(ValidateDistroOpts),

    /// Detect the distribution of an install tree
    Detect(DetectOpts),
}

/// Install and configure the tracing/logging system.
///
/// Logs are filtered by RUST_LOG environment variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output as JSON")?
    );
    Ok(())
}

fn arch_config(arch: Option<&str>) -> Result<ArchConfig> {
    match arch {
        Some(arch) => ArchConfig::for_arch(arch),
        None => ArchConfig::detect(),
    }
}

fn resolve_location(connection: &Connection, raw: &RawLocation) -> Result<Location> {
    let storage = VirshStorage::new(connection.uri().map(str::to_owned));
    let resolver = LocationResolver::new(Some(connection), &storage, &EuidPolicy);
    Ok(resolver.resolve(raw)?)
}

fn run_resolve(config: &InstallerConfig, opts: ResolveOpts) -> Result<()> {
    let connection = config.connection(opts.location.connect.as_deref());
    let location = resolve_location(&connection, &opts.location.raw())?;
    if opts.json {
        print_json(&location)?;
    } else {
        println!("{}\t{}", location.kind(), location);
    }
    Ok(())
}

/// Target device name for the install disk on `bus`
fn target_dev(bus: &str) -> &'static str {
    match bus {
        "ide" => "hdc",
        "virtio" => "vdb",
        _ => "sdb",
    }
}

fn render_xml(plan: &InstallPlan, arch: &ArchConfig) -> Result<String> {
    let mut writer = XmlWriter::new();
    plan.write_os_xml(&mut writer, arch, true)?;
    if let Some(disk) = &plan.install_disk {
        let bus = match disk.device {
            DiskDevice::Cdrom => arch.cdrom_bus(),
            DiskDevice::Disk => "virtio",
        };
        disk.write_xml(&mut writer, target_dev(bus), bus)?;
    }
    writer.into_string()
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct PrepareOutput<'a> {
    location: &'a Location,
    os_type: Option<&'a str>,
    plan: &'a InstallPlan,
    disks: &'a [VirtualDisk],
}

fn run_prepare(config: &InstallerConfig, opts: PrepareOpts) -> Result<()> {
    let connection = config.connection(opts.location.connect.as_deref());
    let registry = Arc::new(config.registry()?);
    let scratchdir = config.scratchdir()?;
    let collaborators = Collaborators {
        storage: Box::new(VirshStorage::new(connection.uri().map(str::to_owned))),
        policy: Box::new(EuidPolicy),
        fetcher: Box::new(TreeFetcher),
        registry,
    };

    let mut installer = DistroInstaller::new(collaborators, scratchdir)
        .with_connection(connection)
        .with_cdrom(opts.cdrom);
    if let (Some(kernel), Some(initrd)) = (opts.kernel, opts.initrd) {
        installer = installer.with_boot(BootFiles { kernel, initrd });
    }
    if let Some(args) = &opts.extra_args {
        installer = installer.with_extra_args(args);
    }
    if let Some(os_type) = &opts.os_type {
        installer = installer.with_os_type(os_type);
    }
    installer.set_location(opts.location.raw())?;

    let arch = arch_config(opts.arch.as_deref())?;
    let mut guest = Guest::with_arch("vinst-install", arch.clone());
    guest.os_type = opts.os_type.clone();

    let progress = if opts.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
    };
    let plan = installer
        .prepare(&mut guest, opts.distro.as_deref(), &progress)?
        .clone();
    let location = installer
        .location()
        .cloned()
        .ok_or_else(|| color_eyre::eyre::eyre!("No install location"))?;

    if opts.json {
        print_json(&PrepareOutput {
            location: &location,
            os_type: guest.os_type.as_deref(),
            plan: &plan,
            disks: &guest.disks,
        })?;
    } else {
        println!("Location: {} ({})", location, location.kind());
        println!("{}", render_xml(&plan, &arch)?);
    }

    if opts.keep {
        for path in installer.keep_artifacts() {
            eprintln!("Kept {}", path);
        }
    }
    Ok(())
}

fn print_identity(identity: Option<&DistroIdentity>, json: bool) -> Result<()> {
    if json {
        return print_json(&identity);
    }
    match identity {
        Some(DistroIdentity {
            os_type,
            os_variant: Some(variant),
            ..
        }) => println!("{os_type}\t{variant}"),
        Some(DistroIdentity {
            os_type,
            os_variant: None,
            ..
        }) => println!("{os_type}"),
        None => println!("unknown"),
    }
    Ok(())
}

fn run_validate_distro(config: &InstallerConfig, opts: ValidateDistroOpts) -> Result<()> {
    let registry = config.registry()?;
    let identity = validate(Some(&opts.os_type), opts.variant.as_deref(), &registry);
    print_identity(identity.as_ref(), opts.json)
}

fn run_detect(config: &InstallerConfig, opts: DetectOpts) -> Result<()> {
    let connection = config.connection(opts.location.connect.as_deref());
    let location = resolve_location(&connection, &opts.location.raw())?;
    let arch = arch_config(opts.arch.as_deref())?;
    let registry = config.registry()?;
    let identity =
        vinst::distro::detect_distro(&TreeinfoProbe, &location, arch.arch, &registry);
    print_identity(identity.as_ref(), opts.json)
}

fn load_config(path: Option<&Utf8Path>) -> Result<InstallerConfig> {
    InstallerConfig::load(path).context("Loading configuration")
}

/// Main entry point for the vinst CLI application.
fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve(opts) => run_resolve(&config, opts)?,
        Commands::Prepare(opts) => run_prepare(&config, opts)?,
        Commands::ValidateDistro(opts) => run_validate_distro(&config, opts)?,
        Commands::Detect(opts) => run_detect(&config, opts)?,
    }
    tracing::debug!("exiting");
    Ok(())
}
