//! User configuration file parsing for `vinst/config.toml`

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{
    eyre::{eyre, Context as _},
    Result,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::distro::OsRegistry;

/// Configuration directory name below the user config dir
pub const CONFIG_DIR: &str = "vinst";
/// Configuration file name
pub const CONFIG_FILE: &str = "config.toml";

/// Scratch directory used by root when it exists
const SYSTEM_SCRATCHDIR: &str = "/var/lib/xen";

/// Installer configuration loaded from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InstallerConfig {
    /// Hypervisor connection URI
    pub connect: Option<String>,

    /// Directory for fetched boot media
    pub scratchdir: Option<Utf8PathBuf>,

    /// OS registry file replacing the built-in one
    pub registry: Option<Utf8PathBuf>,

    /// Skip probing the connection for storage pool support
    pub storage_capable: Option<bool>,
}

impl InstallerConfig {
    /// Default configuration file location
    pub fn default_path() -> Option<Utf8PathBuf> {
        let dir = dirs::config_dir()?;
        let dir = Utf8PathBuf::try_from(dir).ok()?;
        Some(dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Utf8Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse a configuration file
    pub fn load_from_path(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        debug!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// The connection described by this configuration, with `uri` taking
    /// precedence over `connect`
    pub fn connection(&self, uri: Option<&str>) -> Connection {
        let uri = uri.or(self.connect.as_deref()).map(str::to_owned);
        match self.storage_capable {
            Some(capable) => Connection::new(uri, capable),
            None => Connection::probe(uri),
        }
    }

    /// The OS registry: the configured file, or the built-in one
    pub fn registry(&self) -> Result<OsRegistry> {
        match &self.registry {
            Some(path) => OsRegistry::load(path),
            None => Ok(OsRegistry::builtin()),
        }
    }

    /// Resolve the scratch directory, creating it if needed
    pub fn scratchdir(&self) -> Result<Utf8PathBuf> {
        let dir = match &self.scratchdir {
            Some(dir) => dir.clone(),
            None => {
                let cache = dirs::cache_dir()
                    .map(Utf8PathBuf::try_from)
                    .transpose()
                    .context("Cache directory is not UTF-8")?;
                default_scratchdir(
                    rustix::process::geteuid().is_root(),
                    Utf8Path::new(SYSTEM_SCRATCHDIR),
                    cache.as_deref(),
                )?
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create scratch directory: {}", dir))?;
        Ok(dir)
    }
}

fn default_scratchdir(
    is_root: bool,
    system_dir: &Utf8Path,
    cache_dir: Option<&Utf8Path>,
) -> Result<Utf8PathBuf> {
    if is_root && system_dir.is_dir() {
        return Ok(system_dir.to_owned());
    }
    let cache = cache_dir.ok_or_else(|| eyre!("Unable to determine cache directory"))?;
    Ok(cache.join(CONFIG_DIR).join("boot"))
}
