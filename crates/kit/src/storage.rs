//! Storage volume lookup
//!
//! Install media can live inside a libvirt storage pool. The resolver hands
//! either a `(pool, volume)` pair or an otherwise unrecognized string to a
//! [`StorageBackend`], which answers with the local path of the volume.

use camino::Utf8PathBuf;
use color_eyre::{eyre::eyre, eyre::Context, Result};
use tracing::debug;

use crate::cmdext::CommandRunExt;
use crate::connection::virsh_command;

/// Resolves storage volumes to concrete device or file paths
pub trait StorageBackend {
    /// Look up a volume by pool and name, or by key/path when `pool` is `None`
    fn resolve_volume(&self, pool: Option<&str>, volume: &str) -> Result<Utf8PathBuf>;
}

/// Storage backend that shells out to `virsh vol-path`
#[derive(Debug, Clone, Default)]
pub struct VirshStorage {
    connect: Option<String>,
}

impl VirshStorage {
    /// Create a backend using the given connection URI
    pub fn new(connect: Option<String>) -> Self {
        Self { connect }
    }
}

impl StorageBackend for VirshStorage {
    fn resolve_volume(&self, pool: Option<&str>, volume: &str) -> Result<Utf8PathBuf> {
        let mut cmd = virsh_command(self.connect.as_deref());
        cmd.arg("vol-path");
        if let Some(pool) = pool {
            cmd.args(["--pool", pool]);
        }
        cmd.arg(volume);

        let path = cmd
            .run_get_stdout()
            .with_context(|| format!("Looking up storage volume '{volume}'"))?;
        if path.is_empty() {
            return Err(eyre!("virsh returned no path for volume '{volume}'"));
        }
        debug!("Storage volume {:?}/{} is at {}", pool, volume, path);
        Ok(path.into())
    }
}
