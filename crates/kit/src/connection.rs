//! Hypervisor connection context
//!
//! The resolver only needs to know three things about a connection: its URI
//! (for privilege scoping and virsh invocations), whether the URI points at a
//! remote host, and whether the storage pool APIs are usable.

use std::process::Command;

use tracing::debug;
use url::Url;

use crate::cmdext::CommandRunExt;

/// A hypervisor connection as seen by the install-source resolver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connection {
    uri: Option<String>,
    storage_capable: bool,
}

impl Connection {
    /// Create a connection with explicitly known capabilities
    pub fn new(uri: Option<String>, storage_capable: bool) -> Self {
        Self {
            uri,
            storage_capable,
        }
    }

    /// Create a connection, asking libvirt whether storage pools are available
    pub fn probe(uri: Option<String>) -> Self {
        let storage_capable = virsh_command(uri.as_deref())
            .arg("pool-list")
            .run_succeeds();
        debug!(
            "Connection {:?} storage capable: {}",
            uri.as_deref().unwrap_or("(default)"),
            storage_capable
        );
        Self {
            uri,
            storage_capable,
        }
    }

    /// Hypervisor connection URI (e.g., qemu:///system, qemu+ssh://host/system)
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Whether storage pool and volume lookups can be performed
    pub fn is_storage_capable(&self) -> bool {
        self.storage_capable
    }

    /// Whether the connection targets another host
    pub fn is_remote(&self) -> bool {
        self.uri.as_deref().is_some_and(is_uri_remote)
    }
}

/// Create a virsh command with optional connection URI
pub(crate) fn virsh_command(connect_uri: Option<&str>) -> Command {
    let mut cmd = Command::new("virsh");
    if let Some(uri) = connect_uri {
        cmd.arg("-c").arg(uri);
    }
    cmd
}

/// Check if a libvirt URI names a host other than the local one
pub fn is_uri_remote(uri: &str) -> bool {
    let url = match Url::parse(uri) {
        Ok(url) => url,
        Err(e) => {
            debug!("Treating unparseable connection URI {:?} as local: {}", uri, e);
            return false;
        }
    };
    url.host_str()
        .is_some_and(|h| !h.is_empty() && !h.eq_ignore_ascii_case("localhost"))
}
