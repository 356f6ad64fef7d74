//! Privilege checks for protected operation classes

use crate::connection::is_uri_remote;

/// Operation classes that need elevated privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Mounting an NFS export to read an install tree
    NfsMount,
}

/// Answers whether the acting identity may perform a privileged operation
pub trait PrivilegePolicy {
    /// Check `capability` against the connection identified by `scope`
    fn has_capability(&self, capability: Capability, scope: Option<&str>) -> bool;
}

/// Grants privileges to root, or when the work happens on a remote host.
///
/// For a remote connection the mount is done by the remote daemon, so the
/// local identity does not matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuidPolicy;

impl PrivilegePolicy for EuidPolicy {
    fn has_capability(&self, capability: Capability, scope: Option<&str>) -> bool {
        match capability {
            Capability::NfsMount => {
                rustix::process::geteuid().is_root() || scope.is_some_and(is_uri_remote)
            }
        }
    }
}

/// A policy with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct StaticPolicy(pub bool);

impl PrivilegePolicy for StaticPolicy {
    fn has_capability(&self, _capability: Capability, _scope: Option<&str>) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_scope_grants_nfs_mount() {
        assert!(EuidPolicy.has_capability(
            Capability::NfsMount,
            Some("qemu+ssh://virthost/system")
        ));
    }

    #[test]
    fn test_local_scope_follows_euid() {
        let is_root = rustix::process::geteuid().is_root();
        assert_eq!(
            EuidPolicy.has_capability(Capability::NfsMount, Some("qemu:///system")),
            is_root
        );
        assert_eq!(EuidPolicy.has_capability(Capability::NfsMount, None), is_root);
    }
}
