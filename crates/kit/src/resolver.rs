//! Turn a raw install location into a validated [`Location`]

use tracing::debug;

use crate::connection::Connection;
use crate::error::InstallError;
use crate::location::{absolute_path, classify, Classified, Location, RawLocation};
use crate::privilege::{Capability, PrivilegePolicy};
use crate::storage::StorageBackend;
use crate::url_utils::sanitize_url;

/// Composes classification, URL normalization, storage lookup and the
/// NFS privilege check.
///
/// Resolution is atomic: either a complete [`Location`] is returned or an
/// error, never a partially updated value.
pub struct LocationResolver<'a> {
    connection: Option<&'a Connection>,
    storage: &'a dyn StorageBackend,
    policy: &'a dyn PrivilegePolicy,
}

impl std::fmt::Debug for LocationResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationResolver")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl<'a> LocationResolver<'a> {
    /// Create a resolver for the given connection and collaborators
    pub fn new(
        connection: Option<&'a Connection>,
        storage: &'a dyn StorageBackend,
        policy: &'a dyn PrivilegePolicy,
    ) -> Self {
        Self {
            connection,
            storage,
            policy,
        }
    }

    /// Resolve `raw` into a canonical install location
    pub fn resolve(&self, raw: &RawLocation) -> Result<Location, InstallError> {
        let storage_fallback = self
            .connection
            .is_some_and(Connection::is_storage_capable);

        let location = match classify(raw, self.connection)? {
            Classified::NetworkUrl(url) => Location::network(sanitize_url(&url)?),
            Classified::Path(path) => Location::path(path),
            Classified::StorageTuple { pool, volume } => {
                self.lookup_volume(Some(&pool), &volume, raw)?
            }
            Classified::Unresolved(value) if storage_fallback => {
                self.lookup_volume(None, &value, raw)?
            }
            Classified::Unresolved(_) => {
                return Err(InstallError::Validation(
                    "Install media location must be an NFS, HTTP or FTP network install \
                     source, or an existing file/device"
                        .into(),
                ))
            }
        };

        if location.is_nfs() {
            let scope = self.connection.and_then(Connection::uri);
            if !self.policy.has_capability(Capability::NfsMount, scope) {
                return Err(InstallError::Permission(
                    "Privilege is required for NFS installations".into(),
                ));
            }
        }

        debug!("Resolved install location {} as {}", location, location.kind());
        Ok(location)
    }

    fn lookup_volume(
        &self,
        pool: Option<&str>,
        volume: &str,
        raw: &RawLocation,
    ) -> Result<Location, InstallError> {
        let path = self.storage.resolve_volume(pool, volume).map_err(|e| {
            debug!("Storage lookup for '{}' failed: {:?}", raw, e);
            InstallError::Validation(format!("Could not find media '{raw}'."))
        })?;
        // Backends may hand back relative keys; keep the absolute-path invariant
        Ok(Location::path(absolute_path(path.as_str())?))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use camino::Utf8PathBuf;
    use color_eyre::eyre::eyre;

    use super::*;
    use crate::location::LocationKind;
    use crate::privilege::StaticPolicy;

    /// Records lookups and answers from a fixed table
    #[derive(Default)]
    struct FakeStorage {
        volumes: Vec<(Option<&'static str>, &'static str, &'static str)>,
        calls: RefCell<Vec<(Option<String>, String)>>,
    }

    impl StorageBackend for FakeStorage {
        fn resolve_volume(
            &self,
            pool: Option<&str>,
            volume: &str,
        ) -> color_eyre::Result<Utf8PathBuf> {
            self.calls
                .borrow_mut()
                .push((pool.map(ToOwned::to_owned), volume.to_owned()));
            self.volumes
                .iter()
                .find(|(p, v, _)| *p == pool && *v == volume)
                .map(|(_, _, path)| Utf8PathBuf::from(*path))
                .ok_or_else(|| eyre!("storage volume not found: no volume with matching name"))
        }
    }

    fn storage_conn() -> Connection {
        Connection::new(Some("qemu:///system".into()), true)
    }

    #[test]
    fn test_existing_local_path() {
        let td = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(td.path().to_path_buf()).unwrap();
        let storage = FakeStorage::default();
        let resolver = LocationResolver::new(None, &storage, &StaticPolicy(false));

        let loc = resolver.resolve(&dir.as_str().into()).unwrap();
        assert_eq!(loc.kind(), LocationKind::Path);
        assert_eq!(loc.as_str(), dir.as_str());
        assert!(storage.calls.borrow().is_empty());
    }

    #[test]
    fn test_nfs_is_normalized_when_permitted() {
        let storage = FakeStorage::default();
        let resolver = LocationResolver::new(None, &storage, &StaticPolicy(true));
        let loc = resolver.resolve(&"nfs://example.com/srv/tree".into()).unwrap();
        assert_eq!(loc.as_str(), "nfs:example.com:/srv/tree");
        assert!(!loc.is_path());
    }

    #[test]
    fn test_nfs_denied_without_privilege() {
        let storage = FakeStorage::default();
        let resolver = LocationResolver::new(None, &storage, &StaticPolicy(false));
        let err = resolver
            .resolve(&"nfs://example.com/srv/tree".into())
            .unwrap_err();
        assert!(matches!(err, InstallError::Permission(_)));
    }

    #[test]
    fn test_http_skips_privilege_check() {
        let storage = FakeStorage::default();
        let resolver = LocationResolver::new(None, &storage, &StaticPolicy(false));
        let loc = resolver
            .resolve(&"http://mirror.example.com/fedora/os/".into())
            .unwrap();
        assert_eq!(loc.kind(), LocationKind::NetworkUrl);
        assert_eq!(loc.as_str(), "http://mirror.example.com/fedora/os/");
    }

    #[test]
    fn test_nfs_without_path() {
        let storage = FakeStorage::default();
        let resolver = LocationResolver::new(None, &storage, &StaticPolicy(true));
        let err = resolver.resolve(&"nfs://example.com".into()).unwrap_err();
        assert!(matches!(err, InstallError::MalformedUrl(_)));
    }

    #[test]
    fn test_storage_tuple() {
        let storage = FakeStorage {
            volumes: vec![(Some("poolA"), "volB", "/var/lib/libvirt/images/volB.iso")],
            ..Default::default()
        };
        let err = LocationResolver::new(None, &storage, &StaticPolicy(false))
            .resolve(&("poolA", "volB").into())
            .unwrap_err();
        assert!(matches!(err, InstallError::Configuration(_)));

        let conn = storage_conn();
        let loc = LocationResolver::new(Some(&conn), &storage, &StaticPolicy(false))
            .resolve(&("poolA", "volB").into())
            .unwrap();
        assert_eq!(loc.kind(), LocationKind::Path);
        assert_eq!(loc.as_str(), "/var/lib/libvirt/images/volB.iso");
        assert_eq!(
            storage.calls.borrow().as_slice(),
            &[(Some("poolA".to_owned()), "volB".to_owned())]
        );
    }

    #[test]
    fn test_missing_volume_is_validation_error() {
        let storage = FakeStorage::default();
        let conn = storage_conn();
        let err = LocationResolver::new(Some(&conn), &storage, &StaticPolicy(false))
            .resolve(&("poolA", "missing").into())
            .unwrap_err();
        assert!(matches!(err, InstallError::Validation(_)));
        let msg = err.to_string();
        assert!(msg.contains("poolA/missing"), "{msg}");
        assert!(!msg.contains("no volume with matching name"), "{msg}");
    }

    #[test]
    fn test_unresolved_falls_back_to_storage() {
        let storage = FakeStorage {
            volumes: vec![(None, "install.iso", "/dev/sr0")],
            ..Default::default()
        };
        let conn = storage_conn();
        let loc = LocationResolver::new(Some(&conn), &storage, &StaticPolicy(false))
            .resolve(&"install.iso".into())
            .unwrap();
        assert_eq!(loc.as_str(), "/dev/sr0");
        assert!(loc.is_path());
    }

    #[test]
    fn test_unresolved_without_storage_fails() {
        let storage = FakeStorage::default();
        let conn = Connection::new(None, false);
        for connection in [None, Some(&conn)] {
            let err = LocationResolver::new(connection, &storage, &StaticPolicy(true))
                .resolve(&"/nonexistent/vinst/tree".into())
                .unwrap_err();
            assert!(matches!(err, InstallError::Validation(_)));
        }
        assert!(storage.calls.borrow().is_empty());
    }
}
