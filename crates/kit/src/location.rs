//! Install location types and classification
//!
//! A user describes where the installer lives in one of several loose
//! forms: a local file, directory or device; an HTTP, FTP or NFS install
//! tree; or a volume inside a storage pool. [`classify`] sorts a
//! [`RawLocation`] into one of those kinds before anything touches the
//! network, and [`crate::resolver::LocationResolver`] turns the result into
//! a canonical [`Location`].

use std::fmt;
use std::path::Component;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::connection::Connection;
use crate::error::InstallError;
use crate::url_utils::{is_network_url, is_nfs};

/// An install location as supplied by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLocation {
    /// A filesystem path or a network URL
    PathOrUrl(String),
    /// A volume inside a storage pool
    StorageRef {
        /// Storage pool name
        pool: String,
        /// Volume name within the pool
        volume: String,
    },
}

impl RawLocation {
    /// Reference a volume in a storage pool
    pub fn storage(pool: impl Into<String>, volume: impl Into<String>) -> Self {
        Self::StorageRef {
            pool: pool.into(),
            volume: volume.into(),
        }
    }

    fn check_non_empty(&self) -> Result<(), InstallError> {
        match self {
            Self::PathOrUrl(s) if s.trim().is_empty() => Err(InstallError::InvalidInput(
                "location must not be empty".into(),
            )),
            Self::StorageRef { pool, volume } if pool.is_empty() || volume.is_empty() => {
                Err(InstallError::InvalidInput(format!(
                    "storage reference needs both a pool and a volume, got '{self}'"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl From<&str> for RawLocation {
    fn from(s: &str) -> Self {
        Self::PathOrUrl(s.to_owned())
    }
}

impl From<String> for RawLocation {
    fn from(s: String) -> Self {
        Self::PathOrUrl(s)
    }
}

impl<P: Into<String>, V: Into<String>> From<(P, V)> for RawLocation {
    fn from((pool, volume): (P, V)) -> Self {
        Self::storage(pool, volume)
    }
}

impl fmt::Display for RawLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathOrUrl(s) => f.write_str(s),
            Self::StorageRef { pool, volume } => write!(f, "{pool}/{volume}"),
        }
    }
}

/// The kind of install source a location refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationKind {
    /// A local file, directory or device
    Path,
    /// An HTTP, FTP or NFS install tree
    NetworkUrl,
    /// A `(pool, volume)` reference into storage
    StorageTuple,
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::NetworkUrl => "network-url",
            Self::StorageTuple => "storage-tuple",
        })
    }
}

/// A validated, canonical install location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    #[serde(rename = "location")]
    canonical_value: String,
    kind: LocationKind,
}

impl Location {
    pub(crate) fn path(path: Utf8PathBuf) -> Self {
        Self {
            canonical_value: path.into_string(),
            kind: LocationKind::Path,
        }
    }

    pub(crate) fn network(url: String) -> Self {
        Self {
            canonical_value: url,
            kind: LocationKind::NetworkUrl,
        }
    }

    /// The canonical location string
    pub fn as_str(&self) -> &str {
        &self.canonical_value
    }

    /// The resolved kind; storage references resolve to [`LocationKind::Path`]
    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    /// True when the location is on the local filesystem
    pub fn is_path(&self) -> bool {
        self.kind == LocationKind::Path
    }

    /// True for `nfs:server:/path` sources
    pub fn is_nfs(&self) -> bool {
        self.kind == LocationKind::NetworkUrl && is_nfs(&self.canonical_value)
    }

    /// The location as a filesystem path, if it is one
    pub fn as_path(&self) -> Option<&Utf8Path> {
        self.is_path().then(|| Utf8Path::new(&self.canonical_value))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_value)
    }
}

/// Result of classifying a raw location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// A storage pool reference; a storage-capable connection is present
    StorageTuple {
        /// Storage pool name
        pool: String,
        /// Volume name
        volume: String,
    },
    /// A network install source, not yet normalized
    NetworkUrl(String),
    /// An existing local path, made absolute
    Path(Utf8PathBuf),
    /// Nothing could be determined about the value
    Unresolved(String),
}

/// Lexically make `path` absolute against the current directory,
/// collapsing `.` and `..` components.
pub fn absolute_path(path: &str) -> Result<Utf8PathBuf, InstallError> {
    let path = Utf8Path::new(path);
    let joined = if path.is_absolute() {
        path.to_owned()
    } else {
        let cwd = std::env::current_dir().map_err(|e| {
            InstallError::InvalidInput(format!("cannot determine current directory: {e}"))
        })?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| {
            InstallError::InvalidInput(format!("current directory is not UTF-8: {e}"))
        })?;
        cwd.join(path)
    };

    let mut normalized = Utf8PathBuf::new();
    for component in joined.as_std_path().components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::RootDir => normalized.push("/"),
            Component::Prefix(p) => normalized.push(p.as_os_str().to_string_lossy().as_ref()),
            Component::Normal(c) => normalized.push(c.to_string_lossy().as_ref()),
        }
    }
    Ok(normalized)
}

/// Determine what kind of install source `raw` refers to.
///
/// The only side effect is a filesystem existence check.
pub fn classify(
    raw: &RawLocation,
    connection: Option<&Connection>,
) -> Result<Classified, InstallError> {
    raw.check_non_empty()?;

    let value = match raw {
        RawLocation::StorageRef { pool, volume } => {
            match connection {
                None => {
                    return Err(InstallError::Configuration(
                        "A connection must be specified if 'location' is a storage tuple.".into(),
                    ))
                }
                Some(conn) if !conn.is_storage_capable() => {
                    return Err(InstallError::Configuration(
                        "A storage-capable connection is required if 'location' is a storage \
                         tuple."
                            .into(),
                    ))
                }
                Some(_) => {}
            }
            debug!("Install location is a (poolname, volname) tuple");
            return Ok(Classified::StorageTuple {
                pool: pool.clone(),
                volume: volume.clone(),
            });
        }
        RawLocation::PathOrUrl(value) => value,
    };

    if is_network_url(value) && !Utf8Path::new(value).exists() {
        debug!("Install location is a network source");
        return Ok(Classified::NetworkUrl(value.clone()));
    }

    let remote = connection.is_some_and(Connection::is_remote);
    if !remote {
        let abs = absolute_path(value)?;
        if abs.exists() {
            debug!("Install location is a local file/path: {}", abs);
            return Ok(Classified::Path(abs));
        }
    }

    debug!("Could not classify install location '{}'", value);
    Ok(Classified::Unresolved(value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmpdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let td = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(td.path().to_path_buf()).unwrap();
        (td, path)
    }

    #[test]
    fn test_absolute_path_collapses_dots() {
        assert_eq!(
            absolute_path("/srv/./trees/../iso/boot.iso").unwrap(),
            Utf8PathBuf::from("/srv/iso/boot.iso")
        );
        assert_eq!(absolute_path("/..").unwrap(), Utf8PathBuf::from("/"));
    }

    #[test]
    fn test_absolute_path_relative() {
        let cwd = Utf8PathBuf::try_from(std::env::current_dir().unwrap()).unwrap();
        assert_eq!(absolute_path("boot.iso").unwrap(), cwd.join("boot.iso"));
    }

    #[test]
    fn test_existing_path() {
        let (_td, dir) = tmpdir();
        let iso = dir.join("boot.iso");
        std::fs::write(&iso, b"iso").unwrap();

        let c = classify(&RawLocation::from(iso.as_str()), None).unwrap();
        assert_eq!(c, Classified::Path(iso));
    }

    #[test]
    fn test_url_shaped_existing_path_is_path() {
        // A file in the current directory whose name looks like an NFS source
        let file = tempfile::Builder::new()
            .prefix("nfs:vinst-")
            .tempfile_in(".")
            .unwrap();
        let name = file.path().file_name().unwrap().to_str().unwrap();
        assert!(is_network_url(name));

        let c = classify(&name.into(), None).unwrap();
        assert_eq!(c, Classified::Path(absolute_path(name).unwrap()));
    }

    #[test]
    fn test_network_urls() {
        for url in ["http://host/tree", "ftp://host/tree", "nfs://host/tree"] {
            let c = classify(&url.into(), None).unwrap();
            assert_eq!(c, Classified::NetworkUrl(url.to_owned()));
        }
    }

    #[test]
    fn test_storage_tuple_requires_connection() {
        let err = classify(&("pool", "vol").into(), None).unwrap_err();
        assert!(matches!(err, InstallError::Configuration(_)));

        let conn = Connection::new(None, true);
        let c = classify(&("pool", "vol").into(), Some(&conn)).unwrap();
        assert_eq!(
            c,
            Classified::StorageTuple {
                pool: "pool".into(),
                volume: "vol".into()
            }
        );
    }

    #[test]
    fn test_storage_tuple_requires_storage_capable_connection() {
        let conn = Connection::new(Some("qemu:///system".into()), false);
        let err = classify(&("pool", "vol").into(), Some(&conn)).unwrap_err();
        match err {
            InstallError::Configuration(msg) => assert!(msg.contains("storage-capable"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_remote_connection_skips_local_paths() {
        let (_td, dir) = tmpdir();
        let conn = Connection::new(Some("qemu+ssh://virthost/system".into()), true);
        let c = classify(&dir.as_str().into(), Some(&conn)).unwrap();
        assert_eq!(c, Classified::Unresolved(dir.into_string()));
    }

    #[test]
    fn test_missing_path_is_unresolved() {
        let c = classify(&"/nonexistent/vinst/boot.iso".into(), None).unwrap();
        assert_eq!(c, Classified::Unresolved("/nonexistent/vinst/boot.iso".into()));
    }

    #[test]
    fn test_empty_input_rejected() {
        for raw in [RawLocation::from(""), RawLocation::storage("", "vol")] {
            let err = classify(&raw, None).unwrap_err();
            assert!(matches!(err, InstallError::InvalidInput(_)), "{raw}");
        }
    }

    #[test]
    fn test_location_accessors() {
        let loc = Location::network("nfs:host:/tree".into());
        assert!(loc.is_nfs());
        assert!(!loc.is_path());
        assert_eq!(loc.as_path(), None);

        let loc = Location::path("/srv/boot.iso".into());
        assert_eq!(loc.as_path(), Some(Utf8Path::new("/srv/boot.iso")));
        assert_eq!(loc.kind().to_string(), "path");
    }
}
