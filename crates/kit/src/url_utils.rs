//! Network install source URL helpers
//!
//! Install trees may be given as `http://`, `ftp://` or NFS locations. NFS
//! is accepted both in RFC form (`nfs://server/path`) and in the form mount
//! tooling and installers expect (`nfs:server:/path`); only the latter is
//! carried around internally.

use crate::error::InstallError;

const NFS_RFC_PREFIX: &str = "nfs://";
const NFS_PREFIX: &str = "nfs:";

/// Check if a string has the syntax of a supported network install source.
///
/// This is purely syntactic; callers decide whether an existing local path
/// with the same spelling takes precedence.
pub fn is_network_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("ftp://") || s.starts_with(NFS_PREFIX)
}

/// Check if a (normalized) location is an NFS source
pub fn is_nfs(s: &str) -> bool {
    s.starts_with(NFS_PREFIX)
}

/// Rewrite `nfs://server/path` into `nfs:server:/path`.
///
/// HTTP and FTP URLs, and NFS URLs already in `nfs:server:/path` form, are
/// returned unchanged. An NFS URL without any path component is rejected
/// rather than treated as the server root.
pub fn sanitize_url(url: &str) -> Result<String, InstallError> {
    let Some(rest) = url.strip_prefix(NFS_RFC_PREFIX) else {
        return Ok(url.to_owned());
    };

    let mut sanitized = format!("{NFS_PREFIX}{rest}");
    let index = sanitized[NFS_PREFIX.len()..]
        .find('/')
        .map(|i| i + NFS_PREFIX.len())
        .ok_or_else(|| InstallError::MalformedUrl(format!("No path specified in '{url}'.")))?;

    if sanitized.as_bytes()[index - 1] != b':' {
        sanitized.insert(index, ':');
    }
    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc_nfs_is_rewritten() {
        assert_eq!(
            sanitize_url("nfs://example.com/srv/fedora").unwrap(),
            "nfs:example.com:/srv/fedora"
        );
    }

    #[test]
    fn test_nfs_with_colon_is_not_doubled() {
        assert_eq!(
            sanitize_url("nfs://example.com:/srv/fedora").unwrap(),
            "nfs:example.com:/srv/fedora"
        );
    }

    #[test]
    fn test_internal_nfs_form_passes_through() {
        assert_eq!(
            sanitize_url("nfs:example.com:/srv/fedora").unwrap(),
            "nfs:example.com:/srv/fedora"
        );
    }

    #[test]
    fn test_nfs_without_path_is_rejected() {
        let err = sanitize_url("nfs://example.com").unwrap_err();
        assert!(matches!(err, InstallError::MalformedUrl(_)));
        assert!(err.to_string().contains("No path specified"));
    }

    #[test]
    fn test_http_and_ftp_unchanged() {
        for url in [
            "http://mirror.example.com/fedora/x86_64/os/",
            "ftp://mirror.example.com/pub/os",
        ] {
            assert_eq!(sanitize_url(url).unwrap(), url);
        }
    }

    #[test]
    fn test_is_network_url() {
        assert!(is_network_url("http://host/tree"));
        assert!(is_network_url("ftp://host/tree"));
        assert!(is_network_url("nfs:host:/tree"));
        assert!(is_network_url("nfs://host/tree"));
        assert!(!is_network_url("https://host/tree"));
        assert!(!is_network_url("/srv/tree"));
        assert!(!is_network_url("boot.iso"));
    }
}
