//! Boot media acquisition
//!
//! The installer delegates every download to a [`DistroFetcher`]. The
//! [`TreeFetcher`] shipped here understands the common install tree layout
//! (`images/pxeboot/vmlinuz`, `images/pxeboot/initrd.img`,
//! `images/boot.iso`) on local directories and HTTP servers. NFS trees need
//! a mount and FTP needs a client this crate does not carry, so both are
//! reported as errors.
//!
//! Files are written into the scratch directory under unique names and are
//! only persisted once the whole acquisition succeeded; ownership of the
//! persisted files passes to the caller.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{eyre::bail, eyre::eyre, eyre::Context as _, Result};
use reqwest::StatusCode;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use url::Url;

use crate::distro::{guess_from_treeinfo, DistroProbe};
use crate::guest::Guest;
use crate::location::Location;
use crate::progress::ProgressSink;
use crate::url_utils::is_nfs;

const KERNEL_PATHS: &[&str] = &["images/pxeboot/vmlinuz", "isolinux/vmlinuz"];
const INITRD_PATHS: &[&str] = &["images/pxeboot/initrd.img", "isolinux/initrd.img"];
const BOOT_ISO_PATHS: &[&str] = &["images/boot.iso"];
const TREEINFO: &str = ".treeinfo";

/// Parameters shared by all fetch operations
pub struct FetchRequest<'a> {
    /// Resolved install location
    pub location: &'a Location,
    /// Guest architecture
    pub arch: &'a str,
    /// Directory for downloaded files
    pub scratchdir: &'a Utf8Path,
    /// Distribution hint from the user or from detection
    pub distro: Option<&'a str>,
    /// Progress reporting
    pub progress: &'a dyn ProgressSink,
}

impl std::fmt::Debug for FetchRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("location", &self.location)
            .field("arch", &self.arch)
            .field("scratchdir", &self.scratchdir)
            .field("distro", &self.distro)
            .finish_non_exhaustive()
    }
}

/// Kernel and initrd fetched for a direct kernel boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInitrd {
    /// Local kernel image
    pub kernel: Utf8PathBuf,
    /// Local initrd image
    pub initrd: Utf8PathBuf,
    /// Kernel command line the installer needs
    pub args: String,
    /// OS type implied by the tree, if any
    pub os_type: Option<String>,
}

/// Acquires boot media for an install location
pub trait DistroFetcher {
    /// Fetch a bootable ISO image; the returned file belongs to the caller
    fn acquire_boot_image(&self, req: &FetchRequest<'_>) -> Result<Utf8PathBuf>;

    /// Fetch a kernel and initrd; the returned files belong to the caller
    fn acquire_kernel_initrd(
        &self,
        guest: &Guest,
        req: &FetchRequest<'_>,
        os_type: Option<&str>,
    ) -> Result<KernelInitrd>;
}

/// Where an install tree can be read from
#[derive(Debug, Clone, PartialEq, Eq)]
enum TreeSource<'a> {
    Local(&'a Utf8Path),
    Http(Url),
}

impl<'a> TreeSource<'a> {
    fn from_location(location: &'a Location) -> Result<Self> {
        if let Some(path) = location.as_path() {
            if !path.is_dir() {
                bail!(
                    "Cannot read an install tree from {}: not a directory \
                     (use a CD-ROM install for image files)",
                    path
                );
            }
            return Ok(Self::Local(path));
        }
        let url = location.as_str();
        if is_nfs(url) {
            bail!("NFS install trees must be mounted first: {}", url);
        }
        if url.starts_with("http://") {
            let mut base = Url::parse(url).with_context(|| format!("Parsing {}", url))?;
            // Tree URLs name a directory; keep the last segment when joining
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            return Ok(Self::Http(base));
        }
        Err(eyre!("Unsupported install tree protocol: {}", url))
    }

    /// Copy the first of `candidates` that exists into `dest`
    fn fetch_into(
        &self,
        candidates: &[&'static str],
        dest: &mut File,
        progress: &dyn ProgressSink,
    ) -> Result<&'static str> {
        for &candidate in candidates {
            let found = match self {
                Self::Local(dir) => {
                    let src = dir.join(candidate);
                    match File::open(&src) {
                        Ok(f) => {
                            let len = f.metadata().ok().map(|m| m.len());
                            progress.start(candidate, len);
                            copy_with_progress(f, dest, progress)
                                .with_context(|| format!("Copying {}", src))?;
                            true
                        }
                        Err(e) if e.kind() == ErrorKind::NotFound => false,
                        Err(e) => return Err(e).with_context(|| format!("Opening {}", src)),
                    }
                }
                Self::Http(base) => {
                    let url = base
                        .join(candidate)
                        .with_context(|| format!("Joining {} to {}", candidate, base))?;
                    let resp = reqwest::blocking::get(url.clone())
                        .with_context(|| format!("Requesting {}", url))?;
                    if resp.status() == StatusCode::NOT_FOUND {
                        false
                    } else {
                        let resp = resp
                            .error_for_status()
                            .with_context(|| format!("Fetching {}", url))?;
                        progress.start(candidate, resp.content_length());
                        copy_with_progress(resp, dest, progress)
                            .with_context(|| format!("Downloading {}", url))?;
                        true
                    }
                }
            };
            if found {
                progress.finish();
                return Ok(candidate);
            }
            debug!("{} not present in tree", candidate);
        }
        bail!("None of {:?} found in install tree", candidates)
    }

    fn read_to_string(&self, relpath: &str) -> Result<String> {
        match self {
            Self::Local(dir) => {
                let path = dir.join(relpath);
                std::fs::read_to_string(&path).with_context(|| format!("Reading {}", path))
            }
            Self::Http(base) => {
                let url = base
                    .join(relpath)
                    .with_context(|| format!("Joining {} to {}", relpath, base))?;
                reqwest::blocking::get(url.clone())
                    .and_then(|r| r.error_for_status())
                    .and_then(|r| r.text())
                    .with_context(|| format!("Fetching {}", url))
            }
        }
    }
}

fn copy_with_progress(
    mut reader: impl Read,
    writer: &mut impl Write,
    progress: &dyn ProgressSink,
) -> std::io::Result<u64> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        progress.advance(n as u64);
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

fn scratch_file(scratchdir: &Utf8Path, prefix: &str) -> Result<NamedTempFile> {
    std::fs::create_dir_all(scratchdir)
        .with_context(|| format!("Creating scratch directory {}", scratchdir))?;
    tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(scratchdir)
        .with_context(|| format!("Creating temporary file in {}", scratchdir))
}

fn persist(file: NamedTempFile) -> Result<Utf8PathBuf> {
    let (_, path) = file.keep().context("Persisting fetched file")?;
    Utf8PathBuf::try_from(path).map_err(|e| eyre!("Fetched file path is not UTF-8: {}", e))
}

/// Fetches boot media from standard install tree layouts
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeFetcher;

impl DistroFetcher for TreeFetcher {
    fn acquire_boot_image(&self, req: &FetchRequest<'_>) -> Result<Utf8PathBuf> {
        let source = TreeSource::from_location(req.location)?;
        let mut iso = scratch_file(req.scratchdir, "boot.iso.")?;
        let found = source.fetch_into(BOOT_ISO_PATHS, iso.as_file_mut(), req.progress)?;
        let path = persist(iso)?;
        info!("Fetched {} from {} to {}", found, req.location, path);
        Ok(path)
    }

    fn acquire_kernel_initrd(
        &self,
        guest: &Guest,
        req: &FetchRequest<'_>,
        _os_type: Option<&str>,
    ) -> Result<KernelInitrd> {
        let source = TreeSource::from_location(req.location)?;
        debug!("Fetching kernel and initrd for {} ({})", guest.name, req.arch);

        // Both files are dropped (and deleted) unless both fetches succeed
        let mut kernel = scratch_file(req.scratchdir, "vmlinuz.")?;
        source.fetch_into(KERNEL_PATHS, kernel.as_file_mut(), req.progress)?;
        let mut initrd = scratch_file(req.scratchdir, "initrd.img.")?;
        source.fetch_into(INITRD_PATHS, initrd.as_file_mut(), req.progress)?;

        let args = match source {
            TreeSource::Http(_) => format!("method={}", req.location),
            TreeSource::Local(_) => String::new(),
        };
        let kernel = persist(kernel)?;
        let initrd = match persist(initrd) {
            Ok(p) => p,
            Err(e) => {
                let _ = std::fs::remove_file(&kernel);
                return Err(e);
            }
        };
        info!("Fetched kernel {} and initrd {}", kernel, initrd);

        Ok(KernelInitrd {
            kernel,
            initrd,
            args,
            // The pxeboot layout is only used by Linux trees
            os_type: Some("linux".to_owned()),
        })
    }
}

/// Detects the distribution from an install tree's `.treeinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeinfoProbe;

impl DistroProbe for TreeinfoProbe {
    fn detect(&self, location: &Location, _arch: &str) -> Result<(Option<String>, Option<String>)> {
        let source = TreeSource::from_location(location)?;
        let content = source.read_to_string(TREEINFO)?;
        Ok(guess_from_treeinfo(&content))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::arch::ArchConfig;
    use crate::progress::NoProgress;

    struct CountingProgress {
        bytes: Cell<u64>,
        finished: Cell<u32>,
    }

    impl ProgressSink for CountingProgress {
        fn start(&self, _label: &str, _total: Option<u64>) {}
        fn advance(&self, bytes: u64) {
            self.bytes.set(self.bytes.get() + bytes);
        }
        fn finish(&self) {
            self.finished.set(self.finished.get() + 1);
        }
    }

    fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let td = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(td.path().to_path_buf()).unwrap();
        (td, path)
    }

    fn make_tree(root: &Utf8Path) {
        let pxe = root.join("images/pxeboot");
        std::fs::create_dir_all(&pxe).unwrap();
        std::fs::write(pxe.join("vmlinuz"), b"kernel-bits").unwrap();
        std::fs::write(pxe.join("initrd.img"), b"initrd-bits").unwrap();
        std::fs::write(root.join("images/boot.iso"), b"iso-bits").unwrap();
    }

    fn guest() -> Guest {
        Guest::with_arch("test", ArchConfig::for_arch("x86_64").unwrap())
    }

    #[test]
    fn test_local_tree_kernel_initrd() {
        let (_td, root) = utf8_tempdir();
        let tree = root.join("tree");
        let scratch = root.join("scratch");
        make_tree(&tree);
        let location = Location::path(tree);
        let progress = CountingProgress {
            bytes: Cell::new(0),
            finished: Cell::new(0),
        };
        let req = FetchRequest {
            location: &location,
            arch: "x86_64",
            scratchdir: &scratch,
            distro: None,
            progress: &progress,
        };

        let fetched = TreeFetcher.acquire_kernel_initrd(&guest(), &req, None).unwrap();
        assert_eq!(std::fs::read(&fetched.kernel).unwrap(), b"kernel-bits");
        assert_eq!(std::fs::read(&fetched.initrd).unwrap(), b"initrd-bits");
        assert!(fetched.kernel.starts_with(&scratch));
        assert_eq!(fetched.args, "");
        assert_eq!(fetched.os_type.as_deref(), Some("linux"));
        assert_eq!(progress.bytes.get(), 22);
        assert_eq!(progress.finished.get(), 2);
    }

    #[test]
    fn test_missing_initrd_leaves_no_files() {
        let (_td, root) = utf8_tempdir();
        let tree = root.join("tree");
        let scratch = root.join("scratch");
        make_tree(&tree);
        std::fs::remove_file(tree.join("images/pxeboot/initrd.img")).unwrap();
        let location = Location::path(tree);
        let req = FetchRequest {
            location: &location,
            arch: "x86_64",
            scratchdir: &scratch,
            distro: None,
            progress: &NoProgress,
        };

        assert!(TreeFetcher.acquire_kernel_initrd(&guest(), &req, None).is_err());
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_local_boot_image() {
        let (_td, root) = utf8_tempdir();
        let tree = root.join("tree");
        make_tree(&tree);
        let location = Location::path(tree);
        let req = FetchRequest {
            location: &location,
            arch: "x86_64",
            scratchdir: &root,
            distro: None,
            progress: &NoProgress,
        };
        let iso = TreeFetcher.acquire_boot_image(&req).unwrap();
        assert_eq!(std::fs::read(&iso).unwrap(), b"iso-bits");
    }

    #[test]
    fn test_unsupported_sources() {
        let (_td, root) = utf8_tempdir();
        let iso = root.join("boot.iso");
        std::fs::write(&iso, b"iso").unwrap();
        for location in [
            Location::network("nfs:host:/srv/tree".into()),
            Location::network("ftp://host/tree".into()),
            Location::path(iso),
        ] {
            assert!(TreeSource::from_location(&location).is_err(), "{location}");
        }
    }

    #[test]
    fn test_http_tree_urls() {
        for base in [
            "http://mirror.example.com/fedora/os",
            "http://mirror.example.com/fedora/os/",
        ] {
            let location = Location::network(base.into());
            let TreeSource::Http(url) = TreeSource::from_location(&location).unwrap() else {
                panic!("{base} is not an HTTP tree");
            };
            assert_eq!(
                url.join(KERNEL_PATHS[0]).unwrap().as_str(),
                "http://mirror.example.com/fedora/os/images/pxeboot/vmlinuz"
            );
        }
    }

    #[test]
    fn test_treeinfo_probe_local() {
        let (_td, root) = utf8_tempdir();
        std::fs::write(root.join(TREEINFO), "[general]\nfamily = Fedora\nversion = 42\n").unwrap();
        let guess = TreeinfoProbe.detect(&Location::path(root), "x86_64").unwrap();
        assert_eq!(guess, (Some("linux".into()), Some("fedora42".into())));
    }
}
