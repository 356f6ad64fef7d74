//! Shared library code for integration tests
//!
//! Test registration plus fixtures (configuration files and install trees)
//! used by the test modules in the main test binary.

// Unfortunately needed here to work with linkme
#![allow(unsafe_code)]

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use linkme::distributed_slice;

/// A test function that returns a Result
pub type TestFn = fn() -> color_eyre::Result<()>;

/// Metadata for a registered integration test
#[derive(Debug)]
pub struct IntegrationTest {
    /// Name of the integration test
    pub name: &'static str,
    /// Test function to execute
    pub f: TestFn,
}

impl IntegrationTest {
    /// Create a new integration test with the given name and function
    pub const fn new(name: &'static str, f: TestFn) -> Self {
        Self { name, f }
    }
}

/// Distributed slice holding all registered integration tests
#[distributed_slice]
pub static INTEGRATION_TESTS: [IntegrationTest];

/// Register an integration test with less boilerplate.
///
/// This macro generates the static registration for an integration test function.
///
/// # Examples
///
/// ```ignore
/// fn test_basic_functionality() -> Result<()> {
///     let output = run_vinst(&["resolve", "/dev/null"])?;
///     output.assert_success("test");
///     Ok(())
/// }
/// integration_test!(test_basic_functionality);
/// ```
#[macro_export]
macro_rules! integration_test {
    ($fn_name:ident) => {
        ::paste::paste! {
            #[distributed_slice($crate::INTEGRATION_TESTS)]
            static [<$fn_name:upper>]: $crate::IntegrationTest =
                $crate::IntegrationTest::new(stringify!($fn_name), $fn_name);
        }
    };
}

/// Kernel path inside a generated install tree
pub const TREE_KERNEL: &str = "images/pxeboot/vmlinuz";
/// Initrd path inside a generated install tree
pub const TREE_INITRD: &str = "images/pxeboot/initrd.img";

/// Write a configuration file for an isolated test run.
///
/// Storage probing is disabled so no libvirt daemon is needed, and fetched
/// media lands in `dir/scratch`.
pub fn write_test_config(dir: &Utf8Path) -> io::Result<Utf8PathBuf> {
    let path = dir.join("config.toml");
    let content = format!(
        "storage-capable = false\nscratchdir = \"{}\"\n",
        dir.join("scratch")
    );
    fs::write(&path, content)?;
    Ok(path)
}

/// Create a minimal install tree with a kernel, an initrd and a `.treeinfo`
/// naming `family` and `version`.
pub fn write_install_tree(root: &Utf8Path, family: &str, version: &str) -> io::Result<()> {
    fs::create_dir_all(root.join("images/pxeboot"))?;
    fs::write(root.join(TREE_KERNEL), b"kernel image")?;
    fs::write(root.join(TREE_INITRD), b"initrd image")?;
    let treeinfo = format!("[general]\nfamily = {family}\nversion = {version}\narch = x86_64\n");
    fs::write(root.join(".treeinfo"), treeinfo)
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
    fn test_config_points_at_scratch() {
        let (_td, dir) = tmpdir();
        let path = write_test_config(&dir).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("storage-capable = false"));
        assert!(content.contains(dir.join("scratch").as_str()));
    }

    #[test]
    fn test_install_tree_layout() {
        let (_td, dir) = tmpdir();
        write_install_tree(&dir, "Fedora", "42").unwrap();
        assert!(dir.join(TREE_KERNEL).is_file());
        assert!(dir.join(TREE_INITRD).is_file());
        let treeinfo = fs::read_to_string(dir.join(".treeinfo")).unwrap();
        assert!(treeinfo.contains("family = Fedora"));
    }
}
