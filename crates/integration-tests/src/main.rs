//! Integration tests for vinst

use camino::{Utf8Path, Utf8PathBuf};
use std::process::Output;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};

pub(crate) use integration_tests::{write_install_tree, write_test_config, INTEGRATION_TESTS};

mod tests {
    pub mod distro;
    pub mod prepare;
    pub mod resolve;
}

/// Get the path to the vinst binary from VINST_PATH, falling back to "vinst"
pub(crate) fn get_vinst_command() -> Result<String> {
    if let Ok(path) = std::env::var("VINST_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/vinst", "target/release/vinst"]
        .into_iter()
        .find(|p| Utf8Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set VINST_PATH={path} to run using this binary"
        ));
    }
    Ok("vinst".to_owned())
}

/// A temporary directory with an isolated vinst configuration
pub(crate) struct TestEnv {
    _td: tempfile::TempDir,
    pub dir: Utf8PathBuf,
    pub config: Utf8PathBuf,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        let td = tempfile::tempdir()?;
        let dir = Utf8PathBuf::try_from(td.path().to_path_buf())?;
        let config = write_test_config(&dir)?;
        Ok(Self {
            _td: td,
            dir,
            config,
        })
    }

    /// Files currently in the scratch directory
    pub fn scratch_files(&self) -> Result<Vec<Utf8PathBuf>> {
        let scratch = self.dir.join("scratch");
        if !scratch.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in scratch.read_dir_utf8()? {
            files.push(entry?.into_path());
        }
        Ok(files)
    }

    /// Run vinst with this environment's configuration, capturing output
    pub fn run(&self, args: &[&str]) -> Result<CapturedOutput> {
        let vinst = get_vinst_command()?;
        let output = std::process::Command::new(vinst)
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()?;
        Ok(CapturedOutput::new(output))
    }
}

/// Captured output from a command with decoded stdout/stderr strings
pub(crate) struct CapturedOutput {
    pub output: Output,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Create from a raw Output
    pub fn new(output: Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Self {
            output,
            stdout,
            stderr,
        }
    }

    /// Assert that the command succeeded, printing debug info on failure
    pub fn assert_success(&self, context: &str) {
        assert!(
            self.output.status.success(),
            "{} failed: {}",
            context,
            self.stderr
        );
    }

    /// Assert that the command failed with `message` on stderr
    pub fn assert_failure(&self, context: &str, message: &str) {
        assert!(
            !self.output.status.success(),
            "{} unexpectedly succeeded: {}",
            context,
            self.stdout
        );
        assert!(
            self.stderr.contains(message),
            "{}: expected {:?} in stderr: {}",
            context,
            message,
            self.stderr
        );
    }

    /// Parse stdout as JSON
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.stdout)
            .map_err(|e| eyre!("Failed to parse JSON output: {e}: {}", self.stdout))
    }
}

fn main() {
    let args = Arguments::from_args();

    // Collect tests from the distributed slice
    let tests: Vec<Trial> = INTEGRATION_TESTS
        .iter()
        .map(|test| {
            let name = test.name;
            let f = test.f;
            Trial::test(name, move || f().map_err(|e| format!("{:?}", e).into()))
        })
        .collect();

    // Run the tests and exit with the result
    libtest_mimic::run(&args, tests).exit();
}
