//! Extensions for running helper commands such as `virsh`

use std::process::{Command, Stdio};

use color_eyre::{eyre::eyre, eyre::Context, Result};

/// Run a command and collect its output, turning failures into errors
pub trait CommandRunExt {
    /// Run the command, returning its trimmed stdout.
    ///
    /// A non-zero exit status is an error carrying the command's stderr.
    fn run_get_stdout(&mut self) -> Result<String>;

    /// Run the command, returning whether it exited successfully.
    ///
    /// Output is discarded; failing to spawn the command counts as `false`.
    fn run_succeeds(&mut self) -> bool;
}

impl CommandRunExt for Command {
    fn run_get_stdout(&mut self) -> Result<String> {
        let program = self.get_program().to_string_lossy().into_owned();
        let out = self
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {program}"))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(eyre!("{program} exited with {}: {}", out.status, stderr.trim()));
        }
        let stdout = String::from_utf8(out.stdout)
            .with_context(|| format!("{program} produced non-UTF-8 output"))?;
        Ok(stdout.trim().to_owned())
    }

    fn run_succeeds(&mut self) -> bool {
        self.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
