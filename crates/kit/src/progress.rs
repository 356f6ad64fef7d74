//! Progress reporting for media downloads
//!
//! The installer never looks at progress itself; it hands the sink through
//! to the fetch collaborators.

use indicatif::{ProgressBar, ProgressStyle};

/// Receives progress updates from a fetch
pub trait ProgressSink {
    /// A new transfer begins; `total` is its size when known
    fn start(&self, label: &str, total: Option<u64>);
    /// `bytes` more bytes were transferred
    fn advance(&self, bytes: u64);
    /// The current transfer is complete
    fn finish(&self);
}

/// A sink that discards all updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _label: &str, _total: Option<u64>) {}
    fn advance(&self, _bytes: u64) {}
    fn finish(&self) {}
}

impl ProgressSink for ProgressBar {
    fn start(&self, label: &str, total: Option<u64>) {
        self.reset();
        match total {
            Some(len) => {
                self.set_length(len);
                if let Ok(style) = ProgressStyle::with_template(
                    "{msg} [{bar:40}] {binary_bytes}/{binary_total_bytes} ({eta})",
                ) {
                    self.set_style(style.progress_chars("=> "));
                }
            }
            None => {
                if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {binary_bytes}") {
                    self.set_style(style);
                }
            }
        }
        self.set_message(label.to_owned());
    }

    fn advance(&self, bytes: u64) {
        self.inc(bytes);
    }

    fn finish(&self) {
        self.finish_and_clear();
    }
}
