//! Error taxonomy for install-source resolution and media preparation
//!
//! Collaborators (storage, fetchers, probes) report failures as
//! `color_eyre::Report` like the rest of the crate; the resolver and the
//! installer fold those into one of the variants below so callers can tell
//! a bad location apart from a denied privilege or a failed download.

use thiserror::Error;

/// Errors produced while resolving a location or preparing install media
#[derive(Debug, Error)]
pub enum InstallError {
    /// The location value is empty or otherwise unusable as typed input
    #[error("Invalid install location: {0}")]
    InvalidInput(String),

    /// The location kind needs context (a connection) that was not provided
    #[error("{0}")]
    Configuration(String),

    /// An NFS URL could not be normalized
    #[error("Invalid NFS format: {0}")]
    MalformedUrl(String),

    /// The location could not be resolved to any valid install source
    #[error("Checking installer location failed: {0}")]
    Validation(String),

    /// The acting identity lacks a required privilege
    #[error("{0}")]
    Permission(String),

    /// A fetch collaborator failed to produce boot media
    #[error("Failed to acquire install media from {location}")]
    MediaAcquisition {
        /// The canonical location that was being fetched from
        location: String,
        /// Underlying collaborator failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl InstallError {
    /// Wrap a collaborator failure while fetching from `location`
    pub(crate) fn media(location: &str, err: color_eyre::Report) -> Self {
        Self::MediaAcquisition {
            location: location.to_owned(),
            source: err.into(),
        }
    }
}
