//! Error types for the sysline core library.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing or sampling a telemetry backend.
///
/// None of these are fatal to the refresh loop: the sampler turns every one of
/// them into an "unavailable" sample for the affected metric.
#[derive(Error, Debug)]
pub enum Error {
    /// Tool or sensor is missing, or exited unsuccessfully.
    #[error("{backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Subprocess or file read exceeded its time bound.
    #[error("{backend} timed out after {timeout:?}")]
    BackendTimeout { backend: String, timeout: Duration },

    /// Sensor file exists but cannot be read by this user.
    #[error("permission denied reading {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// Backend produced output we could not make sense of.
    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file is not valid TOML.
    #[error("failed to parse configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            detail: detail.into(),
        }
    }

    /// Returns true for errors caused by a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::BackendTimeout { .. })
    }
}
