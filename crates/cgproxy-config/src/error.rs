use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Reasons a candidate snapshot could not be built.
///
/// `Invalid` covers payloads that were read but rejected; `Io` covers files
/// that could not be read at all. Callers rely on the distinction to report
/// different status codes.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The payload was read but is not a valid configuration.
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Returns true when the failure came from reading the file.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
