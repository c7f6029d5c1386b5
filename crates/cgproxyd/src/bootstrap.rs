//! Loading the bootstrap configuration at startup.

use camino::Utf8Path;
use thiserror::Error;
use tracing::warn;

use cgproxy_config::ConfigError;

use crate::dispatch::{ControlPlane, DispatchError};
use crate::store::ConfigStore;

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Errors surfaced during bootstrap.
///
/// None of these stop the daemon; it keeps running without rules until a
/// client pushes a configuration.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The bootstrap file was missing, unreadable or invalid.
    #[error("failed to load bootstrap configuration: {source}")]
    Configuration {
        /// Underlying validation error.
        #[source]
        source: ConfigError,
    },
    /// The configuration loaded but could not be applied.
    #[error("failed to apply bootstrap configuration: {source}")]
    Apply {
        /// Underlying dispatch error.
        #[source]
        source: DispatchError,
    },
}

/// Loads the configuration at `path` and applies it through `plane`.
///
/// Returns the installed generation id. When the file cannot be loaded, any
/// rules an earlier run left behind are removed so the host starts clean.
pub fn bootstrap_with(plane: &ControlPlane, path: &Utf8Path) -> Result<u64, BootstrapError> {
    let reporter = plane.reporter();
    reporter.bootstrap_starting(path);

    let candidate = match ConfigStore::validate_from_file(path) {
        Ok(candidate) => candidate,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            if let Err(cleanup) = plane.clear_rules() {
                warn!(
                    target: BOOTSTRAP_TARGET,
                    error = %cleanup,
                    "failed to clear diversion rules left by an earlier run"
                );
            }
            return Err(error);
        }
    };

    let config = candidate.clone();
    match plane.install(candidate) {
        Ok(generation) => {
            reporter.bootstrap_succeeded(&config);
            Ok(generation)
        }
        Err(source) => {
            let error = BootstrapError::Apply { source };
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}
