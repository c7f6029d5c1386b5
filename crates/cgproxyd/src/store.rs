//! Holder for the active configuration snapshot.

use std::sync::Arc;

use camino::Utf8Path;
use serde_json::Value;

use cgproxy_config::{ConfigError, ProxyConfig};

/// Owns the active snapshot.
///
/// Candidates are validated before they reach the store, so replacing the
/// active snapshot cannot fail and readers never see a half-built value.
/// Readers receive an `Arc` and keep using it even after a later
/// replacement.
#[derive(Debug, Default)]
pub struct ConfigStore {
    active: Option<Arc<ProxyConfig>>,
}

impl ConfigStore {
    /// Validates an inline configuration object.
    pub fn validate(data: Value) -> Result<ProxyConfig, ConfigError> {
        ProxyConfig::validate(data)
    }

    /// Reads and validates a configuration file.
    ///
    /// Read failures are reported as [`ConfigError::Io`], content failures as
    /// [`ConfigError::Invalid`].
    pub fn validate_from_file(path: &Utf8Path) -> Result<ProxyConfig, ConfigError> {
        ProxyConfig::validate_from_file(path)
    }

    /// The active snapshot, if one has ever been accepted.
    #[must_use]
    pub fn active(&self) -> Option<&Arc<ProxyConfig>> {
        self.active.as_ref()
    }

    /// Makes `candidate` the active snapshot and returns a shared handle to it.
    pub fn replace(&mut self, candidate: ProxyConfig) -> Arc<ProxyConfig> {
        let snapshot = Arc::new(candidate);
        self.active = Some(Arc::clone(&snapshot));
        snapshot
    }
}
