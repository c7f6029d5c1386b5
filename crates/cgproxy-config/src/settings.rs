//! Daemon runtime settings resolved from defaults and environment overrides.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::defaults::{
    DEBUG_LOG_FILTER, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, DEFAULT_RULE_SCRIPT,
    DEFAULT_SOCKET_PATH, default_runtime_dir,
};
use crate::logging::LogFormat;
use crate::socket::{SocketEndpoint, SocketParseError};

const SOCKET_VAR: &str = "CGPROXY_SOCKET";
const CONFIG_VAR: &str = "CGPROXY_CONFIG";
const RULE_SCRIPT_VAR: &str = "CGPROXY_RULE_SCRIPT";
const CGROUP_ROOT_VAR: &str = "CGPROXY_CGROUP_ROOT";
const RUNTIME_DIR_VAR: &str = "CGPROXY_RUNTIME_DIR";
const LOG_FILTER_VAR: &str = "CGPROXY_LOG";
const LOG_FORMAT_VAR: &str = "CGPROXY_LOG_FORMAT";

/// Runtime knobs for the daemon process itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    socket: SocketEndpoint,
    config_path: Utf8PathBuf,
    rule_script: Utf8PathBuf,
    cgroup_root: Option<Utf8PathBuf>,
    runtime_dir: Utf8PathBuf,
    log_filter: String,
    log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            socket: SocketEndpoint::unix(DEFAULT_SOCKET_PATH),
            config_path: Utf8PathBuf::from(DEFAULT_CONFIG_PATH),
            rule_script: Utf8PathBuf::from(DEFAULT_RULE_SCRIPT),
            cgroup_root: None,
            runtime_dir: default_runtime_dir(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Resolves settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves settings using the supplied variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut settings = Self::default();

        if let Some(raw) = get(SOCKET_VAR) {
            settings.socket = raw
                .parse()
                .map_err(|source| SettingsError::Socket { value: raw, source })?;
        }
        if let Some(raw) = get(CONFIG_VAR) {
            settings.config_path = Utf8PathBuf::from(raw);
        }
        if let Some(raw) = get(RULE_SCRIPT_VAR) {
            settings.rule_script = Utf8PathBuf::from(raw);
        }
        if let Some(raw) = get(CGROUP_ROOT_VAR) {
            settings.cgroup_root = Some(absolute(CGROUP_ROOT_VAR, raw)?);
        }
        if let Some(raw) = get(RUNTIME_DIR_VAR) {
            settings.runtime_dir = absolute(RUNTIME_DIR_VAR, raw)?;
        }
        if let Some(raw) = get(LOG_FILTER_VAR) {
            settings.log_filter = raw;
        }
        if let Some(raw) = get(LOG_FORMAT_VAR) {
            settings.log_format = raw.parse().map_err(|_| SettingsError::InvalidValue {
                variable: LOG_FORMAT_VAR,
                value: raw,
                reason: "expected 'json' or 'compact'",
            })?;
        }
        Ok(settings)
    }

    /// Lowers the log filter to `debug`, as requested by `--debug`.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.log_filter = DEBUG_LOG_FILTER.to_owned();
        }
        self
    }

    /// Replaces the control socket endpoint.
    #[must_use]
    pub fn with_socket(mut self, socket: SocketEndpoint) -> Self {
        self.socket = socket;
        self
    }

    /// Replaces the bootstrap configuration path.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Replaces the runtime directory.
    #[must_use]
    pub fn with_runtime_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    /// Control channel endpoint.
    pub fn socket(&self) -> &SocketEndpoint {
        &self.socket
    }

    /// Bootstrap configuration file.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Rule programming script.
    pub fn rule_script(&self) -> &Utf8Path {
        &self.rule_script
    }

    /// Explicit cgroup2 root, if one was configured.
    pub fn cgroup_root(&self) -> Option<&Utf8Path> {
        self.cgroup_root.as_deref()
    }

    /// Directory for lock, pid and health files.
    pub fn runtime_dir(&self) -> &Utf8Path {
        &self.runtime_dir
    }

    /// Tracing filter expression.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

fn absolute(variable: &'static str, raw: String) -> Result<Utf8PathBuf, SettingsError> {
    if raw.starts_with('/') {
        Ok(Utf8PathBuf::from(raw))
    } else {
        Err(SettingsError::InvalidValue {
            variable,
            value: raw,
            reason: "expected an absolute path",
        })
    }
}

/// Errors raised while resolving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The socket override could not be parsed.
    #[error("invalid CGPROXY_SOCKET '{value}': {source}")]
    Socket {
        value: String,
        #[source]
        source: SocketParseError,
    },
    /// An override had an unusable value.
    #[error("invalid {variable} '{value}': {reason}")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: &'static str,
    },
}
