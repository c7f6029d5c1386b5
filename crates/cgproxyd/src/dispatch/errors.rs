//! Error types surfaced while decoding or executing control commands.

use thiserror::Error;

use cgproxy_config::ConfigError;
use cgproxy_daemon_types::StatusCode;

use crate::cgroup::AttachError;
use crate::rules::RuleError;
use crate::state::DaemonState;

/// Failures that map onto a wire status code.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request line was not a JSON envelope with integer `type` and `data`.
    #[error("malformed request: {message}")]
    Malformed {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The envelope was well formed but `data` has the wrong shape for `type`.
    #[error("invalid payload for message type {kind}: expected {expected}")]
    InvalidPayload { kind: i64, expected: &'static str },
    /// The request exceeded the line limit.
    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    /// The `type` discriminant is not one this daemon knows.
    #[error("unknown message type {kind}")]
    UnknownCommand { kind: i64 },
    /// The configuration was rejected or could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Classification was requested before any configuration was accepted.
    #[error("no configuration has been loaded")]
    NotConfigured,
    /// Rule programming failed.
    #[error(transparent)]
    Rules(#[from] RuleError),
    /// The process could not be attached.
    #[error(transparent)]
    Attach(#[from] AttachError),
    /// The daemon no longer accepts work.
    #[error("daemon is {state}")]
    ShuttingDown { state: DaemonState },
    /// Shared state could not be accessed.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Status written back to the client.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed { .. } | Self::InvalidPayload { .. } | Self::TooLarge { .. } => {
                StatusCode::DecodeError
            }
            Self::UnknownCommand { .. } => StatusCode::UnknownCommand,
            Self::Config(error) if error.is_io() => StatusCode::IoError,
            Self::Config(_) | Self::NotConfigured => StatusCode::ConfigError,
            Self::Rules(_) => StatusCode::RuleError,
            Self::Attach(_) => StatusCode::AttachError,
            Self::ShuttingDown { .. } => StatusCode::ShuttingDown,
            Self::Internal { .. } => StatusCode::Internal,
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }
}
