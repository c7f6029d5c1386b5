//! Wire types shared between `cgproxyd` and the clients that drive it.
//!
//! A request is a single JSON line of the form `{"type": <int>, "data": <payload>}`.
//! The daemon answers every request with one line holding the decimal
//! [`StatusCode`].

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Request discriminants understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Push a structured configuration object.
    PushConfigData,
    /// Push the path of a configuration file.
    PushConfigPath,
    /// Move a process into the proxied cgroup.
    ClassifyProxied,
    /// Move a process into the not-proxied cgroup.
    ClassifyNotProxied,
}

impl MessageType {
    /// Returns the integer discriminant used on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::PushConfigData => 0,
            Self::PushConfigPath => 1,
            Self::ClassifyProxied => 2,
            Self::ClassifyNotProxied => 3,
        }
    }

    /// Maps a wire discriminant back to a message type.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::PushConfigData),
            1 => Some(Self::PushConfigPath),
            2 => Some(Self::ClassifyProxied),
            3 => Some(Self::ClassifyNotProxied),
            _ => None,
        }
    }
}

/// Status returned for every request.
///
/// The numeric values are part of the wire contract and never change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The request completed.
    Success,
    /// The request line was not a well-formed message.
    DecodeError,
    /// The `type` discriminant is not recognised.
    UnknownCommand,
    /// The configuration was rejected, or no configuration is loaded yet.
    ConfigError,
    /// The configuration file could not be read.
    IoError,
    /// Programming the diversion rules failed; no rules are in effect.
    RuleError,
    /// The process or cgroup target was invalid.
    AttachError,
    /// The daemon is stopping and refuses further work.
    ShuttingDown,
    /// The daemon hit an internal fault.
    Internal,
}

impl StatusCode {
    /// Returns the integer written on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::DecodeError => 1,
            Self::UnknownCommand => 2,
            Self::ConfigError => 3,
            Self::IoError => 4,
            Self::RuleError => 5,
            Self::AttachError => 6,
            Self::ShuttingDown => 7,
            Self::Internal => 8,
        }
    }

    /// Parses a wire status back into a code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::DecodeError),
            2 => Some(Self::UnknownCommand),
            3 => Some(Self::ConfigError),
            4 => Some(Self::IoError),
            5 => Some(Self::RuleError),
            6 => Some(Self::AttachError),
            7 => Some(Self::ShuttingDown),
            8 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Returns true for [`StatusCode::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Stable lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::DecodeError => "decode_error",
            Self::UnknownCommand => "unknown_command",
            Self::ConfigError => "config_error",
            Self::IoError => "io_error",
            Self::RuleError => "rule_error",
            Self::AttachError => "attach_error",
            Self::ShuttingDown => "shutting_down",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Request envelope as serialised by clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlRequest {
    /// Integer discriminant, see [`MessageType::code`].
    #[serde(rename = "type")]
    pub kind: i64,
    /// Variant payload.
    pub data: Value,
}

impl ControlRequest {
    /// Builds a structured configuration push.
    #[must_use]
    pub fn push_config(config: Value) -> Self {
        Self::new(MessageType::PushConfigData, config)
    }

    /// Builds a configuration file push.
    #[must_use]
    pub fn push_config_path(path: impl Into<String>) -> Self {
        Self::new(MessageType::PushConfigPath, Value::String(path.into()))
    }

    /// Builds a proxied classification request.
    #[must_use]
    pub fn classify_proxied(pid: u32) -> Self {
        Self::new(MessageType::ClassifyProxied, Value::from(pid))
    }

    /// Builds a not-proxied classification request.
    #[must_use]
    pub fn classify_not_proxied(pid: u32) -> Self {
        Self::new(MessageType::ClassifyNotProxied, Value::from(pid))
    }

    fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind: kind.code(),
            data,
        }
    }

    /// Serialises the request as a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error if the payload cannot be encoded.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
