//! Decoding request lines into commands.

use camino::Utf8PathBuf;
use serde::Deserialize;
use serde_json::Value;

use cgproxy_config::{CgroupPath, ProxyConfig};
use cgproxy_daemon_types::MessageType;

use super::DispatchError;

/// Raw envelope. Both fields are required; extra fields are ignored.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: i64,
    data: Value,
}

/// Which classification cgroup a process belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessClass {
    /// Traffic is diverted to the proxy.
    Proxied,
    /// Traffic bypasses the proxy.
    NotProxied,
}

impl ProcessClass {
    /// The cgroup `config` assigns to this class.
    #[must_use]
    pub fn cgroup(self, config: &ProxyConfig) -> &CgroupPath {
        match self {
            Self::Proxied => config.proxy_cgroup(),
            Self::NotProxied => config.noproxy_cgroup(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Proxied => "proxied",
            Self::NotProxied => "not_proxied",
        }
    }
}

/// A decoded control command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the configuration with an inline object.
    PushConfig(Value),
    /// Replace the configuration with the contents of a file.
    PushConfigFile(Utf8PathBuf),
    /// Move a process into a classification cgroup.
    Classify { pid: u32, class: ProcessClass },
    /// A well-formed envelope whose `type` is not recognised.
    Unknown { kind: i64 },
}

impl Command {
    /// Decodes one request line. Trailing whitespace, including the line
    /// terminator, is ignored.
    pub fn decode(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = line.trim_ascii_end();
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request"));
        }
        let Envelope { kind, data } = serde_json::from_slice(trimmed)?;
        let Some(message) = MessageType::from_code(kind) else {
            return Ok(Self::Unknown { kind });
        };
        match message {
            MessageType::PushConfigData => match data {
                Value::Object(_) => Ok(Self::PushConfig(data)),
                _ => Err(invalid(kind, "a configuration object")),
            },
            MessageType::PushConfigPath => match data {
                Value::String(path) if !path.is_empty() => {
                    Ok(Self::PushConfigFile(Utf8PathBuf::from(path)))
                }
                _ => Err(invalid(kind, "a non-empty file path")),
            },
            MessageType::ClassifyProxied => Ok(Self::Classify {
                pid: decode_pid(kind, &data)?,
                class: ProcessClass::Proxied,
            }),
            MessageType::ClassifyNotProxied => Ok(Self::Classify {
                pid: decode_pid(kind, &data)?,
                class: ProcessClass::NotProxied,
            }),
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::PushConfig(_) => "push_config",
            Self::PushConfigFile(_) => "push_config_file",
            Self::Classify { class, .. } => class.name(),
            Self::Unknown { .. } => "unknown",
        }
    }
}

fn decode_pid(kind: i64, data: &Value) -> Result<u32, DispatchError> {
    data.as_u64()
        .filter(|pid| *pid > 0)
        .and_then(|pid| u32::try_from(pid).ok())
        .ok_or_else(|| invalid(kind, "a positive process id"))
}

const fn invalid(kind: i64, expected: &'static str) -> DispatchError {
    DispatchError::InvalidPayload { kind, expected }
}
