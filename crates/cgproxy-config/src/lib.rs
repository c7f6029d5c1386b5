//! Configuration model shared by the cgproxy daemon and its tooling.
//!
//! Two kinds of configuration live here:
//!
//! - [`ProxyConfig`], the validated snapshot pushed by operators. It names the
//!   cgroups used for classification and the parameters handed to the
//!   diversion rule script. A snapshot only exists once every field has been
//!   checked; there is no partially valid value.
//! - [`Settings`], the daemon's own runtime knobs (socket, bootstrap file,
//!   rule script, logging), resolved from defaults and environment overrides.

mod defaults;
mod error;
mod logging;
mod proxy;
mod runtime;
mod settings;
mod socket;

pub use defaults::{
    DEFAULT_CONFIG_PATH, DEFAULT_FWMARK, DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_RULE_SCRIPT,
    DEFAULT_SOCKET_PATH, DEFAULT_TABLE, DEBUG_LOG_FILTER,
};
pub use error::ConfigError;
pub use logging::{LogFormat, LogFormatParseError};
pub use proxy::{CgroupPath, ProxyConfig};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use settings::{Settings, SettingsError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};
