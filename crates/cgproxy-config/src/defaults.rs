//! Well-known locations and parameter defaults.

use std::env;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use nix::unistd::geteuid;

/// Bootstrap configuration loaded before the control channel opens.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cgproxy/config.json";

/// Unix socket the control channel listens on.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/cgproxy_unix_socket";

/// Script that programs (and with `stop`, removes) the TPROXY rules.
pub const DEFAULT_RULE_SCRIPT: &str = "/usr/share/cgproxy/scripts/cgroup-tproxy.sh";

/// Default TPROXY listener port.
pub const DEFAULT_PORT: u16 = 12345;

/// Default packet mark used by the diversion rules.
pub const DEFAULT_FWMARK: u32 = 0x9973;

/// Default policy routing table id.
pub const DEFAULT_TABLE: u32 = 10007;

/// Log filter used unless overridden.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Log filter selected by `--debug`.
pub const DEBUG_LOG_FILTER: &str = "debug";

/// Where lock, pid and health files live when no override is given.
///
/// Root uses `/run/cgproxy`; other users get the XDG runtime directory or a
/// per-uid directory under the system temp dir.
pub(crate) fn default_runtime_dir() -> Utf8PathBuf {
    default_runtime_dir_inner()
}

#[cfg(unix)]
fn default_runtime_dir_inner() -> Utf8PathBuf {
    let euid = geteuid();
    if euid.is_root() {
        return Utf8PathBuf::from("/run/cgproxy");
    }
    if let Some(dir) = runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        return dir.join("cgproxy");
    }
    let mut dir = fallback_base_directory();
    dir.push("cgproxy");
    dir.push(format!("uid-{}", euid.as_raw()));
    dir
}

#[cfg(not(unix))]
fn default_runtime_dir_inner() -> Utf8PathBuf {
    let mut dir = fallback_base_directory();
    dir.push("cgproxy");
    dir
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
