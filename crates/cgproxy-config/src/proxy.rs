//! The proxy configuration snapshot and its validator.

use std::fmt;
use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::defaults::{DEFAULT_FWMARK, DEFAULT_PORT, DEFAULT_TABLE};
use crate::error::ConfigError;

/// Absolute cgroup path relative to the cgroup2 mount, such as `/proxy.slice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CgroupPath(String);

impl CgroupPath {
    /// Validates a cgroup path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the path is empty, relative,
    /// contains `.`/`..` or empty components, or contains whitespace or NUL.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if raw.is_empty() {
            return Err(ConfigError::invalid("cgroup path is empty"));
        }
        if !raw.starts_with('/') {
            return Err(ConfigError::invalid(format!(
                "cgroup path '{raw}' must be absolute"
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c == '\0') {
            return Err(ConfigError::invalid(format!(
                "cgroup path '{raw}' contains whitespace or NUL"
            )));
        }
        let body = raw.trim_end_matches('/');
        if body.is_empty() {
            return Ok(Self("/".to_owned()));
        }
        for component in body.split('/').skip(1) {
            if component.is_empty() || component == "." || component == ".." {
                return Err(ConfigError::invalid(format!(
                    "cgroup path '{raw}' has an invalid component"
                )));
            }
        }
        Ok(Self(body.to_owned()))
    }

    /// The path as given, with a leading `/`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path without its leading `/`, suitable for joining onto a mount point.
    #[must_use]
    pub fn relative(&self) -> &str {
        self.0.trim_start_matches('/')
    }
}

impl fmt::Display for CgroupPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Serde view of the configuration object before semantic checks.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProxyConfig {
    proxy_cgroup: String,
    noproxy_cgroup: String,
    #[serde(default)]
    extra_proxy_cgroups: Vec<String>,
    #[serde(default)]
    extra_noproxy_cgroups: Vec<String>,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_fwmark")]
    fwmark: u32,
    #[serde(default = "default_table")]
    table: u32,
    #[serde(default = "enabled")]
    enable_tcp: bool,
    #[serde(default = "enabled")]
    enable_udp: bool,
    #[serde(default = "enabled")]
    enable_ipv4: bool,
    #[serde(default = "enabled")]
    enable_ipv6: bool,
    #[serde(default = "enabled")]
    enable_dns: bool,
    #[serde(default)]
    enable_gateway: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_fwmark() -> u32 {
    DEFAULT_FWMARK
}

fn default_table() -> u32 {
    DEFAULT_TABLE
}

fn enabled() -> bool {
    true
}

/// Validated, immutable configuration snapshot.
///
/// Instances are only produced by [`ProxyConfig::validate`] and
/// [`ProxyConfig::validate_from_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyConfig {
    proxy_cgroup: CgroupPath,
    noproxy_cgroup: CgroupPath,
    extra_proxy_cgroups: Vec<CgroupPath>,
    extra_noproxy_cgroups: Vec<CgroupPath>,
    port: u16,
    fwmark: u32,
    table: u32,
    enable_tcp: bool,
    enable_udp: bool,
    enable_ipv4: bool,
    enable_ipv6: bool,
    enable_dns: bool,
    enable_gateway: bool,
}

impl ProxyConfig {
    /// Builds a snapshot from a structured configuration object.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a required field is missing, a
    /// field has the wrong type, an unknown field is present, or a value fails
    /// its semantic check.
    pub fn validate(data: Value) -> Result<Self, ConfigError> {
        if !data.is_object() {
            return Err(ConfigError::invalid("configuration must be a JSON object"));
        }
        let raw: RawProxyConfig =
            serde_json::from_value(data).map_err(|error| ConfigError::invalid(error.to_string()))?;
        Self::from_raw(raw)
    }

    /// Reads a JSON configuration file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Invalid`] when its content is not a valid configuration.
    pub fn validate_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: Utf8PathBuf::from(path.to_string_lossy().into_owned()),
            source,
        })?;
        let data: Value = serde_json::from_str(&content).map_err(|error| {
            ConfigError::invalid(format!("{}: {error}", path.display()))
        })?;
        Self::validate(data)
    }

    fn from_raw(raw: RawProxyConfig) -> Result<Self, ConfigError> {
        if raw.port == 0 {
            return Err(ConfigError::invalid("port must be non-zero"));
        }
        if raw.fwmark == 0 {
            return Err(ConfigError::invalid("fwmark must be non-zero"));
        }
        if raw.table == 0 {
            return Err(ConfigError::invalid("table must be non-zero"));
        }
        if !raw.enable_tcp && !raw.enable_udp {
            return Err(ConfigError::invalid(
                "at least one of enable_tcp and enable_udp must be set",
            ));
        }
        let proxy_cgroup = CgroupPath::parse(&raw.proxy_cgroup)?;
        let noproxy_cgroup = CgroupPath::parse(&raw.noproxy_cgroup)?;
        if proxy_cgroup == noproxy_cgroup {
            return Err(ConfigError::invalid(
                "proxy_cgroup and noproxy_cgroup must differ",
            ));
        }
        Ok(Self {
            proxy_cgroup,
            noproxy_cgroup,
            extra_proxy_cgroups: parse_all(&raw.extra_proxy_cgroups)?,
            extra_noproxy_cgroups: parse_all(&raw.extra_noproxy_cgroups)?,
            port: raw.port,
            fwmark: raw.fwmark,
            table: raw.table,
            enable_tcp: raw.enable_tcp,
            enable_udp: raw.enable_udp,
            enable_ipv4: raw.enable_ipv4,
            enable_ipv6: raw.enable_ipv6,
            enable_dns: raw.enable_dns,
            enable_gateway: raw.enable_gateway,
        })
    }

    /// Cgroup that "classify proxied" attaches processes to.
    #[must_use]
    pub fn proxy_cgroup(&self) -> &CgroupPath {
        &self.proxy_cgroup
    }

    /// Cgroup that "classify not proxied" attaches processes to.
    #[must_use]
    pub fn noproxy_cgroup(&self) -> &CgroupPath {
        &self.noproxy_cgroup
    }

    /// TPROXY listener port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Packet mark used by the diversion rules.
    #[must_use]
    pub fn fwmark(&self) -> u32 {
        self.fwmark
    }

    /// Policy routing table id.
    #[must_use]
    pub fn table(&self) -> u32 {
        self.table
    }

    /// Environment handed to the rule script.
    ///
    /// Cgroup lists are space separated with the classification cgroup first.
    #[must_use]
    pub fn rule_environment(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "cgroup_proxy",
                join_cgroups(&self.proxy_cgroup, &self.extra_proxy_cgroups),
            ),
            (
                "cgroup_noproxy",
                join_cgroups(&self.noproxy_cgroup, &self.extra_noproxy_cgroups),
            ),
            ("port", self.port.to_string()),
            ("fwmark", format!("{:#x}", self.fwmark)),
            ("table", self.table.to_string()),
            ("enable_tcp", self.enable_tcp.to_string()),
            ("enable_udp", self.enable_udp.to_string()),
            ("enable_ipv4", self.enable_ipv4.to_string()),
            ("enable_ipv6", self.enable_ipv6.to_string()),
            ("enable_dns", self.enable_dns.to_string()),
            ("enable_gateway", self.enable_gateway.to_string()),
        ]
    }
}

fn parse_all(raw: &[String]) -> Result<Vec<CgroupPath>, ConfigError> {
    raw.iter().map(|path| CgroupPath::parse(path)).collect()
}

fn join_cgroups(primary: &CgroupPath, extra: &[CgroupPath]) -> String {
    std::iter::once(primary)
        .chain(extra)
        .map(CgroupPath::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
