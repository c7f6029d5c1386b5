//! Daemon lifecycle state and the status view exposed to operators.

use std::fmt;
use std::sync::Arc;

use cgproxy_config::ProxyConfig;

use crate::rules::RuleState;

/// Lifecycle phase of the daemon.
///
/// Transitions only move forward: `Starting → Running → Stopping → Stopped`,
/// with `Starting → Stopping` allowed when startup is interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Bootstrap configuration is being loaded.
    Starting,
    /// The control channel is serving commands.
    Running,
    /// Teardown is in progress; new work is refused.
    Stopping,
    /// Rules have been removed and the daemon is exiting.
    Stopped,
}

impl DaemonState {
    /// Stable lowercase name, used in logs and the health file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    /// Whether configuration pushes and classification are still served.
    #[must_use]
    pub const fn accepts_commands(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Point-in-time view of the daemon.
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    state: DaemonState,
    rules: RuleState,
    config: Option<Arc<ProxyConfig>>,
}

impl DaemonStatus {
    pub(crate) fn new(
        state: DaemonState,
        rules: RuleState,
        config: Option<Arc<ProxyConfig>>,
    ) -> Self {
        Self {
            state,
            rules,
            config,
        }
    }

    /// Lifecycle phase.
    #[must_use]
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// What the daemon believes is programmed on the host.
    #[must_use]
    pub fn rules(&self) -> &RuleState {
        &self.rules
    }

    /// Whether a rule generation is currently installed.
    ///
    /// After a failed push this is `false` even though a snapshot is active.
    #[must_use]
    pub fn rules_installed(&self) -> bool {
        matches!(self.rules, RuleState::Installed(_))
    }

    /// Id of the installed generation, if any.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        match &self.rules {
            RuleState::Installed(generation) => Some(generation.id()),
            RuleState::Unknown | RuleState::Clean => None,
        }
    }

    /// Active snapshot used for classification.
    #[must_use]
    pub fn config(&self) -> Option<&Arc<ProxyConfig>> {
        self.config.as_ref()
    }
}
