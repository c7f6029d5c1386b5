//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use camino::Utf8Path;

use cgproxy_config::ProxyConfig;

use crate::bootstrap::BootstrapError;
use crate::rules::RuleError;
use crate::state::DaemonStatus;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for lifecycle events.
///
/// Every method defaults to a no-op so sinks only implement the events they
/// consume.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the bootstrap configuration is read.
    fn bootstrap_starting(&self, _path: &Utf8Path) {}

    /// Invoked after the bootstrap configuration was applied.
    fn bootstrap_succeeded(&self, _config: &ProxyConfig) {}

    /// Invoked when the bootstrap configuration could not be applied.
    fn bootstrap_failed(&self, _error: &BootstrapError) {}

    /// Invoked after a rule generation was installed.
    fn rules_installed(&self, _generation: u64, _config: &ProxyConfig) {}

    /// Invoked when installing or removing rules failed.
    fn rules_failed(&self, _error: &RuleError) {}

    /// Invoked after teardown removed every rule.
    fn rules_removed(&self) {}

    /// Invoked whenever the lifecycle state or rule state changes.
    fn status_changed(&self, _status: &DaemonStatus) {}
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self, path: &Utf8Path) {
        (**self).bootstrap_starting(path);
    }

    fn bootstrap_succeeded(&self, config: &ProxyConfig) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn rules_installed(&self, generation: u64, config: &ProxyConfig) {
        (**self).rules_installed(generation, config);
    }

    fn rules_failed(&self, error: &RuleError) {
        (**self).rules_failed(error);
    }

    fn rules_removed(&self) {
        (**self).rules_removed();
    }

    fn status_changed(&self, status: &DaemonStatus) {
        (**self).status_changed(status);
    }
}

/// Forwards every event to each inner reporter in order.
#[derive(Default)]
pub struct HealthFanout {
    reporters: Vec<Arc<dyn HealthReporter>>,
}

impl HealthFanout {
    /// Builds a fanout over the given reporters.
    #[must_use]
    pub fn new(reporters: Vec<Arc<dyn HealthReporter>>) -> Self {
        Self { reporters }
    }

    fn each(&self, event: impl Fn(&dyn HealthReporter)) {
        for reporter in &self.reporters {
            event(reporter.as_ref());
        }
    }
}

impl HealthReporter for HealthFanout {
    fn bootstrap_starting(&self, path: &Utf8Path) {
        self.each(|reporter| reporter.bootstrap_starting(path));
    }

    fn bootstrap_succeeded(&self, config: &ProxyConfig) {
        self.each(|reporter| reporter.bootstrap_succeeded(config));
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.each(|reporter| reporter.bootstrap_failed(error));
    }

    fn rules_installed(&self, generation: u64, config: &ProxyConfig) {
        self.each(|reporter| reporter.rules_installed(generation, config));
    }

    fn rules_failed(&self, error: &RuleError) {
        self.each(|reporter| reporter.rules_failed(error));
    }

    fn rules_removed(&self) {
        self.each(|reporter| reporter.rules_removed());
    }

    fn status_changed(&self, status: &DaemonStatus) {
        self.each(|reporter| reporter.status_changed(status));
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self, path: &Utf8Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            path = %path,
            "loading bootstrap configuration"
        );
    }

    fn bootstrap_succeeded(&self, config: &ProxyConfig) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            proxy_cgroup = %config.proxy_cgroup(),
            noproxy_cgroup = %config.noproxy_cgroup(),
            "bootstrap configuration applied"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "bootstrap configuration not applied; running without rules"
        );
    }

    fn rules_installed(&self, generation: u64, config: &ProxyConfig) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "rules_installed",
            generation,
            port = config.port(),
            "diversion rules active"
        );
    }

    fn rules_failed(&self, error: &RuleError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "rules_failed",
            action = %error.action(),
            error = %error,
            "diversion rule change failed"
        );
    }

    fn rules_removed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "rules_removed",
            "diversion rules removed"
        );
    }

    fn status_changed(&self, status: &DaemonStatus) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "status_changed",
            state = %status.state(),
            rules_installed = status.rules_installed(),
            generation = ?status.generation(),
            "daemon status changed"
        );
    }
}
