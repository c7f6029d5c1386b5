//! Test double for [`HealthReporter`] that records lifecycle events for
//! assertions.

use std::sync::Mutex;

use camino::Utf8Path;

use cgproxy_config::ProxyConfig;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::rules::{RuleAction, RuleError};
use crate::state::{DaemonState, DaemonStatus};

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    RulesInstalled(u64),
    RulesFailed(RuleAction),
    RulesRemoved,
    /// Lifecycle state and whether rules were installed at that point.
    Status(DaemonState, bool),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self, _path: &Utf8Path) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &ProxyConfig) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn rules_installed(&self, generation: u64, _config: &ProxyConfig) {
        self.record(HealthEvent::RulesInstalled(generation));
    }

    fn rules_failed(&self, error: &RuleError) {
        self.record(HealthEvent::RulesFailed(error.action()));
    }

    fn rules_removed(&self) {
        self.record(HealthEvent::RulesRemoved);
    }

    fn status_changed(&self, status: &DaemonStatus) {
        self.record(HealthEvent::Status(
            status.state(),
            status.rules_installed(),
        ));
    }
}
