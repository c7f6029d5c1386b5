//! Control plane wired to in-memory collaborators.

use std::sync::Arc;

use serde_json::{Value, json};

use cgproxy_daemon_types::{ControlRequest, StatusCode};

use crate::cgroup::test_doubles::RecordingAttacher;
use crate::dispatch::ControlPlane;
use crate::health::HealthReporter;
use crate::rules::RuleApplier;
use crate::rules::test_doubles::RecordingRuleBackend;

use super::RecordingHealthReporter;

/// Minimal configuration object naming two cgroups.
pub(crate) fn config_json(proxy: &str, noproxy: &str) -> Value {
    json!({ "proxy_cgroup": proxy, "noproxy_cgroup": noproxy })
}

pub(crate) struct PlaneHarness {
    pub(crate) plane: ControlPlane,
    pub(crate) rules: RecordingRuleBackend,
    pub(crate) attacher: RecordingAttacher,
    pub(crate) reporter: Arc<RecordingHealthReporter>,
}

impl PlaneHarness {
    /// Builds a running control plane with no configuration.
    pub(crate) fn running() -> Self {
        let harness = Self::starting();
        harness.plane.mark_running();
        harness
    }

    pub(crate) fn starting() -> Self {
        let rules = RecordingRuleBackend::default();
        let attacher = RecordingAttacher::default();
        let reporter = Arc::new(RecordingHealthReporter::default());
        let plane = ControlPlane::new(
            RuleApplier::new(rules.clone()),
            attacher.clone(),
            Arc::clone(&reporter) as Arc<dyn HealthReporter>,
        );
        Self {
            plane,
            rules,
            attacher,
            reporter,
        }
    }

    /// Sends `request` through the line decoder, as a client would.
    pub(crate) fn send(&self, request: &ControlRequest) -> StatusCode {
        let line = request.to_line().expect("serialise request");
        self.plane.handle_line(line.trim_end().as_bytes())
    }

    pub(crate) fn send_raw(&self, line: &str) -> StatusCode {
        self.plane.handle_line(line.as_bytes())
    }

    /// Proxy cgroup of the active snapshot.
    pub(crate) fn active_proxy_cgroup(&self) -> Option<String> {
        self.plane
            .status()
            .config()
            .map(|config| config.proxy_cgroup().as_str().to_owned())
    }
}
