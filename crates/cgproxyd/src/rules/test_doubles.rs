//! Recording rule backend for unit and behaviour tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cgproxy_config::ProxyConfig;

use super::{RuleAction, RuleBackend, RuleError};

/// Backend call observed by [`RecordingRuleBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RuleEvent {
    Install(String),
    Remove,
}

#[derive(Debug, Default)]
struct Inner {
    events: Mutex<Vec<RuleEvent>>,
    live: Mutex<Vec<String>>,
    max_live: AtomicUsize,
    fail_install: AtomicBool,
    removes_before_failure: Mutex<Option<usize>>,
}

/// In-memory backend that tracks which rule sets would be live on the host.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingRuleBackend {
    inner: Arc<Inner>,
}

impl RecordingRuleBackend {
    pub(crate) fn events(&self) -> Vec<RuleEvent> {
        self.inner.events.lock().expect("events lock").clone()
    }

    /// Proxy cgroup of the live rule set, if exactly one is installed.
    pub(crate) fn live(&self) -> Option<String> {
        self.inner.live.lock().expect("live lock").first().cloned()
    }

    /// Highest number of rule sets that were ever live at the same time.
    pub(crate) fn max_live_generations(&self) -> usize {
        self.inner.max_live.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_install(&self, fail: bool) {
        self.inner.fail_install.store(fail, Ordering::SeqCst);
    }

    /// Lets `successes` more removals through, then fails every later one.
    pub(crate) fn fail_remove_after(&self, successes: usize) {
        *self.inner.removes_before_failure.lock().expect("remove lock") = Some(successes);
    }

    fn record(&self, event: RuleEvent) {
        self.inner.events.lock().expect("events lock").push(event);
    }
}

impl RuleBackend for RecordingRuleBackend {
    fn install(&self, config: &ProxyConfig) -> Result<(), RuleError> {
        let proxy = config.proxy_cgroup().as_str().to_owned();
        self.record(RuleEvent::Install(proxy.clone()));
        if self.inner.fail_install.load(Ordering::SeqCst) {
            return Err(RuleError::Exited {
                action: RuleAction::Install,
                status: "exit status: 1".to_owned(),
                stderr: "iptables: chain exists".to_owned(),
            });
        }
        let mut live = self.inner.live.lock().expect("live lock");
        live.push(proxy);
        self.inner.max_live.fetch_max(live.len(), Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self) -> Result<(), RuleError> {
        self.record(RuleEvent::Remove);
        let mut budget = self.inner.removes_before_failure.lock().expect("remove lock");
        match budget.as_mut() {
            Some(0) => {
                return Err(RuleError::Exited {
                    action: RuleAction::Remove,
                    status: "exit status: 1".to_owned(),
                    stderr: "iptables: resource busy".to_owned(),
                });
            }
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        self.inner.live.lock().expect("live lock").clear();
        Ok(())
    }
}
