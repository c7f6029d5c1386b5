//! Packet diversion rule lifecycle.
//!
//! [`RuleApplier`] owns the only copy of the installed-rule state. Every
//! install is preceded by a removal, so applying a new snapshot never stacks a
//! second rule set on top of the first. A failed install leaves the host with
//! no rules rather than a partial set.

mod script;
#[cfg(test)]
pub(crate) mod test_doubles;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use cgproxy_config::ProxyConfig;

pub use self::script::ScriptRuleBackend;

const RULES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rules");

/// Which half of the rule lifecycle an invocation performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Programming rules for a snapshot.
    Install,
    /// Removing every rule the daemon owns.
    Remove,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Install => "install",
            Self::Remove => "remove",
        })
    }
}

/// Failures raised while programming or removing rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule program could not be started.
    #[error("failed to run rule script '{program}' for {action}: {source}")]
    Spawn {
        program: String,
        action: RuleAction,
        #[source]
        source: std::io::Error,
    },
    /// The rule program ran and reported failure.
    #[error("rule {action} failed ({status}): {stderr}")]
    Exited {
        action: RuleAction,
        status: String,
        stderr: String,
    },
}

impl RuleError {
    /// The lifecycle step that failed.
    #[must_use]
    pub fn action(&self) -> RuleAction {
        match self {
            Self::Spawn { action, .. } | Self::Exited { action, .. } => *action,
        }
    }
}

/// Host-side rule programming.
///
/// `remove` must succeed when no rules are present.
pub trait RuleBackend: Send + Sync {
    /// Installs the rule set described by `config`.
    fn install(&self, config: &ProxyConfig) -> Result<(), RuleError>;

    /// Removes every rule the daemon may have installed.
    fn remove(&self) -> Result<(), RuleError>;
}

impl<T: RuleBackend + ?Sized> RuleBackend for Arc<T> {
    fn install(&self, config: &ProxyConfig) -> Result<(), RuleError> {
        self.as_ref().install(config)
    }

    fn remove(&self) -> Result<(), RuleError> {
        self.as_ref().remove()
    }
}

/// One successful install.
#[derive(Debug, Clone)]
pub struct Generation {
    id: u64,
    config: Arc<ProxyConfig>,
}

impl Generation {
    /// Monotonic install counter, starting at 1.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Snapshot the installed rules were derived from.
    #[must_use]
    pub fn config(&self) -> &Arc<ProxyConfig> {
        &self.config
    }
}

/// What the daemon believes is programmed on the host.
#[derive(Debug, Clone)]
pub enum RuleState {
    /// Nothing is known; a previous run or a failed removal may have left
    /// rules behind.
    Unknown,
    /// No daemon rules are present.
    Clean,
    /// Exactly one generation is installed.
    Installed(Generation),
}

/// Applies and tears down rule generations through a [`RuleBackend`].
pub struct RuleApplier {
    backend: Box<dyn RuleBackend>,
    state: RuleState,
    generations: u64,
}

impl fmt::Debug for RuleApplier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RuleApplier")
            .field("state", &self.state)
            .field("generations", &self.generations)
            .finish_non_exhaustive()
    }
}

impl RuleApplier {
    /// Creates an applier. Rules left by an earlier run are unknown until the
    /// first apply or teardown clears them.
    pub fn new(backend: impl RuleBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            state: RuleState::Unknown,
            generations: 0,
        }
    }

    /// Current rule state.
    #[must_use]
    pub fn state(&self) -> &RuleState {
        &self.state
    }

    /// The installed generation, if any.
    #[must_use]
    pub fn installed(&self) -> Option<&Generation> {
        match &self.state {
            RuleState::Installed(generation) => Some(generation),
            RuleState::Unknown | RuleState::Clean => None,
        }
    }

    /// Replaces whatever is installed with rules for `config` and returns the
    /// new generation id.
    ///
    /// On failure no rules derived from any snapshot remain in effect, as far
    /// as the backend can guarantee it.
    pub fn apply(&mut self, config: &Arc<ProxyConfig>) -> Result<u64, RuleError> {
        self.state = RuleState::Unknown;
        self.backend.remove()?;
        self.state = RuleState::Clean;

        if let Err(error) = self.backend.install(config) {
            warn!(target: RULES_TARGET, error = %error, "rule install failed, clearing partial rules");
            self.clear_after_failed_install();
            return Err(error);
        }

        self.generations += 1;
        info!(
            target: RULES_TARGET,
            generation = self.generations,
            proxy_cgroup = %config.proxy_cgroup(),
            noproxy_cgroup = %config.noproxy_cgroup(),
            port = config.port(),
            "diversion rules installed"
        );
        self.state = RuleState::Installed(Generation {
            id: self.generations,
            config: Arc::clone(config),
        });
        Ok(self.generations)
    }

    /// Removes every daemon rule. A no-op when already clean.
    pub fn teardown(&mut self) -> Result<(), RuleError> {
        if matches!(self.state, RuleState::Clean) {
            debug!(target: RULES_TARGET, "no diversion rules to remove");
            return Ok(());
        }
        match self.backend.remove() {
            Ok(()) => {
                self.state = RuleState::Clean;
                info!(target: RULES_TARGET, "diversion rules removed");
                Ok(())
            }
            Err(error) => {
                self.state = RuleState::Unknown;
                Err(error)
            }
        }
    }

    fn clear_after_failed_install(&mut self) {
        match self.backend.remove() {
            Ok(()) => self.state = RuleState::Clean,
            Err(cleanup) => {
                warn!(
                    target: RULES_TARGET,
                    error = %cleanup,
                    "cleanup after failed install also failed"
                );
                self.state = RuleState::Unknown;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::test_doubles::{RecordingRuleBackend, RuleEvent};
    use super::*;

    fn config(proxy: &str) -> Arc<ProxyConfig> {
        Arc::new(
            ProxyConfig::validate(json!({"proxy_cgroup": proxy, "noproxy_cgroup": "/noproxy"}))
                .expect("valid config"),
        )
    }

    #[fixture]
    fn backend() -> RecordingRuleBackend {
        RecordingRuleBackend::default()
    }

    #[rstest]
    fn apply_removes_before_installing(backend: RecordingRuleBackend) {
        let mut applier = RuleApplier::new(backend.clone());
        let first = config("/a");
        let second = config("/b");

        assert_eq!(applier.apply(&first).expect("first apply"), 1);
        assert_eq!(applier.apply(&second).expect("second apply"), 2);

        assert_eq!(
            backend.events(),
            vec![
                RuleEvent::Remove,
                RuleEvent::Install("/a".to_owned()),
                RuleEvent::Remove,
                RuleEvent::Install("/b".to_owned()),
            ]
        );
        assert_eq!(backend.max_live_generations(), 1);
        let installed = applier.installed().expect("installed generation");
        assert_eq!(installed.config().as_ref(), second.as_ref());
    }

    #[rstest]
    fn failed_install_leaves_no_rules(backend: RecordingRuleBackend) {
        let mut applier = RuleApplier::new(backend.clone());
        applier.apply(&config("/a")).expect("first apply");

        backend.fail_install(true);
        let error = applier.apply(&config("/b")).expect_err("install fails");

        assert_eq!(error.action(), RuleAction::Install);
        assert!(applier.installed().is_none());
        assert!(matches!(applier.state(), RuleState::Clean));
        assert_eq!(backend.live(), None);
    }

    #[rstest]
    fn failed_cleanup_after_install_marks_state_unknown(backend: RecordingRuleBackend) {
        let mut applier = RuleApplier::new(backend.clone());
        backend.fail_install(true);
        backend.fail_remove_after(1);

        applier.apply(&config("/a")).expect_err("install fails");

        assert!(matches!(applier.state(), RuleState::Unknown));
        assert!(applier.installed().is_none());
    }

    #[rstest]
    fn failed_remove_aborts_apply(backend: RecordingRuleBackend) {
        let mut applier = RuleApplier::new(backend.clone());
        backend.fail_remove_after(0);

        let error = applier.apply(&config("/a")).expect_err("remove fails");

        assert_eq!(error.action(), RuleAction::Remove);
        assert_eq!(backend.events(), vec![RuleEvent::Remove]);
        assert!(matches!(applier.state(), RuleState::Unknown));
    }

    #[rstest]
    fn teardown_is_idempotent(backend: RecordingRuleBackend) {
        let mut applier = RuleApplier::new(backend.clone());
        applier.apply(&config("/a")).expect("apply");

        applier.teardown().expect("first teardown");
        applier.teardown().expect("second teardown");

        assert_eq!(
            backend.events(),
            vec![
                RuleEvent::Remove,
                RuleEvent::Install("/a".to_owned()),
                RuleEvent::Remove,
            ]
        );
        assert!(matches!(applier.state(), RuleState::Clean));
    }

    #[rstest]
    fn teardown_from_unknown_state_clears_leftovers(backend: RecordingRuleBackend) {
        let mut applier = RuleApplier::new(backend.clone());

        applier.teardown().expect("teardown");

        assert_eq!(backend.events(), vec![RuleEvent::Remove]);
    }
}
