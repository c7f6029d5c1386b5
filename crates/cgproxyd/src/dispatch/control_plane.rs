//! Serialised access to the active configuration and installed rules.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use cgproxy_config::{CgroupPath, ProxyConfig};
use cgproxy_daemon_types::StatusCode;

use crate::cgroup::CgroupAttacher;
use crate::health::HealthReporter;
use crate::rules::{RuleApplier, RuleError};
use crate::state::{DaemonState, DaemonStatus};
use crate::store::ConfigStore;

use super::request::{Command, ProcessClass};
use super::{DISPATCH_TARGET, DispatchError};

/// Everything a configuration change must update together.
#[derive(Debug)]
struct Engine {
    state: DaemonState,
    store: ConfigStore,
    rules: RuleApplier,
}

impl Engine {
    fn ensure_accepting(&self) -> Result<(), DispatchError> {
        if self.state.accepts_commands() {
            Ok(())
        } else {
            Err(DispatchError::ShuttingDown { state: self.state })
        }
    }

    fn status(&self) -> DaemonStatus {
        DaemonStatus::new(
            self.state,
            self.rules.state().clone(),
            self.store.active().cloned(),
        )
    }
}

struct Shared {
    engine: RwLock<Engine>,
    attacher: Box<dyn CgroupAttacher>,
    reporter: Arc<dyn HealthReporter>,
}

/// Executes control commands against the daemon's shared state.
///
/// Configuration pushes and teardown hold the engine's write lock for the
/// whole replace-then-apply sequence, so concurrent pushes are applied one
/// after the other and rule state always matches the active snapshot.
/// Classification only reads the active snapshot; the cgroup write happens
/// after the lock is released.
#[derive(Clone)]
pub struct ControlPlane {
    shared: Arc<Shared>,
}

impl ControlPlane {
    /// Builds a control plane in the `Starting` state with no snapshot.
    pub fn new(
        rules: RuleApplier,
        attacher: impl CgroupAttacher + 'static,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine: RwLock::new(Engine {
                    state: DaemonState::Starting,
                    store: ConfigStore::default(),
                    rules,
                }),
                attacher: Box::new(attacher),
                reporter,
            }),
        }
    }

    /// Decodes and executes one request line, returning its status.
    pub fn handle_line(&self, line: &[u8]) -> StatusCode {
        let result = Command::decode(line).and_then(|command| {
            let label = command.label();
            debug!(target: DISPATCH_TARGET, command = label, "request decoded");
            self.execute(command).map(|()| label)
        });
        match result {
            Ok(label) => {
                debug!(target: DISPATCH_TARGET, command = label, "request completed");
                StatusCode::Success
            }
            Err(error) => {
                let status = error.status();
                warn!(
                    target: DISPATCH_TARGET,
                    status = %status,
                    error = %error,
                    "request failed"
                );
                status
            }
        }
    }

    /// Executes a decoded command.
    pub fn execute(&self, command: Command) -> Result<(), DispatchError> {
        match command {
            Command::PushConfig(data) => {
                let candidate = ConfigStore::validate(data)?;
                self.install(candidate).map(|_| ())
            }
            Command::PushConfigFile(path) => {
                let candidate = ConfigStore::validate_from_file(&path)?;
                self.install(candidate).map(|_| ())
            }
            Command::Classify { pid, class } => self.classify(pid, class),
            Command::Unknown { kind } => Err(DispatchError::UnknownCommand { kind }),
        }
    }

    /// Makes `candidate` active and reprograms rules for it.
    ///
    /// The candidate stays active even when rule programming fails; in that
    /// case no rules are installed and the error is returned.
    pub fn install(&self, candidate: ProxyConfig) -> Result<u64, DispatchError> {
        let mut engine = self.write()?;
        engine.ensure_accepting()?;
        let snapshot = engine.store.replace(candidate);
        info!(
            target: DISPATCH_TARGET,
            proxy_cgroup = %snapshot.proxy_cgroup(),
            noproxy_cgroup = %snapshot.noproxy_cgroup(),
            "configuration accepted"
        );
        let applied = engine.rules.apply(&snapshot);
        match &applied {
            Ok(generation) => self.shared.reporter.rules_installed(*generation, &snapshot),
            Err(error) => self.shared.reporter.rules_failed(error),
        }
        self.publish(&engine);
        applied.map_err(DispatchError::from)
    }

    /// Removes any diversion rules without touching the lifecycle state or
    /// the active snapshot.
    ///
    /// Used when startup has no configuration to install, so rules left by an
    /// earlier run do not keep diverting traffic.
    pub fn clear_rules(&self) -> Result<(), DispatchError> {
        let mut engine = self.write()?;
        engine.ensure_accepting()?;
        let teardown = engine.rules.teardown();
        match &teardown {
            Ok(()) => self.shared.reporter.rules_removed(),
            Err(error) => self.shared.reporter.rules_failed(error),
        }
        self.publish(&engine);
        teardown.map_err(DispatchError::from)
    }

    /// Moves `pid` into the cgroup the active snapshot assigns to `class`.
    pub fn classify(&self, pid: u32, class: ProcessClass) -> Result<(), DispatchError> {
        let cgroup = self.target_cgroup(class)?;
        self.shared.attacher.attach(pid, &cgroup)?;
        Ok(())
    }

    fn target_cgroup(&self, class: ProcessClass) -> Result<CgroupPath, DispatchError> {
        let engine = self.read()?;
        engine.ensure_accepting()?;
        let config = engine.store.active().ok_or(DispatchError::NotConfigured)?;
        Ok(class.cgroup(config).clone())
    }

    /// Marks startup complete. Has no effect once stopping has begun.
    pub fn mark_running(&self) {
        let mut engine = self.write_recovering();
        if engine.state == DaemonState::Starting {
            engine.state = DaemonState::Running;
            info!(target: DISPATCH_TARGET, "daemon running");
            self.publish(&engine);
        }
    }

    /// Refuses further work and removes every installed rule.
    ///
    /// Waits for any in-flight configuration change to finish first. Safe to
    /// call more than once; later calls do nothing.
    pub fn stop(&self) -> Result<(), RuleError> {
        let mut engine = self.write_recovering();
        if engine.state == DaemonState::Stopped {
            return Ok(());
        }
        engine.state = DaemonState::Stopping;
        self.publish(&engine);

        let teardown = engine.rules.teardown();
        match &teardown {
            Ok(()) => self.shared.reporter.rules_removed(),
            Err(error) => self.shared.reporter.rules_failed(error),
        }
        engine.state = DaemonState::Stopped;
        info!(target: DISPATCH_TARGET, "daemon stopped");
        self.publish(&engine);
        teardown
    }

    /// Current lifecycle state, rule state and active snapshot.
    #[must_use]
    pub fn status(&self) -> DaemonStatus {
        self.shared
            .engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    pub(crate) fn reporter(&self) -> &Arc<dyn HealthReporter> {
        &self.shared.reporter
    }

    fn publish(&self, engine: &Engine) {
        self.shared.reporter.status_changed(&engine.status());
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Engine>, DispatchError> {
        self.shared
            .engine
            .read()
            .map_err(|_| DispatchError::internal("daemon state lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Engine>, DispatchError> {
        self.shared
            .engine
            .write()
            .map_err(|_| DispatchError::internal("daemon state lock poisoned"))
    }

    /// Lifecycle transitions and teardown must run even after a panic
    /// poisoned the lock.
    fn write_recovering(&self) -> RwLockWriteGuard<'_, Engine> {
        self.shared
            .engine
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
