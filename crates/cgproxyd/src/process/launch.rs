//! Daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::{error, info, warn};

use cgproxy_config::{RuntimePaths, Settings};

use crate::bootstrap::bootstrap_with;
use crate::cgroup::{CgroupAttacher, CgroupFsAttacher};
use crate::dispatch::{ControlPlane, DispatchConnectionHandler};
use crate::health::{HealthFanout, HealthReporter, StructuredHealthReporter};
use crate::rules::{RuleApplier, RuleBackend, ScriptRuleBackend};
use crate::telemetry;
use crate::transport::SocketListener;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::guard::ProcessGuard;
use super::health_file::HealthFile;
use super::shutdown::{ShutdownReason, ShutdownSignal, SystemShutdownSignal};

/// Host-facing collaborators.
pub(crate) struct ServiceDeps<R, A> {
    pub(crate) rules: R,
    pub(crate) attacher: A,
    pub(crate) reporter: Arc<dyn HealthReporter>,
}

/// Everything needed to run the daemon.
pub(crate) struct LaunchPlan<S, R, A> {
    pub(crate) settings: Settings,
    pub(crate) shutdown: S,
    pub(crate) services: ServiceDeps<R, A>,
}

/// Removes installed rules when dropped, so an early return or panic after
/// bootstrap still leaves the host clean.
struct TeardownGuard {
    plane: ControlPlane,
}

impl TeardownGuard {
    fn teardown(&self) {
        if let Err(error) = self.plane.stop() {
            error!(
                target: PROCESS_TARGET,
                error = %error,
                "failed to remove diversion rules during shutdown"
            );
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Runs the daemon with production collaborators until a termination signal
/// arrives.
///
/// Signal handlers are installed before anything else so a signal during
/// startup is not lost.
pub fn run_daemon(debug: bool) -> Result<ShutdownReason, LaunchError> {
    let shutdown = SystemShutdownSignal::install()?;
    let settings = Settings::from_env()?.with_debug(debug);
    telemetry::initialise(&settings)?;
    let services = ServiceDeps {
        rules: ScriptRuleBackend::new(settings.rule_script()),
        attacher: CgroupFsAttacher::resolve(settings.cgroup_root()),
        reporter: Arc::new(StructuredHealthReporter::new()),
    };
    run_daemon_with(LaunchPlan {
        settings,
        shutdown,
        services,
    })
}

/// Takes the singleton lock and writes the pid file.
///
/// Only a live daemon holding the lock stops startup. Any other runtime file
/// failure is logged and the daemon runs unguarded, without a health file.
fn acquire_runtime_guard(
    settings: &Settings,
    pid: u32,
) -> Result<Option<ProcessGuard>, LaunchError> {
    let acquired = RuntimePaths::from_settings(settings)
        .map_err(LaunchError::from)
        .and_then(ProcessGuard::acquire)
        .and_then(|guard| guard.write_pid(pid).map(|()| guard));
    match acquired {
        Ok(guard) => Ok(Some(guard)),
        Err(error @ LaunchError::AlreadyRunning { .. }) => Err(error),
        Err(error) => {
            warn!(
                target: PROCESS_TARGET,
                error = %error,
                runtime_dir = %settings.runtime_dir(),
                "runtime files unavailable; continuing without singleton guard"
            );
            Ok(None)
        }
    }
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<S, R, A>(
    plan: LaunchPlan<S, R, A>,
) -> Result<ShutdownReason, LaunchError>
where
    S: ShutdownSignal,
    R: RuleBackend + 'static,
    A: CgroupAttacher + 'static,
{
    let LaunchPlan {
        settings,
        shutdown,
        services,
    } = plan;
    info!(
        target: PROCESS_TARGET,
        socket = %settings.socket(),
        config = %settings.config_path(),
        "starting daemon runtime"
    );

    settings.socket().prepare_filesystem()?;
    let pid = std::process::id();
    let guard = acquire_runtime_guard(&settings, pid)?;

    let mut reporters = vec![services.reporter];
    if let Some(guard) = &guard {
        reporters.push(Arc::new(HealthFile::new(guard.paths().health_path(), pid)));
    }
    let reporter: Arc<dyn HealthReporter> = Arc::new(HealthFanout::new(reporters));
    let plane = ControlPlane::new(
        RuleApplier::new(services.rules),
        services.attacher,
        reporter,
    );
    let teardown = TeardownGuard {
        plane: plane.clone(),
    };

    let listener = SocketListener::bind(settings.socket())?;
    if let Ok(generation) = bootstrap_with(&plane, settings.config_path()) {
        info!(target: PROCESS_TARGET, generation, "bootstrap configuration installed");
    }
    let handle = listener.start(Arc::new(DispatchConnectionHandler::new(plane.clone())))?;
    plane.mark_running();

    let waited = shutdown.wait();
    info!(target: PROCESS_TARGET, "stopping daemon");
    teardown.teardown();
    handle.shutdown();
    handle.join()?;
    drop(guard);

    let reason = waited?;
    info!(target: PROCESS_TARGET, ?reason, "shutdown sequence completed");
    Ok(reason)
}
