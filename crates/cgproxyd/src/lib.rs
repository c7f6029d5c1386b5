//! cgproxy control-plane daemon.
//!
//! The daemon listens on a local control channel for newline-delimited JSON
//! messages. Clients push a proxy configuration (inline or by file path) or
//! ask for a process to be moved into the proxied or non-proxied cgroup. A
//! configuration push replaces the active snapshot and reprograms the TPROXY
//! diversion rules through the rule script; classification writes the PID
//! into the matching cgroup2 `cgroup.procs` file. On a termination signal the
//! daemon refuses further work, removes every rule it installed and exits.

mod bootstrap;
mod cgroup;
mod cli;
mod dispatch;
mod health;
mod process;
mod rules;
mod state;
mod store;
pub mod telemetry;
mod transport;

pub use bootstrap::{BootstrapError, bootstrap_with};
pub use cgroup::{
    AttachError, CgroupAttacher, CgroupFsAttacher, DEFAULT_CGROUP_ROOT, detect_cgroup2_root,
};
pub use cli::Cli;
pub use dispatch::{Command, ControlPlane, DispatchError, MAX_REQUEST_BYTES, ProcessClass};
pub use health::{HealthFanout, HealthReporter, StructuredHealthReporter};
pub use process::{
    HealthFile, LaunchError, ShutdownError, ShutdownReason, ShutdownSignal, SystemShutdownSignal,
    TERMINATION_SIGNALS, run_daemon,
};
pub use rules::{
    Generation, RuleAction, RuleApplier, RuleBackend, RuleError, RuleState, ScriptRuleBackend,
};
pub use state::{DaemonState, DaemonStatus};
pub use store::ConfigStore;
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
