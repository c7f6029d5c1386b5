//! Process supervision: singleton guard, health file, signals and launch.

mod errors;
mod guard;
mod health_file;
pub(crate) mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use health_file::HealthFile;
pub use launch::run_daemon;
pub use shutdown::{
    ShutdownError, ShutdownReason, ShutdownSignal, SystemShutdownSignal, TERMINATION_SIGNALS,
};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
