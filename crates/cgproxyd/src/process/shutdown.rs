//! Termination signal handling.

use std::io;
use std::process::ExitCode;
use std::sync::Mutex;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Signals that stop the daemon.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Why the daemon stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A termination signal arrived.
    Signal(i32),
    /// The signal source was closed without a signal.
    Closed,
}

impl ShutdownReason {
    /// Conventional exit status: `128 + signal`, or `0`.
    #[must_use]
    pub fn exit_status(self) -> u8 {
        match self {
            Self::Signal(signal) => u8::try_from(128 + signal).unwrap_or(u8::MAX),
            Self::Closed => 0,
        }
    }

    /// [`Self::exit_status`] as a process exit code.
    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    fn wait(&self) -> Result<ShutdownReason, ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal iterator was already consumed by another waiter.
    #[error("signal listener is unavailable")]
    Unavailable,
}

/// Shutdown listener backed by process signal handlers.
///
/// Handlers are registered on construction, so signals arriving before
/// [`ShutdownSignal::wait`] is called are queued rather than lost.
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
    handle: Handle,
}

impl SystemShutdownSignal {
    /// Registers handlers for [`TERMINATION_SIGNALS`].
    pub fn install() -> Result<Self, ShutdownError> {
        let signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        Ok(Self {
            signals: Mutex::new(signals),
            handle,
        })
    }

    /// Wakes the waiter without a signal.
    pub fn close(&self) {
        self.handle.close();
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownReason, ShutdownError> {
        let mut signals = self.signals.lock().map_err(|_| ShutdownError::Unavailable)?;
        match signals.forever().next() {
            Some(signal) => {
                info!(target: PROCESS_TARGET, signal, "shutdown signal received");
                Ok(ShutdownReason::Signal(signal))
            }
            None => Ok(ShutdownReason::Closed),
        }
    }
}
