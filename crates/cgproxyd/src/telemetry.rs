//! Structured telemetry initialisation for the daemon.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use cgproxy_config::{LogFormat, Settings};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return a fresh handle without touching global state, even if
/// the settings differ.
///
/// # Examples
///
/// ```rust
/// use cgproxy_config::Settings;
/// use cgproxyd::telemetry;
///
/// # fn main() -> Result<(), cgproxyd::telemetry::TelemetryError> {
/// let settings = Settings::default().with_debug(true);
/// let first = telemetry::initialise(&settings)?;
/// let second = telemetry::initialise(&settings)?;
/// drop(first);
/// drop(second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(settings: &Settings) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(settings))
        .map(|()| TelemetryHandle)
}

fn build_filter(settings: &Settings) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(settings.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn install_subscriber(settings: &Settings) -> Result<(), TelemetryError> {
    let filter = build_filter(settings)?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match settings.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_filter(filter: &str) -> Settings {
        Settings::from_lookup(|key| (key == "CGPROXY_LOG").then(|| filter.to_owned()))
            .expect("settings resolve")
    }

    #[test]
    fn invalid_filter_is_rejected_before_install() {
        let error = build_filter(&settings_with_filter("cgproxyd=notalevel")).expect_err("bad");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }

    #[test]
    fn debug_settings_build_a_filter() {
        build_filter(&Settings::default().with_debug(true)).expect("debug filter");
    }
}
