//! Shared fakes and harnesses for the behaviour suites.

mod harness;
mod reporter;

pub(crate) use harness::{PlaneHarness, config_json};
pub(crate) use reporter::{HealthEvent, RecordingHealthReporter};
