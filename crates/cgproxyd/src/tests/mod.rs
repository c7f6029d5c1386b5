//! Behaviour suites for the cgproxy daemon.

mod channel_behaviour;
mod support;
