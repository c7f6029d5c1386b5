//! Control command dispatch.
//!
//! Request lines arrive from the transport layer, are decoded into a
//! [`Command`], and are executed by the [`ControlPlane`]. Every request gets
//! exactly one [`StatusCode`](cgproxy_daemon_types::StatusCode) in reply,
//! whether it succeeded or not.

mod control_plane;
mod errors;
mod handler;
mod request;

pub use self::control_plane::ControlPlane;
pub use self::errors::DispatchError;
pub use self::handler::MAX_REQUEST_BYTES;
pub use self::request::{Command, ProcessClass};

pub(crate) use self::handler::DispatchConnectionHandler;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
