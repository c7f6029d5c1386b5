//! Control channel sockets.
//!
//! The listener binds the configured endpoint and accepts connections on a
//! background thread, handing each one to a [`ConnectionHandler`] on its own
//! thread. The handler decides what a connection carries; this module only
//! moves bytes.

mod errors;
mod listener;
mod stream;

pub use self::errors::ListenerError;
pub(crate) use self::listener::SocketListener;
#[cfg(test)]
pub(crate) use self::listener::ListenerHandle;
pub(crate) use self::stream::{ConnectionHandler, ConnectionStream};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
