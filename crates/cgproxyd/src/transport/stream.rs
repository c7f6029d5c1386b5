//! Accepted connection streams.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

/// Client connection accepted by the control listener.
#[derive(Debug)]
pub(crate) struct ConnectionStream {
    inner: UnixStream,
}

impl ConnectionStream {
    pub(crate) fn new(inner: UnixStream) -> Self {
        Self { inner }
    }

    /// Returns a second handle to the same socket.
    ///
    /// Handlers read through a buffered clone while replying on the original.
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        self.inner.try_clone().map(Self::new)
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Serves one connection until the peer closes it. Must not panic.
    fn handle(&self, stream: ConnectionStream);
}
