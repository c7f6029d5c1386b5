//! Connection handler that answers each request line with a status.

use std::io::{self, BufRead, BufReader, Read, Write};

use tracing::{debug, warn};

use cgproxy_daemon_types::StatusCode;

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::{ControlPlane, DISPATCH_TARGET, DispatchError};

/// Longest accepted request line, excluding the terminator.
pub const MAX_REQUEST_BYTES: u64 = 64 * 1024;

enum RequestLine {
    Line(Vec<u8>),
    TooLarge,
    Closed,
}

/// Serves newline-delimited requests until the client disconnects.
///
/// Each request gets exactly one reply line holding the decimal status code.
/// An oversized request is answered with a decode error and the connection is
/// closed, since the rest of that line cannot be resynchronised.
pub(crate) struct DispatchConnectionHandler {
    plane: ControlPlane,
}

impl DispatchConnectionHandler {
    pub(crate) fn new(plane: ControlPlane) -> Self {
        Self { plane }
    }

    fn serve(&self, mut stream: ConnectionStream) -> io::Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        loop {
            match read_request(&mut reader)? {
                RequestLine::Closed => return Ok(()),
                RequestLine::TooLarge => {
                    let error = DispatchError::TooLarge {
                        limit: MAX_REQUEST_BYTES,
                    };
                    warn!(target: DISPATCH_TARGET, error = %error, "closing connection");
                    return write_status(&mut stream, error.status());
                }
                RequestLine::Line(line) => {
                    let status = self.plane.handle_line(&line);
                    write_status(&mut stream, status)?;
                }
            }
        }
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        debug!(target: DISPATCH_TARGET, "client connected");
        if let Err(error) = self.serve(stream) {
            warn!(target: DISPATCH_TARGET, error = %error, "connection aborted");
        }
    }
}

fn read_request<R: BufRead>(reader: &mut R) -> io::Result<RequestLine> {
    let mut line = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_REQUEST_BYTES + 1)
        .read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(RequestLine::Closed);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    let length = u64::try_from(line.len()).unwrap_or(u64::MAX);
    if length > MAX_REQUEST_BYTES {
        return Ok(RequestLine::TooLarge);
    }
    Ok(RequestLine::Line(line))
}

fn write_status(stream: &mut ConnectionStream, status: StatusCode) -> io::Result<()> {
    writeln!(stream, "{}", status.code())?;
    stream.flush()
}
