//! Errors raised while binding or running the control listener.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open permissions on unix socket {path}: {source}")]
    Permissions {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unix socket {path} is already served by another process")]
    UnixInUse { path: Utf8PathBuf },
    #[error("unix socket path {path} exists and is not a socket")]
    UnixNotSocket { path: Utf8PathBuf },
    #[error("failed to inspect unix socket {path}: {source}")]
    UnixMetadata {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to check existing unix socket {path}: {source}")]
    UnixConnect {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}
