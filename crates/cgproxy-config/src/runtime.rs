//! Runtime artefact paths written by the daemon supervisor.
//!
//! The runtime directory holds the singleton lock, the pid file and the health
//! snapshot. Anything that inspects a running daemon derives the same layout
//! from [`Settings`].

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Settings;

/// Canonical paths for runtime artefacts.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: Utf8PathBuf,
    lock_path: Utf8PathBuf,
    pid_path: Utf8PathBuf,
    health_path: Utf8PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths and creates the runtime directory.
    pub fn from_settings(settings: &Settings) -> Result<Self, RuntimePathsError> {
        Self::in_dir(settings.runtime_dir())
    }

    /// Derives runtime paths under an explicit directory.
    pub fn in_dir(runtime_dir: &Utf8Path) -> Result<Self, RuntimePathsError> {
        fs::create_dir_all(runtime_dir).map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: runtime_dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            lock_path: runtime_dir.join("cgproxyd.lock"),
            pid_path: runtime_dir.join("cgproxyd.pid"),
            health_path: runtime_dir.join("cgproxyd.health"),
            runtime_dir: runtime_dir.to_path_buf(),
        })
    }

    /// Directory holding runtime artefacts.
    pub fn runtime_dir(&self) -> &Utf8Path {
        &self.runtime_dir
    }

    /// Lock file guarding singleton startup.
    pub fn lock_path(&self) -> &Utf8Path {
        &self.lock_path
    }

    /// PID file.
    pub fn pid_path(&self) -> &Utf8Path {
        &self.pid_path
    }

    /// Health snapshot.
    pub fn health_path(&self) -> &Utf8Path {
        &self.health_path
    }
}

/// Errors raised while deriving runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
