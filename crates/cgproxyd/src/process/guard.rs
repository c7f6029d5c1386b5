//! Singleton lock and pid file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;

use camino::Utf8Path;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{info, warn};

use cgproxy_config::RuntimePaths;

use super::PROCESS_TARGET;
use super::errors::LaunchError;

const RUNTIME_FILE_MODE: u32 = 0o600;

/// Holds the runtime lock for the lifetime of the daemon.
///
/// Dropping the guard removes the lock, pid and health files.
#[derive(Debug)]
pub(crate) struct ProcessGuard {
    paths: RuntimePaths,
    _lock: File,
}

impl ProcessGuard {
    /// Takes the lock, clearing files left by a daemon that is no longer
    /// running.
    pub(crate) fn acquire(paths: RuntimePaths) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self { paths, _lock: lock })
    }

    pub(crate) fn write_pid(&self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        let pid_error = |source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(RUNTIME_FILE_MODE)
            .open(path)
            .map_err(pid_error)?;
        writeln!(file, "{pid}").map_err(pid_error)?;
        file.sync_all().map_err(pid_error)?;
        info!(target: PROCESS_TARGET, pid, file = %path, "pid file written");
        Ok(())
    }

    pub(crate) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for (path, what) in [
            (self.paths.health_path(), "health"),
            (self.paths.pid_path(), "pid"),
            (self.paths.lock_path(), "lock"),
        ] {
            if let Err(error) = fs::remove_file(path)
                && error.kind() != io::ErrorKind::NotFound
            {
                warn!(
                    target: PROCESS_TARGET,
                    file = %path,
                    error = %error,
                    "failed to remove {what} file"
                );
            }
        }
    }
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    let opened = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(RUNTIME_FILE_MODE)
        .open(paths.lock_path());
    match opened {
        Ok(file) => {
            info!(target: PROCESS_TARGET, file = %paths.lock_path(), "acquired daemon lock");
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    if let Some(pid) = read_pid(paths.pid_path())
        && process_alive(pid)?
    {
        info!(target: PROCESS_TARGET, pid, "refusing to start: existing daemon alive");
        return Err(LaunchError::AlreadyRunning { pid });
    }
    warn!(target: PROCESS_TARGET, "previous daemon not running; removing stale files");
    remove_stale(paths.lock_path())?;
    remove_stale(paths.pid_path())?;
    remove_stale(paths.health_path())?;
    acquire_lock(paths)
}

fn read_pid(path: &Utf8Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn remove_stale(path: &Utf8Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LaunchError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn process_alive(pid: u32) -> Result<bool, LaunchError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw == 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(LaunchError::CheckProcess { pid, source }),
    }
}
