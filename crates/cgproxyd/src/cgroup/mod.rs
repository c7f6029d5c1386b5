//! Moving processes into classification cgroups.

mod fs;
#[cfg(test)]
pub(crate) mod test_doubles;

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

use cgproxy_config::CgroupPath;

pub use self::fs::{CgroupFsAttacher, DEFAULT_CGROUP_ROOT, detect_cgroup2_root};

const CGROUP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cgroup");

/// Failures raised while attaching a process.
#[derive(Debug, Error)]
pub enum AttachError {
    /// No process with this PID is visible.
    #[error("process {pid} does not exist")]
    ProcessNotFound { pid: u32 },
    /// Probing the process failed for another reason.
    #[error("failed to probe process {pid}: {source}")]
    Probe {
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },
    /// The cgroup2 hierarchy is not mounted where expected.
    #[error("cgroup root '{root}' is not a directory")]
    MissingRoot { root: Utf8PathBuf },
    /// The target cgroup could not be created.
    #[error("failed to create cgroup '{path}': {source}")]
    CreateCgroup {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The kernel refused the move.
    #[error("failed to move process {pid} into '{path}': {source}")]
    WriteProcs {
        pid: u32,
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Places a process into a cgroup.
pub trait CgroupAttacher: Send + Sync {
    /// Moves `pid` into `cgroup`, creating the cgroup when it does not exist.
    fn attach(&self, pid: u32, cgroup: &CgroupPath) -> Result<(), AttachError>;
}
