//! cgroup2 filesystem attacher.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, info};

use cgproxy_config::CgroupPath;

use super::{AttachError, CGROUP_TARGET, CgroupAttacher};

/// Where systemd mounts the unified hierarchy.
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

const MOUNTS_PATH: &str = "/proc/self/mounts";
const PROCS_FILE: &str = "cgroup.procs";

/// Returns the first cgroup2 mount point listed in `/proc/self/mounts`.
#[must_use]
pub fn detect_cgroup2_root() -> Option<Utf8PathBuf> {
    let mounts = fs::read_to_string(MOUNTS_PATH).ok()?;
    parse_cgroup2_mount(&mounts)
}

fn parse_cgroup2_mount(mounts: &str) -> Option<Utf8PathBuf> {
    mounts.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let _device = fields.next()?;
        let mount_point = fields.next()?;
        let fs_type = fields.next()?;
        (fs_type == "cgroup2").then(|| Utf8PathBuf::from(mount_point.replace("\\040", " ")))
    })
}

/// Attaches processes by writing to `cgroup.procs` under a cgroup2 root.
#[derive(Debug, Clone)]
pub struct CgroupFsAttacher {
    root: Utf8PathBuf,
}

impl CgroupFsAttacher {
    /// Uses an explicit cgroup2 root.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses the configured root, else the detected mount, else
    /// [`DEFAULT_CGROUP_ROOT`].
    #[must_use]
    pub fn resolve(configured: Option<&Utf8Path>) -> Self {
        let root = configured
            .map(Utf8Path::to_path_buf)
            .or_else(detect_cgroup2_root)
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_CGROUP_ROOT));
        debug!(target: CGROUP_TARGET, root = %root, "cgroup root selected");
        Self { root }
    }

    /// Mount point of the cgroup2 hierarchy.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn cgroup_dir(&self, cgroup: &CgroupPath) -> Utf8PathBuf {
        match cgroup.relative() {
            "" => self.root.clone(),
            relative => self.root.join(relative),
        }
    }
}

impl CgroupAttacher for CgroupFsAttacher {
    fn attach(&self, pid: u32, cgroup: &CgroupPath) -> Result<(), AttachError> {
        ensure_process_exists(pid)?;
        if !self.root.is_dir() {
            return Err(AttachError::MissingRoot {
                root: self.root.clone(),
            });
        }

        let dir = self.cgroup_dir(cgroup);
        if !dir.is_dir() {
            debug!(target: CGROUP_TARGET, path = %dir, "creating cgroup");
            fs::create_dir_all(&dir).map_err(|source| AttachError::CreateCgroup {
                path: dir.clone(),
                source,
            })?;
        }

        let procs = dir.join(PROCS_FILE);
        write_pid(&procs, pid).map_err(|source| AttachError::WriteProcs {
            pid,
            path: procs.clone(),
            source,
        })?;
        info!(target: CGROUP_TARGET, pid, cgroup = %cgroup, "process attached");
        Ok(())
    }
}

/// Signal 0 checks existence without delivering anything. `EPERM` still
/// proves the process is there.
fn ensure_process_exists(pid: u32) -> Result<(), AttachError> {
    let raw = i32::try_from(pid).map_err(|_| AttachError::ProcessNotFound { pid })?;
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(()),
        Err(Errno::ESRCH) => Err(AttachError::ProcessNotFound { pid }),
        Err(source) => Err(AttachError::Probe { pid, source }),
    }
}

fn write_pid(procs: &Utf8Path, pid: u32) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(procs)?;
    file.write_all(format!("{pid}\n").as_bytes())
}
