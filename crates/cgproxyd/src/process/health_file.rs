//! Health snapshot written to the runtime directory.

use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;
use tracing::{debug, warn};

use crate::health::HealthReporter;
use crate::state::DaemonStatus;

use super::PROCESS_TARGET;

#[derive(Debug, Serialize)]
struct HealthSnapshot<'a> {
    status: &'a str,
    pid: u32,
    timestamp: u64,
    rules_installed: bool,
    generation: Option<u64>,
    proxy_cgroup: Option<&'a str>,
    noproxy_cgroup: Option<&'a str>,
}

/// Reporter that mirrors every status change into a JSON file.
///
/// Operators and supervisors read the file to tell whether diversion rules
/// are in effect, including after a failed push.
#[derive(Debug, Clone)]
pub struct HealthFile {
    path: Utf8PathBuf,
    pid: u32,
}

impl HealthFile {
    /// Writes snapshots for process `pid` to `path`.
    pub fn new(path: impl Into<Utf8PathBuf>, pid: u32) -> Self {
        Self {
            path: path.into(),
            pid,
        }
    }

    fn write(&self, status: &DaemonStatus) -> io::Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(io::Error::other)?
            .as_secs();
        let config = status.config();
        let snapshot = HealthSnapshot {
            status: status.state().as_str(),
            pid: self.pid,
            timestamp,
            rules_installed: status.rules_installed(),
            generation: status.generation(),
            proxy_cgroup: config.map(|config| config.proxy_cgroup().as_str()),
            noproxy_cgroup: config.map(|config| config.noproxy_cgroup().as_str()),
        };
        let mut contents = serde_json::to_vec(&snapshot)?;
        contents.push(b'\n');
        atomic_write(&self.path, &contents)
    }
}

impl HealthReporter for HealthFile {
    fn status_changed(&self, status: &DaemonStatus) {
        match self.write(status) {
            Ok(()) => debug!(
                target: PROCESS_TARGET,
                status = status.state().as_str(),
                file = %self.path,
                "health snapshot updated"
            ),
            Err(error) => warn!(
                target: PROCESS_TARGET,
                file = %self.path,
                error = %error,
                "failed to write health snapshot"
            ),
        }
    }
}

/// Readers never observe a partially written snapshot.
fn atomic_write(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "health path has no parent directory")
    })?;
    let mut file = Builder::new()
        .prefix(path.file_name().unwrap_or("cgproxyd.health"))
        .tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::rules::RuleState;
    use crate::state::DaemonState;
    use crate::store::ConfigStore;

    #[test]
    fn snapshot_reports_active_config_without_rules() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("cgproxyd.health")).expect("utf8");
        let file = HealthFile::new(path.clone(), 77);
        let config = ConfigStore::validate(json!({"proxy_cgroup": "/p", "noproxy_cgroup": "/np"}))
            .expect("valid config");
        let status = DaemonStatus::new(
            DaemonState::Running,
            RuleState::Clean,
            Some(Arc::new(config)),
        );

        file.status_changed(&status);

        let snapshot: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(snapshot["status"], "running");
        assert_eq!(snapshot["pid"], 77);
        assert_eq!(snapshot["rules_installed"], false);
        assert_eq!(snapshot["generation"], Value::Null);
        assert_eq!(snapshot["proxy_cgroup"], "/p");
    }
}
