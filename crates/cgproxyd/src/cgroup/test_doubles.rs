//! Recording attacher for behaviour tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cgproxy_config::CgroupPath;

use super::{AttachError, CgroupAttacher};

#[derive(Debug, Default)]
struct Inner {
    attached: Mutex<Vec<(u32, String)>>,
    reject: AtomicBool,
}

/// Records attach calls; optionally reports every PID as missing.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingAttacher {
    inner: Arc<Inner>,
}

impl RecordingAttacher {
    pub(crate) fn attached(&self) -> Vec<(u32, String)> {
        self.inner.attached.lock().expect("attach lock").clone()
    }

    pub(crate) fn reject_all(&self) {
        self.inner.reject.store(true, Ordering::SeqCst);
    }
}

impl CgroupAttacher for RecordingAttacher {
    fn attach(&self, pid: u32, cgroup: &CgroupPath) -> Result<(), AttachError> {
        if self.inner.reject.load(Ordering::SeqCst) {
            return Err(AttachError::ProcessNotFound { pid });
        }
        self.inner
            .attached
            .lock()
            .expect("attach lock")
            .push((pid, cgroup.as_str().to_owned()));
        Ok(())
    }
}
