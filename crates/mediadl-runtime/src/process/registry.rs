//! In-memory process registry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use mediadl_core::{ProcessHandle, ProcessRegistryPort};

/// Tracks helper processes by pid.
///
/// Uses a std mutex: the port is synchronous and is called from `Drop`
/// guards, and no lock is held across an await point.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    handles: Mutex<HashMap<u32, ProcessHandle>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains_key(&pid)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, ProcessHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProcessRegistryPort for ProcessRegistry {
    fn register(&self, handle: ProcessHandle) {
        debug!(pid = handle.pid, job_id = ?handle.job_id, "Tracking process");
        self.lock().insert(handle.pid, handle);
    }

    fn unregister(&self, pid: u32) -> Option<ProcessHandle> {
        let removed = self.lock().remove(&pid);
        if removed.is_some() {
            debug!(pid, "Stopped tracking process");
        }
        removed
    }

    /// Oldest first.
    fn list(&self) -> Vec<ProcessHandle> {
        let mut handles: Vec<ProcessHandle> = self.lock().values().cloned().collect();
        handles.sort_by_key(|h| (h.started_at, h.pid));
        handles
    }
}
