//! Process registry port.
//!
//! Whoever spawns an OS process on behalf of a job registers it here for the
//! lifetime of the child, so shutdown can find and terminate it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::download::JobId;

/// A tracked OS subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
    /// Job the process works for, if any.
    pub job_id: Option<JobId>,
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    /// Handle for a process spawned now.
    #[must_use]
    pub fn new(pid: u32, job_id: Option<JobId>) -> Self {
        Self {
            pid,
            job_id,
            started_at: Utc::now(),
        }
    }
}

/// Bookkeeping for spawned subprocesses.
///
/// Methods are synchronous: they are called from `Drop` guards.
pub trait ProcessRegistryPort: Send + Sync {
    /// Start tracking a process. Re-registering a pid replaces the entry.
    fn register(&self, handle: ProcessHandle);

    /// Stop tracking a process, returning its handle if it was tracked.
    fn unregister(&self, pid: u32) -> Option<ProcessHandle>;

    /// Snapshot of tracked processes.
    fn list(&self) -> Vec<ProcessHandle>;
}

/// Registry that tracks nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProcessRegistry;

impl ProcessRegistryPort for NoopProcessRegistry {
    fn register(&self, _handle: ProcessHandle) {}

    fn unregister(&self, _pid: u32) -> Option<ProcessHandle> {
        None
    }

    fn list(&self) -> Vec<ProcessHandle> {
        Vec::new()
    }
}
