//! Managed service port.
//!
//! The lifecycle supervisor drives the download service through this trait
//! during shutdown, without depending on the download crate.

use async_trait::async_trait;

use super::PersistenceError;
use crate::download::{ProgressInfo, StatusSummary};

/// A long-running service the supervisor can snapshot, flush and stop.
#[async_trait]
pub trait ManagedService: Send + Sync {
    /// Stop admitting work; jobs interrupted from now on stay resumable.
    async fn prepare_shutdown(&self) {}

    /// Every job record, for the shutdown log.
    async fn progress_snapshot(&self) -> Vec<ProgressInfo>;

    /// Per-status counts.
    async fn summary(&self) -> StatusSummary;

    /// Persist current state now.
    async fn flush(&self) -> Result<(), PersistenceError>;

    /// Stop background work. Idempotent.
    async fn stop(&self);
}
