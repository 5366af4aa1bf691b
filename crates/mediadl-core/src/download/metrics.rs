//! Queue metrics and status summaries.

use serde::{Deserialize, Serialize};

use super::types::{DownloadStatus, ProgressInfo};

/// Snapshot of the manager's queue metrics.
///
/// Counters are monotonic for the lifetime of a manager; `queue_size` and
/// `active` are live gauges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// Jobs admitted to the queue.
    pub enqueue_count: u64,
    /// Jobs that left the queue (launched, cancelled, removed, cleared).
    pub dequeue_count: u64,
    /// Current queue length.
    pub queue_size: usize,
    /// Highest queue length observed.
    pub max_queue_size: usize,
    /// Mean time spent admitting a job, in milliseconds.
    pub avg_enqueue_latency_ms: f64,
    /// Mean time a job waited in the queue before leaving it, in milliseconds.
    pub avg_dequeue_latency_ms: f64,
    pub completed_total: u64,
    pub failed_total: u64,
    pub cancelled_total: u64,
    /// Jobs currently in `starting` or `downloading`.
    pub active: usize,
    /// Concurrency cap.
    pub max_concurrent: usize,
}

/// Per-status job counts plus queue gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSummary {
    pub total: usize,
    pub queued: usize,
    pub starting: usize,
    pub downloading: usize,
    pub paused: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
    pub queue_size: usize,
    pub active: usize,
    pub max_concurrent: usize,
}

impl StatusSummary {
    /// Count records by status.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a ProgressInfo>,
        queue_size: usize,
        max_concurrent: usize,
    ) -> Self {
        let mut summary = Self {
            queue_size,
            max_concurrent,
            ..Self::default()
        };
        for info in records {
            summary.total += 1;
            *summary.count_mut(info.status) += 1;
        }
        summary.active = summary.starting + summary.downloading;
        summary
    }

    /// Count for a single status.
    #[must_use]
    pub const fn count(&self, status: DownloadStatus) -> usize {
        match status {
            DownloadStatus::Queued => self.queued,
            DownloadStatus::Starting => self.starting,
            DownloadStatus::Downloading => self.downloading,
            DownloadStatus::Paused => self.paused,
            DownloadStatus::Completed => self.completed,
            DownloadStatus::Error => self.error,
            DownloadStatus::Cancelled => self.cancelled,
        }
    }

    const fn count_mut(&mut self, status: DownloadStatus) -> &mut usize {
        match status {
            DownloadStatus::Queued => &mut self.queued,
            DownloadStatus::Starting => &mut self.starting,
            DownloadStatus::Downloading => &mut self.downloading,
            DownloadStatus::Paused => &mut self.paused,
            DownloadStatus::Completed => &mut self.completed,
            DownloadStatus::Error => &mut self.error,
            DownloadStatus::Cancelled => &mut self.cancelled,
        }
    }
}
