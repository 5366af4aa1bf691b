//! Metrics bookkeeping behind [`Metrics`] snapshots.

use std::time::Duration;

use mediadl_core::{DownloadStatus, Metrics};

/// Running totals; lives under the manager lock.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    enqueue_count: u64,
    dequeue_count: u64,
    max_queue_size: usize,
    enqueue_latency_total: Duration,
    enqueue_latency_samples: u64,
    dequeue_latency_total: Duration,
    dequeue_latency_samples: u64,
    completed_total: u64,
    failed_total: u64,
    cancelled_total: u64,
}

impl MetricsRecorder {
    /// A job entered the queue; `admission` is how long admitting it took.
    pub(crate) fn record_enqueue(&mut self, admission: Option<Duration>, queue_len: usize) {
        self.enqueue_count += 1;
        if let Some(latency) = admission {
            self.enqueue_latency_total += latency;
            self.enqueue_latency_samples += 1;
        }
        self.observe_queue_len(queue_len);
    }

    /// A job left the queue after waiting `waited`.
    pub(crate) fn record_dequeue(&mut self, waited: Duration) {
        self.dequeue_count += 1;
        self.dequeue_latency_total += waited;
        self.dequeue_latency_samples += 1;
    }

    pub(crate) fn record_terminal(&mut self, status: DownloadStatus) {
        match status {
            DownloadStatus::Completed => self.completed_total += 1,
            DownloadStatus::Error => self.failed_total += 1,
            DownloadStatus::Cancelled => self.cancelled_total += 1,
            _ => {}
        }
    }

    pub(crate) fn observe_queue_len(&mut self, queue_len: usize) {
        self.max_queue_size = self.max_queue_size.max(queue_len);
    }

    pub(crate) fn snapshot(
        &self,
        queue_size: usize,
        active: usize,
        max_concurrent: usize,
    ) -> Metrics {
        Metrics {
            enqueue_count: self.enqueue_count,
            dequeue_count: self.dequeue_count,
            queue_size,
            max_queue_size: self.max_queue_size,
            avg_enqueue_latency_ms: average_ms(
                self.enqueue_latency_total,
                self.enqueue_latency_samples,
            ),
            avg_dequeue_latency_ms: average_ms(
                self.dequeue_latency_total,
                self.dequeue_latency_samples,
            ),
            completed_total: self.completed_total,
            failed_total: self.failed_total,
            cancelled_total: self.cancelled_total,
            active,
            max_concurrent,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn average_ms(total: Duration, samples: u64) -> f64 {
    if samples == 0 {
        return 0.0;
    }
    total.as_secs_f64() * 1000.0 / samples as f64
}
