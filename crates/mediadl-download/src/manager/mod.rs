//! Unified download manager.
//!
//! Owns the queue order, the admission counters and metrics, and the
//! lifecycle of every record in the [`ProgressStore`]. Each mutation marks
//! the [`AsyncPersistence`] flusher dirty; snapshots are written in the
//! background.
//!
//! # Concurrency Model
//!
//! - One coarse `tokio::sync::Mutex` guards queue order, metrics and the cap
//! - Lock order: manager lock → store lock (consistent everywhere)
//! - No I/O under either lock; the flusher snapshots under the locks and
//!   writes after releasing them
//! - `take_for_launch` / `next_queued` check the cap and flip the record to
//!   `starting` in one critical section, so two dispatchers can never exceed
//!   the cap or launch the same id twice

mod metrics;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};

use mediadl_core::{
    DownloadMetadata, DownloadStatus, JobId, Metrics, PersistedState, PersistenceError,
    PersistenceSink, ProgressInfo, ProgressPatch, Settings, StatusSummary,
};

use crate::persistence::{AsyncPersistence, DEFAULT_FLUSH_INTERVAL, FlushTarget};
use crate::queue::QueueOrder;
use crate::store::ProgressStore;

use metrics::MetricsRecorder;

/// Configuration for the download manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Concurrency cap (clamped to at least 1).
    pub max_concurrent: usize,
    /// Persistence loop interval.
    pub flush_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl ManagerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent.max(1),
            flush_interval: Duration::from_millis(settings.flush_interval_ms),
        }
    }
}

struct Inner {
    queue: QueueOrder,
    metrics: MetricsRecorder,
    max_concurrent: usize,
}

/// State shared between the manager and its flush target.
struct ManagerState {
    inner: Mutex<Inner>,
    store: ProgressStore,
    sink: Arc<dyn PersistenceSink>,
}

impl ManagerState {
    /// Coherent snapshot: taken under both locks, in lock order.
    async fn snapshot(&self) -> PersistedState {
        let inner = self.inner.lock().await;
        let records = self.store.list().await;
        let active = records.iter().filter(|i| i.status.is_active()).count();
        let metrics = inner
            .metrics
            .snapshot(inner.queue.len(), active, inner.max_concurrent);
        let queue = inner.queue.ids();
        drop(inner);

        PersistedState::new(queue, records, metrics)
    }
}

/// Flush target writing full manager snapshots to the sink.
struct SnapshotFlusher {
    state: Arc<ManagerState>,
}

#[async_trait]
impl FlushTarget for SnapshotFlusher {
    async fn flush(&self) -> Result<(), PersistenceError> {
        let snapshot = self.state.snapshot().await;
        self.state.sink.save(&snapshot).await
    }
}

/// Central queue, admission control and metrics for download jobs.
///
/// Constructed explicitly and shared behind an `Arc`; there is no global
/// instance.
pub struct UnifiedDownloadManager {
    state: Arc<ManagerState>,
    persistence: AsyncPersistence,
}

impl UnifiedDownloadManager {
    /// Create a manager and start its persistence loop.
    ///
    /// The loop only starts when called inside a tokio runtime.
    pub fn new(config: ManagerConfig, sink: Arc<dyn PersistenceSink>) -> Self {
        let state = Arc::new(ManagerState {
            inner: Mutex::new(Inner {
                queue: QueueOrder::new(),
                metrics: MetricsRecorder::default(),
                max_concurrent: config.max_concurrent.max(1),
            }),
            store: ProgressStore::new(),
            sink,
        });

        let flusher = Arc::new(SnapshotFlusher {
            state: Arc::clone(&state),
        });
        let persistence = AsyncPersistence::new(flusher, config.flush_interval);
        persistence.start();

        Self { state, persistence }
    }

    async fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.inner.lock().await
    }

    fn store(&self) -> &ProgressStore {
        &self.state.store
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Enqueue a job at the tail with status `queued`.
    ///
    /// Re-adding a known id replaces its record with a fresh queued one. The
    /// id keeps its queue slot if it was already queued, otherwise it goes to
    /// the tail.
    pub async fn add_download(
        &self,
        id: impl Into<JobId>,
        url: impl Into<String>,
        metadata: DownloadMetadata,
    ) -> ProgressInfo {
        let started = Instant::now();
        let info = ProgressInfo::queued(id.into(), url, metadata);

        let mut inner = self.lock().await;
        let previous = self.store().insert(info.clone()).await;
        if inner.queue.push_back(info.id.clone()) {
            let len = inner.queue.len();
            inner.metrics.record_enqueue(Some(started.elapsed()), len);
        }
        drop(inner);

        self.persistence.mark_dirty();
        tracing::debug!(
            target: "mediadl.download",
            id = %info.id,
            replaced = previous.is_some(),
            "Download queued"
        );
        info
    }

    /// Remove a job from the queue and the store.
    ///
    /// Returns `false` if the id is unknown.
    pub async fn remove_download(&self, id: &str) -> bool {
        let mut inner = self.lock().await;
        if let Some(entry) = inner.queue.remove(id) {
            inner.metrics.record_dequeue(entry.enqueued_at.elapsed());
        }
        let removed = self.store().remove(id).await;
        drop(inner);

        if removed.is_some() {
            self.persistence.mark_dirty();
            tracing::debug!(target: "mediadl.download", id = %id, "Download removed");
        }
        removed.is_some()
    }

    /// Merge a patch into an existing record.
    ///
    /// Returns `false` if the id is unknown or the patch would move a
    /// terminal record to another status.
    pub async fn update_download(&self, id: &str, patch: &ProgressPatch) -> bool {
        let mut inner = self.lock().await;
        let Some(current) = self.store().get(id).await else {
            return false;
        };

        if let Some(next) = patch.status {
            if !current.status.can_transition_to(next) {
                tracing::debug!(
                    target: "mediadl.download",
                    id = %id,
                    from = %current.status,
                    to = %next,
                    "Rejected status transition"
                );
                return false;
            }
        }

        let Some(merged) = self.store().update(id, patch).await else {
            return false;
        };

        let (from, to) = (current.status, merged.status);
        if from == DownloadStatus::Queued && to != DownloadStatus::Queued {
            if let Some(entry) = inner.queue.remove(id) {
                inner.metrics.record_dequeue(entry.enqueued_at.elapsed());
            }
        } else if to == DownloadStatus::Queued && from != DownloadStatus::Queued {
            if inner.queue.push_back(merged.id.clone()) {
                let len = inner.queue.len();
                inner.metrics.record_enqueue(None, len);
            }
        }
        if to.is_terminal() && !from.is_terminal() {
            inner.metrics.record_terminal(to);
        }
        drop(inner);

        self.persistence.mark_dirty();
        if from != to {
            tracing::debug!(
                target: "mediadl.download",
                id = %id,
                from = %from,
                to = %to,
                "Download status changed"
            );
        }
        true
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_download(&self, id: &str) -> Option<ProgressInfo> {
        self.store().get(id).await
    }

    /// Queued records in dispatch order.
    pub async fn get_queued_downloads(&self) -> Vec<ProgressInfo> {
        let inner = self.lock().await;
        let ids = inner.queue.ids();
        self.store().get_many(&ids).await
    }

    /// Records in `starting` or `downloading`, oldest start first.
    pub async fn get_active_downloads(&self) -> Vec<ProgressInfo> {
        let mut active: Vec<_> = self
            .store()
            .list()
            .await
            .into_iter()
            .filter(|info| info.status.is_active())
            .collect();
        active.sort_by_key(|info| info.started_at);
        active
    }

    pub async fn get_all_downloads(&self) -> Vec<ProgressInfo> {
        self.store().list().await
    }

    /// Queued ids in dispatch order.
    pub async fn queued_ids(&self) -> Vec<JobId> {
        self.lock().await.queue.ids()
    }

    pub async fn active_count(&self) -> usize {
        self.store().active_count().await
    }

    pub async fn get_metrics(&self) -> Metrics {
        let inner = self.lock().await;
        let active = self.store().active_count().await;
        inner
            .metrics
            .snapshot(inner.queue.len(), active, inner.max_concurrent)
    }

    pub async fn get_status_summary(&self) -> StatusSummary {
        let inner = self.lock().await;
        let records = self.store().list().await;
        StatusSummary::from_records(&records, inner.queue.len(), inner.max_concurrent)
    }

    // =========================================================================
    // Queue control
    // =========================================================================

    /// Replace the queue order.
    ///
    /// Succeeds only if `new_order` is exactly a permutation of the queued
    /// ids; otherwise the order is unchanged.
    pub async fn reorder_queue(&self, new_order: &[JobId]) -> bool {
        let reordered = self.lock().await.queue.reorder(new_order);
        if reordered {
            self.persistence.mark_dirty();
        }
        reordered
    }

    /// Move a queued job to the front. Does not launch it.
    pub async fn force_start(&self, id: &str) -> bool {
        let moved = self.lock().await.queue.move_to_front(id);
        if moved {
            self.persistence.mark_dirty();
            tracing::debug!(target: "mediadl.download", id = %id, "Moved to front of queue");
        }
        moved
    }

    /// Empty the queue and drop the queued records. Active jobs are untouched.
    pub async fn clear_queue(&self) -> usize {
        let mut inner = self.lock().await;
        let entries = inner.queue.clear();
        for entry in &entries {
            inner.metrics.record_dequeue(entry.enqueued_at.elapsed());
            self.store().remove(entry.id.as_str()).await;
        }
        drop(inner);

        self.persistence.mark_dirty();
        if !entries.is_empty() {
            tracing::info!(
                target: "mediadl.download",
                cleared = entries.len(),
                "Queue cleared"
            );
        }
        entries.len()
    }

    /// Evict terminal records that finished at least `max_age_secs` ago.
    ///
    /// `0` evicts every terminal record.
    pub async fn cleanup_finished_downloads(&self, max_age_secs: u64) -> usize {
        let threshold = i64::try_from(max_age_secs).unwrap_or(i64::MAX);
        let now = Utc::now();

        let mut inner = self.lock().await;
        let removed = self
            .store()
            .remove_where(|info| {
                info.finished_age_secs(now)
                    .is_some_and(|age| max_age_secs == 0 || age >= threshold)
            })
            .await;
        for info in &removed {
            inner.queue.remove(info.id.as_str());
        }
        drop(inner);

        if !removed.is_empty() {
            self.persistence.mark_dirty();
            tracing::debug!(
                target: "mediadl.download",
                removed = removed.len(),
                "Cleaned up finished downloads"
            );
        }
        removed.len()
    }

    /// Set the concurrency cap (clamped to at least 1).
    pub async fn set_max_concurrent(&self, n: usize) {
        let clamped = n.max(1);
        self.lock().await.max_concurrent = clamped;
        self.persistence.mark_dirty();
        tracing::info!(target: "mediadl.download", max_concurrent = clamped, "Concurrency cap changed");
    }

    pub async fn max_concurrent(&self) -> usize {
        self.lock().await.max_concurrent
    }

    // =========================================================================
    // Dispatch support
    // =========================================================================

    /// Take a specific queued job for launch.
    ///
    /// Atomically removes it from the queue and sets status `starting`.
    /// Returns `None` if it is not queued or the cap is reached.
    pub async fn take_for_launch(&self, id: &str) -> Option<ProgressInfo> {
        let mut inner = self.lock().await;
        if self.store().active_count().await >= inner.max_concurrent {
            return None;
        }
        let entry = inner.queue.remove(id)?;
        let launched = self.mark_starting(&mut inner, entry.id, entry.enqueued_at).await;
        drop(inner);

        if launched.is_some() {
            self.persistence.mark_dirty();
        }
        launched
    }

    /// Take the head of the queue for launch, if a slot is free.
    pub async fn next_queued(&self) -> Option<ProgressInfo> {
        let mut inner = self.lock().await;
        if self.store().active_count().await >= inner.max_concurrent {
            return None;
        }

        let mut launched = None;
        while let Some(entry) = inner.queue.pop_front() {
            launched = self.mark_starting(&mut inner, entry.id, entry.enqueued_at).await;
            if launched.is_some() {
                break;
            }
        }
        drop(inner);

        if launched.is_some() {
            self.persistence.mark_dirty();
        }
        launched
    }

    async fn mark_starting(
        &self,
        inner: &mut Inner,
        id: JobId,
        enqueued_at: Instant,
    ) -> Option<ProgressInfo> {
        inner.metrics.record_dequeue(enqueued_at.elapsed());
        match self.store().get(id.as_str()).await {
            Some(info) if info.status == DownloadStatus::Queued => {
                self.store()
                    .update(id.as_str(), &ProgressPatch::status(DownloadStatus::Starting))
                    .await
            }
            _ => {
                tracing::warn!(target: "mediadl.download", id = %id, "Dropping stale queue entry");
                None
            }
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Reload a persisted snapshot, replacing current state.
    ///
    /// Jobs that were active when the snapshot was taken are re-queued ahead
    /// of the saved queue, oldest start first. Paused and terminal records
    /// are kept as they were. Returns the number of queued jobs.
    pub async fn restore(&self, state: PersistedState) -> usize {
        let PersistedState {
            queue: saved_queue,
            downloads,
            ..
        } = state;

        let mut records: Vec<ProgressInfo> = downloads.into_values().collect();
        records.sort_by_key(|info| info.created_at);

        let mut interrupted: Vec<&mut ProgressInfo> = records
            .iter_mut()
            .filter(|info| info.status.is_active())
            .collect();
        interrupted.sort_by_key(|info| info.started_at);

        let mut order: Vec<JobId> = Vec::new();
        for info in interrupted {
            info.apply(&ProgressPatch::status(DownloadStatus::Queued));
            order.push(info.id.clone());
        }

        let queued: HashSet<&JobId> = records
            .iter()
            .filter(|info| info.status == DownloadStatus::Queued)
            .map(|info| &info.id)
            .collect();
        let mut seen: HashSet<JobId> = order.iter().cloned().collect();
        for id in saved_queue.iter().chain(records.iter().map(|info| &info.id)) {
            if queued.contains(id) && seen.insert(id.clone()) {
                order.push(id.clone());
            }
        }

        let mut inner = self.lock().await;
        inner.queue.clear();
        for id in &order {
            if inner.queue.push_back(id.clone()) {
                let len = inner.queue.len();
                inner.metrics.record_enqueue(None, len);
            }
        }
        let total = records.len();
        self.store().replace_all(records).await;
        drop(inner);

        self.persistence.mark_dirty();
        tracing::info!(
            target: "mediadl.download",
            total,
            queued = order.len(),
            "Restored download state"
        );
        order.len()
    }

    /// Full snapshot of the current state.
    pub async fn snapshot(&self) -> PersistedState {
        self.state.snapshot().await
    }

    /// Write a snapshot now.
    pub async fn flush_now(&self) -> Result<(), PersistenceError> {
        self.persistence.flush_now().await
    }

    /// Whether the persistence loop is alive.
    pub fn is_persisting(&self) -> bool {
        self.persistence.is_running()
    }

    /// Stop the persistence loop after a final flush. Idempotent.
    pub async fn stop(&self) {
        self.persistence.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemorySink;

    fn manager_with(max_concurrent: usize) -> (UnifiedDownloadManager, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let config = ManagerConfig {
            max_concurrent,
            flush_interval: Duration::from_millis(10),
        };
        let manager =
            UnifiedDownloadManager::new(config, Arc::clone(&sink) as Arc<dyn PersistenceSink>);
        (manager, sink)
    }

    fn manager() -> UnifiedDownloadManager {
        manager_with(1).0
    }

    fn ids(names: &[&str]) -> Vec<JobId> {
        names.iter().map(|n| JobId::new(*n)).collect()
    }

    async fn add(manager: &UnifiedDownloadManager, id: &str) -> ProgressInfo {
        manager
            .add_download(id, format!("https://example.com/{id}"), DownloadMetadata::default())
            .await
    }

    #[tokio::test]
    async fn test_add_then_get_is_queued() {
        let manager = manager();
        add(&manager, "a").await;

        let info = manager.get_download("a").await.unwrap();
        assert_eq!(info.status, DownloadStatus::Queued);
        assert_eq!(info.url, "https://example.com/a");
        assert_eq!(manager.queued_ids().await, ids(&["a"]));
    }

    #[tokio::test]
    async fn test_remove_after_add() {
        let manager = manager();
        add(&manager, "a").await;

        assert!(manager.remove_download("a").await);
        assert!(manager.get_download("a").await.is_none());
        assert!(manager.queued_ids().await.is_empty());
        assert!(!manager.remove_download("a").await);
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_queue_slot() {
        let manager = manager();
        add(&manager, "a").await;
        add(&manager, "b").await;
        manager
            .update_download("a", &ProgressPatch::default().with_percent(30.0))
            .await;

        let replaced = manager
            .add_download("a", "https://example.com/other", DownloadMetadata::default())
            .await;
        assert_eq!(replaced.percent, 0.0);
        assert_eq!(manager.queued_ids().await, ids(&["a", "b"]));
        assert_eq!(manager.get_metrics().await.enqueue_count, 2);
    }

    #[tokio::test]
    async fn test_upsert_of_finished_job_requeues_at_tail() {
        let manager = manager();
        add(&manager, "a").await;
        add(&manager, "b").await;
        manager
            .update_download("a", &ProgressPatch::status(DownloadStatus::Completed))
            .await;
        assert_eq!(manager.queued_ids().await, ids(&["b"]));

        add(&manager, "a").await;
        assert_eq!(manager.queued_ids().await, ids(&["b", "a"]));
        assert_eq!(
            manager.get_download("a").await.unwrap().status,
            DownloadStatus::Queued
        );
    }

    #[tokio::test]
    async fn test_update_unknown_and_terminal() {
        let manager = manager();
        assert!(
            !manager
                .update_download("nope", &ProgressPatch::status(DownloadStatus::Downloading))
                .await
        );

        add(&manager, "a").await;
        assert!(
            manager
                .update_download("a", &ProgressPatch::status(DownloadStatus::Cancelled))
                .await
        );
        assert!(
            !manager
                .update_download("a", &ProgressPatch::status(DownloadStatus::Downloading))
                .await
        );
        let info = manager.get_download("a").await.unwrap();
        assert_eq!(info.status, DownloadStatus::Cancelled);
        assert!(info.finished_at.is_some());
        assert_eq!(manager.get_metrics().await.cancelled_total, 1);
    }

    #[tokio::test]
    async fn test_reorder_permutation_only() {
        let manager = manager();
        for id in ["a", "b", "c"] {
            add(&manager, id).await;
        }

        assert!(manager.reorder_queue(&ids(&["c", "b", "a"])).await);
        assert_eq!(manager.queued_ids().await, ids(&["c", "b", "a"]));

        assert!(!manager.reorder_queue(&ids(&["c", "b"])).await);
        assert!(!manager.reorder_queue(&ids(&["c", "b", "x"])).await);
        assert_eq!(manager.queued_ids().await, ids(&["c", "b", "a"]));
    }

    #[tokio::test]
    async fn test_reorder_then_force_start() {
        let manager = manager();
        add(&manager, "a").await;
        add(&manager, "b").await;

        assert!(manager.reorder_queue(&ids(&["b", "a"])).await);
        assert!(manager.force_start("a").await);
        assert_eq!(manager.queued_ids().await, ids(&["a", "b"]));
        assert!(!manager.force_start("missing").await);
    }

    #[tokio::test]
    async fn test_completed_then_cleanup_zero() {
        let manager = manager();
        add(&manager, "a").await;
        assert!(
            manager
                .update_download("a", &ProgressPatch::status(DownloadStatus::Completed))
                .await
        );

        assert_eq!(manager.cleanup_finished_downloads(0).await, 1);
        assert!(manager.get_download("a").await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_zero_keeps_live_jobs() {
        let manager = manager_with(2).0;
        for id in ["queued", "active", "done", "failed", "cancelled"] {
            add(&manager, id).await;
        }
        manager.take_for_launch("active").await.unwrap();
        manager
            .update_download("done", &ProgressPatch::status(DownloadStatus::Completed))
            .await;
        manager
            .update_download("failed", &ProgressPatch::failed("boom"))
            .await;
        manager
            .update_download("cancelled", &ProgressPatch::status(DownloadStatus::Cancelled))
            .await;

        assert_eq!(manager.cleanup_finished_downloads(0).await, 3);
        let remaining: Vec<_> = manager
            .get_all_downloads()
            .await
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(remaining, ids(&["queued", "active"]));
    }

    #[tokio::test]
    async fn test_cleanup_respects_age() {
        let manager = manager();
        add(&manager, "a").await;
        manager
            .update_download("a", &ProgressPatch::status(DownloadStatus::Completed))
            .await;
        assert_eq!(manager.cleanup_finished_downloads(3600).await, 0);
        assert!(manager.get_download("a").await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let manager = Arc::new(manager());
        let mut handles = Vec::new();
        for i in 0..64 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                add(&manager, &format!("job-{i}")).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let metrics = manager.get_metrics().await;
        assert_eq!(metrics.queue_size, 64);
        assert_eq!(metrics.enqueue_count, 64);
        assert_eq!(metrics.max_queue_size, 64);
    }

    #[tokio::test]
    async fn test_add_remove_pairs_leave_nothing() {
        let manager = manager();
        for i in 0..1000 {
            let id = format!("job-{i}");
            add(&manager, &id).await;
            assert!(manager.remove_download(&id).await);
        }

        let metrics = manager.get_metrics().await;
        assert_eq!(metrics.queue_size, 0);
        assert_eq!(metrics.enqueue_count, 1000);
        assert_eq!(metrics.dequeue_count, 1000);
        assert!(manager.get_all_downloads().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_queue_leaves_active() {
        let manager = manager();
        for id in ["a", "b", "c"] {
            add(&manager, id).await;
        }
        manager.next_queued().await.unwrap();

        assert_eq!(manager.clear_queue().await, 2);
        assert!(manager.queued_ids().await.is_empty());
        assert_eq!(manager.get_all_downloads().await.len(), 1);
        assert_eq!(manager.get_active_downloads().await[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_dispatch_respects_cap() {
        let manager = manager_with(2).0;
        for id in ["a", "b", "c"] {
            add(&manager, id).await;
        }

        let first = manager.next_queued().await.unwrap();
        assert_eq!(first.status, DownloadStatus::Starting);
        assert!(first.started_at.is_some());
        assert!(manager.take_for_launch("c").await.is_some());
        assert!(manager.next_queued().await.is_none());
        assert!(manager.take_for_launch("b").await.is_none());
        assert_eq!(manager.queued_ids().await, ids(&["b"]));

        manager.set_max_concurrent(3).await;
        assert_eq!(manager.next_queued().await.unwrap().id.as_str(), "b");
        assert_eq!(manager.get_metrics().await.active, 3);
    }

    #[tokio::test]
    async fn test_set_max_concurrent_clamps() {
        let manager = manager();
        manager.set_max_concurrent(0).await;
        assert_eq!(manager.max_concurrent().await, 1);
    }

    #[tokio::test]
    async fn test_status_change_maintains_queue() {
        let manager = manager();
        add(&manager, "a").await;
        add(&manager, "b").await;

        manager
            .update_download("a", &ProgressPatch::status(DownloadStatus::Paused))
            .await;
        assert_eq!(manager.queued_ids().await, ids(&["b"]));

        manager
            .update_download("a", &ProgressPatch::status(DownloadStatus::Queued))
            .await;
        assert_eq!(manager.queued_ids().await, ids(&["b", "a"]));

        let summary = manager.get_status_summary().await;
        assert_eq!(summary.queued, 2);
        assert_eq!(summary.queue_size, 2);
    }

    #[tokio::test]
    async fn test_restore_requeues_interrupted_first() {
        let (source, _) = manager_with(2);
        for id in ["q1", "q2", "run", "paused", "done"] {
            add(&source, id).await;
        }
        source.take_for_launch("run").await.unwrap();
        source
            .update_download("paused", &ProgressPatch::status(DownloadStatus::Paused))
            .await;
        source
            .update_download("done", &ProgressPatch::status(DownloadStatus::Completed))
            .await;
        let snapshot = source.snapshot().await;

        let target = manager();
        assert_eq!(target.restore(snapshot).await, 3);
        assert_eq!(target.queued_ids().await, ids(&["run", "q1", "q2"]));
        assert_eq!(
            target.get_download("paused").await.unwrap().status,
            DownloadStatus::Paused
        );
        assert_eq!(
            target.get_download("done").await.unwrap().status,
            DownloadStatus::Completed
        );
        let run = target.get_download("run").await.unwrap();
        assert_eq!(run.status, DownloadStatus::Queued);
        assert!(run.started_at.is_none());
    }

    #[tokio::test]
    async fn test_mutations_reach_sink() {
        let (manager, sink) = manager_with(1);
        add(&manager, "a").await;
        manager.flush_now().await.unwrap();

        let saved = sink.last().unwrap();
        assert_eq!(saved.queue, ids(&["a"]));
        assert!(saved.downloads.contains_key("a"));
        assert_eq!(saved.metrics.enqueue_count, 1);
    }

    #[tokio::test]
    async fn test_stop_flushes_and_ends_loop() {
        let (manager, sink) = manager_with(1);
        assert!(manager.is_persisting());
        add(&manager, "a").await;
        manager.stop().await;

        assert!(!manager.is_persisting());
        assert!(sink.last().unwrap().downloads.contains_key("a"));
    }
}
