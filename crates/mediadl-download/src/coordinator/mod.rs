//! Pipeline coordinator.
//!
//! The single entry point callers use to start, cancel and steer downloads.
//! Dispatches queued jobs to workers under the manager's concurrency cap and
//! runs the periodic cleanup loop.
//!
//! # Architecture
//!
//! - **Dispatcher**: one long-lived task, woken through a `Notify` whenever a
//!   slot may have freed up (worker exit, `force_start`,
//!   `set_max_concurrent`, cleanup tick)
//! - **Workers**: one task per running job; each runs inside an inner task so
//!   a panic surfaces as a `JoinError` instead of tearing anything down
//! - **Cleanup loop**: evicts aged terminal records, reconciles records whose
//!   worker vanished, pumps the queue
//!
//! # Concurrency Model
//!
//! - Lease ids prevent a stale worker from finalizing a newer run of the same
//!   job id
//! - `launch_lock` covers "take from queue + register worker" and the
//!   reconcile pass, so reconcile never sees a half-launched job

mod cleanup;
mod worker;

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

use mediadl_core::{
    DownloadError, DownloadMetadata, DownloadStatus, ExtractionOutcome, ExtractionPort,
    ExtractionRequest, JobId, ManagedService, PersistenceError, ProgressInfo, ProgressPatch,
    Settings, StatusSummary,
};

use crate::manager::UnifiedDownloadManager;
use crate::progress::DEFAULT_PROGRESS_INTERVAL;

pub use cleanup::CleanupReport;
use worker::{WorkerDeps, WorkerJob};

/// Error recorded when an active job has no live worker.
const WORKER_LOST: &str = "worker lost";

/// Configuration for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Where the helper writes output files.
    pub output_dir: PathBuf,
    pub cleanup_interval: Duration,
    /// Terminal records older than this are evicted by the cleanup loop.
    pub finished_max_age_secs: u64,
    /// Minimum spacing between throttled progress writes.
    pub progress_interval: Duration,
    /// Bound on each join performed by `stop()`.
    pub stop_timeout: Duration,
}

impl CoordinatorConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            cleanup_interval: Duration::from_secs(120),
            finished_max_age_secs: 3600,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            stop_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_settings(settings: &Settings, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_secs.max(1)),
            finished_max_age_secs: settings.finished_max_age_secs,
            ..Self::new(output_dir)
        }
    }
}

/// Lease ID for tracking worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

/// A running worker.
struct ActiveWorker {
    lease: LeaseId,
    cancel: CancellationToken,
    abort: AbortHandle,
}

pub(crate) struct CoordinatorInner {
    manager: Arc<UnifiedDownloadManager>,
    extractor: Arc<dyn ExtractionPort>,
    config: CoordinatorConfig,
    workers: Mutex<HashMap<JobId, ActiveWorker>>,
    launch_lock: Mutex<()>,
    lease_counter: AtomicU64,
    notify: Notify,
    accepting: AtomicBool,
}

/// Dispatches queued jobs to workers under a concurrency cap.
pub struct PipelineCoordinator {
    inner: Arc<CoordinatorInner>,
    loops_cancel: CancellationToken,
    loops: std::sync::Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl PipelineCoordinator {
    pub fn new(
        manager: Arc<UnifiedDownloadManager>,
        extractor: Arc<dyn ExtractionPort>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                manager,
                extractor,
                config,
                workers: Mutex::new(HashMap::new()),
                launch_lock: Mutex::new(()),
                lease_counter: AtomicU64::new(0),
                notify: Notify::new(),
                accepting: AtomicBool::new(true),
            }),
            loops_cancel: CancellationToken::new(),
            loops: std::sync::Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawn the dispatcher and cleanup loops. Idempotent.
    pub fn start(&self) {
        if self.stopped.load(Ordering::SeqCst)
            || self
                .started
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return;
        }

        let dispatcher = tokio::spawn(dispatch_loop(
            Arc::clone(&self.inner),
            self.loops_cancel.clone(),
        ));
        let cleaner = tokio::spawn(cleanup::run_cleanup_loop(
            Arc::clone(&self.inner),
            self.loops_cancel.clone(),
        ));

        self.loops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend([dispatcher, cleaner]);
        tracing::debug!(target: "mediadl.download", "Coordinator started");
    }

    pub fn manager(&self) -> &Arc<UnifiedDownloadManager> {
        &self.inner.manager
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Enqueue a job and, with `auto_launch`, launch it right away if a slot
    /// is free.
    ///
    /// Without `auto_launch` (or without a free slot) the job waits for the
    /// next dispatch pump.
    pub async fn start_download(
        &self,
        id: impl Into<JobId>,
        url: impl Into<String>,
        metadata: DownloadMetadata,
        auto_launch: bool,
    ) -> Result<ProgressInfo, DownloadError> {
        let id = id.into();
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(DownloadError::other("coordinator is shutting down"));
        }
        if self.inner.workers.lock().await.contains_key(&id) {
            return Err(DownloadError::already_active(id.as_str()));
        }

        let queued = self.inner.manager.add_download(id.clone(), url, metadata).await;

        if auto_launch {
            if let Some(info) = self.inner.launch_specific(&id).await {
                return Ok(info);
            }
        }
        Ok(queued)
    }

    /// Cancel a job.
    ///
    /// A queued (or paused) job leaves the queue as `cancelled`. An active
    /// job is marked `cancelled` and its worker stops at the next progress
    /// report. Returns `false` for unknown or already finished jobs.
    pub async fn cancel_download(&self, id: &str) -> bool {
        let Some(info) = self.inner.manager.get_download(id).await else {
            return false;
        };
        if info.status.is_terminal() {
            return false;
        }

        let marked = self
            .inner
            .manager
            .update_download(id, &ProgressPatch::status(DownloadStatus::Cancelled))
            .await;
        if let Some(worker) = self.inner.workers.lock().await.get(id) {
            worker.cancel.cancel();
        }

        if marked {
            tracing::info!(target: "mediadl.download", id = %id, "Download cancelled");
        }
        marked
    }

    /// Hold a queued job without cancelling it.
    pub async fn pause_download(&self, id: &str) -> bool {
        match self.inner.manager.get_download(id).await {
            Some(info) if info.status == DownloadStatus::Queued => {
                self.inner
                    .manager
                    .update_download(id, &ProgressPatch::status(DownloadStatus::Paused))
                    .await
            }
            _ => false,
        }
    }

    /// Put a paused job back at the tail of the queue.
    pub async fn resume_download(&self, id: &str) -> bool {
        let resumed = match self.inner.manager.get_download(id).await {
            Some(info) if info.status == DownloadStatus::Paused => {
                self.inner
                    .manager
                    .update_download(id, &ProgressPatch::status(DownloadStatus::Queued))
                    .await
            }
            _ => false,
        };
        if resumed {
            self.pump();
        }
        resumed
    }

    /// Remove a job entirely, stopping its worker if it has one.
    pub async fn remove_download(&self, id: &str) -> bool {
        if let Some(worker) = self.inner.workers.lock().await.get(id) {
            worker.cancel.cancel();
        }
        let removed = self.inner.manager.remove_download(id).await;
        self.pump();
        removed
    }

    /// Move a queued job to the front and pump the queue.
    pub async fn force_start(&self, id: &str) -> bool {
        let moved = self.inner.manager.force_start(id).await;
        if moved {
            self.pump();
        }
        moved
    }

    /// Change the concurrency cap and pump the queue.
    pub async fn set_max_concurrent(&self, n: usize) {
        self.inner.manager.set_max_concurrent(n).await;
        self.pump();
    }

    /// Wake the dispatcher.
    pub fn pump(&self) {
        self.inner.notify.notify_one();
    }

    /// Run one cleanup pass now.
    pub async fn run_cleanup_once(&self) -> CleanupReport {
        self.inner.cleanup_once().await
    }

    /// Number of live workers.
    pub async fn active_workers(&self) -> usize {
        self.inner.workers.lock().await.len()
    }

    /// Stop admitting and launching work.
    ///
    /// Jobs whose worker ends after this point without completing go back to
    /// `queued`, so a restart resumes them.
    pub fn begin_drain(&self) {
        if self.inner.accepting.swap(false, Ordering::SeqCst) {
            tracing::info!(target: "mediadl.download", "Draining: no new downloads will start");
        }
    }

    /// Stop dispatching, cancel workers and stop the manager. Idempotent.
    ///
    /// Each wait is bounded by `stop_timeout`; workers that do not settle in
    /// time are aborted (which kills their helper). Interrupted jobs are left
    /// `queued`.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.begin_drain();
        let stop_timeout = self.inner.config.stop_timeout;

        self.loops_cancel.cancel();
        let loops: Vec<_> = self
            .loops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect();
        for mut handle in loops {
            if timeout(stop_timeout, &mut handle).await.is_err() {
                tracing::warn!(target: "mediadl.download", "Background loop did not stop in time, aborting");
                handle.abort();
            }
        }

        let cancelled = {
            let workers = self.inner.workers.lock().await;
            for worker in workers.values() {
                worker.cancel.cancel();
            }
            workers.len()
        };
        if cancelled > 0 {
            tracing::info!(target: "mediadl.download", workers = cancelled, "Waiting for workers to settle");
        }

        let deadline = Instant::now() + stop_timeout;
        while !self.inner.workers.lock().await.is_empty() && Instant::now() < deadline {
            sleep(Duration::from_millis(50)).await;
        }

        let stragglers: Vec<(JobId, ActiveWorker)> =
            self.inner.workers.lock().await.drain().collect();
        for (id, worker) in stragglers {
            tracing::warn!(target: "mediadl.download", id = %id, "Aborting worker that ignored cancellation");
            worker.abort.abort();
            self.inner
                .manager
                .update_download(id.as_str(), &ProgressPatch::status(DownloadStatus::Queued))
                .await;
        }

        self.inner.manager.stop().await;
        tracing::info!(target: "mediadl.download", "Coordinator stopped");
    }
}

impl Drop for PipelineCoordinator {
    fn drop(&mut self) {
        self.loops_cancel.cancel();
    }
}

#[async_trait]
impl ManagedService for PipelineCoordinator {
    async fn prepare_shutdown(&self) {
        self.begin_drain();
    }

    async fn progress_snapshot(&self) -> Vec<ProgressInfo> {
        self.inner.manager.get_all_downloads().await
    }

    async fn summary(&self) -> StatusSummary {
        self.inner.manager.get_status_summary().await
    }

    async fn flush(&self) -> Result<(), PersistenceError> {
        self.inner.manager.flush_now().await
    }

    async fn stop(&self) {
        Self::stop(self).await;
    }
}

// =============================================================================
// Dispatch
// =============================================================================

async fn dispatch_loop(inner: Arc<CoordinatorInner>, cancel: CancellationToken) {
    loop {
        inner.dispatch_ready().await;
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = inner.notify.notified() => {}
        }
    }
    tracing::debug!(target: "mediadl.download", "Dispatcher stopped");
}

impl CoordinatorInner {
    /// Whether the live workers leave room under the cap.
    ///
    /// A cancelled or removed job frees its store slot at once, but its
    /// worker (and helper) holds the slot until `finalize` drops the lease.
    /// Caller holds `launch_lock`, so the worker count can only shrink.
    async fn slot_free(&self) -> bool {
        let live = self.workers.lock().await.len();
        live < self.manager.max_concurrent().await
    }

    /// Launch queued jobs until the cap is reached or the queue is empty.
    async fn dispatch_ready(self: &Arc<Self>) {
        while self.accepting.load(Ordering::SeqCst) {
            let _launch = self.launch_lock.lock().await;
            if !self.slot_free().await {
                break;
            }
            let Some(info) = self.manager.next_queued().await else {
                break;
            };
            self.spawn_worker(info).await;
        }
    }

    /// Launch one specific queued job if a slot is free.
    async fn launch_specific(self: &Arc<Self>, id: &JobId) -> Option<ProgressInfo> {
        let _launch = self.launch_lock.lock().await;
        if !self.slot_free().await {
            return None;
        }
        let info = self.manager.take_for_launch(id.as_str()).await?;
        self.spawn_worker(info.clone()).await;
        Some(info)
    }

    /// Register and spawn a worker for a job already marked `starting`.
    ///
    /// Caller holds `launch_lock`.
    async fn spawn_worker(self: &Arc<Self>, info: ProgressInfo) {
        let lease = LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        let id = info.id.clone();

        let job = WorkerJob {
            request: ExtractionRequest {
                id: info.id.clone(),
                url: info.url.clone(),
                output_dir: self.config.output_dir.clone(),
                metadata: info.metadata.clone(),
            },
            cancel: cancel.clone(),
        };
        let deps = WorkerDeps {
            manager: Arc::clone(&self.manager),
            extractor: Arc::clone(&self.extractor),
            progress_interval: self.config.progress_interval,
        };

        // Register before spawning so a fast worker always finds its lease.
        let mut workers = self.workers.lock().await;
        let run = tokio::spawn(worker::run_job(job, deps));
        workers.insert(
            id.clone(),
            ActiveWorker {
                lease,
                cancel,
                abort: run.abort_handle(),
            },
        );
        drop(workers);

        tracing::info!(target: "mediadl.download", id = %id, url = %info.url, "Download started");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = match run.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    tracing::error!(target: "mediadl.download", id = %id, panic = %message, "Worker panicked");
                    Err(DownloadError::other(format!("worker panicked: {message}")))
                }
                Err(_) => Err(DownloadError::Cancelled),
            };
            inner.finalize(&id, lease, result).await;
            inner.notify.notify_one();
        });
    }

    /// Record a worker's result.
    ///
    /// The record is written before the lease is dropped, so the reconcile
    /// pass never sees an active record without a worker.
    async fn finalize(
        &self,
        id: &JobId,
        lease: LeaseId,
        result: Result<ExtractionOutcome, DownloadError>,
    ) {
        let current = self
            .workers
            .lock()
            .await
            .get(id)
            .is_some_and(|worker| worker.lease == lease);
        if !current {
            tracing::debug!(target: "mediadl.download", id = %id, "Ignoring stale finalize (lease mismatch)");
            return;
        }

        let draining = !self.accepting.load(Ordering::SeqCst);
        let patch = match result {
            Err(e) if draining => {
                tracing::info!(target: "mediadl.download", id = %id, error = %e, "Interrupted by shutdown, will resume");
                ProgressPatch::status(DownloadStatus::Queued)
            }
            Ok(outcome) => {
                tracing::info!(target: "mediadl.download", id = %id, filename = ?outcome.filename, "Download completed");
                ProgressPatch {
                    status: Some(DownloadStatus::Completed),
                    percent: Some(100.0),
                    filename: outcome.filename,
                    ..ProgressPatch::default()
                }
            }
            Err(DownloadError::Cancelled) => {
                tracing::info!(target: "mediadl.download", id = %id, "Download cancelled");
                ProgressPatch::status(DownloadStatus::Cancelled)
            }
            Err(e) => {
                tracing::warn!(target: "mediadl.download", id = %id, error = %e, "Download failed");
                ProgressPatch::failed(e.user_message())
            }
        };

        if !self.manager.update_download(id.as_str(), &patch).await {
            tracing::debug!(target: "mediadl.download", id = %id, "Result not recorded (record gone or already final)");
        }

        let mut workers = self.workers.lock().await;
        if workers.get(id).is_some_and(|worker| worker.lease == lease) {
            workers.remove(id);
        }
    }

    /// Mark active records without a live worker as failed.
    async fn reconcile(&self) -> usize {
        let _launch = self.launch_lock.lock().await;
        let active = self.manager.get_active_downloads().await;
        let orphaned: Vec<JobId> = {
            let workers = self.workers.lock().await;
            active
                .into_iter()
                .filter(|info| !workers.contains_key(&info.id))
                .map(|info| info.id)
                .collect()
        };

        let mut reconciled = 0;
        for id in orphaned {
            if self
                .manager
                .update_download(id.as_str(), &ProgressPatch::failed(WORKER_LOST))
                .await
            {
                tracing::warn!(target: "mediadl.download", id = %id, "Active download had no worker");
                reconciled += 1;
            }
        }
        reconciled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
