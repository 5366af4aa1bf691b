//! Debounced background persistence.
//!
//! Mutations only bump a counter. A background loop wakes on a fixed interval
//! and, when something changed since the last successful flush, asks its
//! [`FlushTarget`] to write a full snapshot. Failures are logged and retried
//! on the next tick; callers never see them.
//!
//! # Dirty tracking
//!
//! Dirty state is a pair of generations: `mutations` is bumped by
//! [`AsyncPersistence::mark_dirty`], `flushed` records the mutation
//! generation observed right before the last successful snapshot. A mutation
//! racing with an in-flight flush therefore stays dirty and is picked up by
//! the next tick.

mod json_file;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;

use mediadl_core::PersistenceError;

pub use json_file::JsonStateFile;

/// Default flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest accepted flush interval; shorter periods are raised to it.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Upper bound on how long `stop()` waits for the loop's final flush.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can write a coherent snapshot of its state.
#[async_trait]
pub trait FlushTarget: Send + Sync {
    async fn flush(&self) -> Result<(), PersistenceError>;
}

struct Shared {
    target: Arc<dyn FlushTarget>,
    mutations: AtomicU64,
    flushed: AtomicU64,
    attempts: AtomicU64,
    /// Serializes the loop's flushes with `flush_now`.
    flush_lock: Mutex<()>,
}

impl Shared {
    fn is_dirty(&self) -> bool {
        self.mutations.load(Ordering::Acquire) > self.flushed.load(Ordering::Acquire)
    }

    async fn flush(&self) -> Result<(), PersistenceError> {
        let _guard = self.flush_lock.lock().await;
        let observed = self.mutations.load(Ordering::Acquire);
        self.attempts.fetch_add(1, Ordering::Relaxed);

        self.target.flush().await?;
        self.flushed.fetch_max(observed, Ordering::AcqRel);
        Ok(())
    }

    async fn flush_if_dirty(&self) {
        if !self.is_dirty() {
            return;
        }
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "State flush failed, will retry");
        }
    }
}

/// Background flusher coalescing dirty-state writes.
pub struct AsyncPersistence {
    shared: Arc<Shared>,
    period: Duration,
    cancel: CancellationToken,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AsyncPersistence {
    /// Create a flusher; the loop is not running until [`start`](Self::start).
    ///
    /// `period` is raised to [`MIN_FLUSH_INTERVAL`] if shorter.
    pub fn new(target: Arc<dyn FlushTarget>, period: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                target,
                mutations: AtomicU64::new(0),
                flushed: AtomicU64::new(0),
                attempts: AtomicU64::new(0),
                flush_lock: Mutex::new(()),
            }),
            period: period.max(MIN_FLUSH_INTERVAL),
            cancel: CancellationToken::new(),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the flush loop.
    ///
    /// Idempotent. Returns `false` when called outside a tokio runtime or
    /// after [`stop`](Self::stop).
    pub fn start(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime, persistence loop not started");
            return false;
        };

        let mut slot = self
            .handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            return true;
        }

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let period = self.period;
        *slot = Some(runtime.spawn(run_loop(shared, period, cancel)));
        true
    }

    /// Record a mutation. Never blocks.
    pub fn mark_dirty(&self) {
        self.shared.mutations.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether a mutation is waiting to be flushed.
    pub fn is_dirty(&self) -> bool {
        self.shared.is_dirty()
    }

    /// Force one flush attempt now, dirty or not.
    pub async fn flush_now(&self) -> Result<(), PersistenceError> {
        self.shared.flush().await
    }

    /// Number of flush attempts so far.
    pub fn flush_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::Relaxed)
    }

    /// Whether the loop task is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop after a final flush attempt.
    ///
    /// Waits at most a few seconds for the loop to finish, aborting it on
    /// expiry. If the loop did not get to its own final flush (it died or
    /// was aborted), the flush is attempted here. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();

        let Some(mut handle) = handle else {
            // Never started (or already stopped): flush inline.
            self.shared.flush_if_dirty().await;
            return;
        };

        match timeout(STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => tracing::warn!(error = %e, "Persistence loop ended abnormally"),
            Err(_) => {
                tracing::warn!("Persistence loop did not stop in time, aborting");
                handle.abort();
            }
        }
        if timeout(STOP_TIMEOUT, self.shared.flush_if_dirty()).await.is_err() {
            tracing::warn!("Final state flush timed out");
        }
    }
}

impl Drop for AsyncPersistence {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(shared: Arc<Shared>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if AssertUnwindSafe(shared.flush_if_dirty()).catch_unwind().await.is_err() {
                    tracing::error!("State flush panicked, will retry");
                }
            }
        }
    }

    shared.flush_if_dirty().await;
    tracing::debug!("Persistence loop stopped");
}
