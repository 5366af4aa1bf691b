//! Periodic cleanup loop.
//!
//! Each tick evicts aged terminal records, reconciles active records that
//! lost their worker and wakes the dispatcher. A panic inside one pass is
//! logged and the loop keeps going.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::{CoordinatorInner, panic_message};

/// Result of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Terminal records evicted for age.
    pub evicted: usize,
    /// Active records marked failed because no worker was running them.
    pub reconciled: usize,
}

impl CoordinatorInner {
    pub(super) async fn cleanup_once(&self) -> CleanupReport {
        let evicted = self
            .manager
            .cleanup_finished_downloads(self.config.finished_max_age_secs)
            .await;
        let reconciled = self.reconcile().await;
        self.notify.notify_one();

        if evicted > 0 || reconciled > 0 {
            tracing::info!(
                target: "mediadl.download",
                evicted,
                reconciled,
                "Cleanup pass finished"
            );
        }
        CleanupReport {
            evicted,
            reconciled,
        }
    }
}

pub(super) async fn run_cleanup_loop(inner: Arc<CoordinatorInner>, cancel: CancellationToken) {
    let mut ticker = interval(inner.config.cleanup_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(payload) = AssertUnwindSafe(inner.cleanup_once()).catch_unwind().await {
                    tracing::error!(
                        target: "mediadl.download",
                        panic = %panic_message(payload),
                        "Cleanup pass panicked"
                    );
                }
            }
        }
    }
    tracing::debug!(target: "mediadl.download", "Cleanup loop stopped");
}
