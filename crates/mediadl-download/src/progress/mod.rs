//! Progress write throttling.
//!
//! Helpers can print progress many times a second. Only one plain progress
//! write per interval reaches the store; status-bearing writes always pass
//! and restart the window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default minimum spacing between relayed progress writes.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

const NEVER: u64 = u64::MAX;

/// Shared, lock-free gate for one job's progress writes.
#[derive(Debug)]
pub struct ProgressThrottle {
    origin: Instant,
    interval_micros: u64,
    /// Micros since `origin` of the last admitted write, or `NEVER`.
    last: AtomicU64,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval_micros: u64::try_from(interval.as_micros()).unwrap_or(u64::MAX),
            last: AtomicU64::new(NEVER),
        }
    }

    /// Whether a write may go through now.
    ///
    /// `status_change` writes are always admitted. Of several plain writes
    /// racing inside one window, at most one is admitted.
    pub fn admit(&self, status_change: bool) -> bool {
        let now = self.now_micros();
        if status_change {
            self.last.store(now, Ordering::Relaxed);
            return true;
        }

        let last = self.last.load(Ordering::Relaxed);
        if last != NEVER && now.saturating_sub(last) < self.interval_micros {
            return false;
        }
        self.last
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    fn now_micros(&self) -> u64 {
        // Stays below NEVER for any realistic process lifetime.
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(NEVER - 1)
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}
