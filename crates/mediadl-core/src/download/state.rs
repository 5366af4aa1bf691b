//! The document written by a persistence sink.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::Metrics;
use super::types::{JobId, ProgressInfo};

/// Current on-disk format version.
pub const STATE_VERSION: u32 = 1;

/// Full snapshot of the manager: queue order, every record, metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// Queued ids in dispatch order.
    #[serde(default)]
    pub queue: Vec<JobId>,
    #[serde(default)]
    pub downloads: BTreeMap<JobId, ProgressInfo>,
    #[serde(default)]
    pub metrics: Metrics,
}

impl PersistedState {
    /// Build a snapshot stamped with the current time.
    pub fn new(
        queue: Vec<JobId>,
        downloads: impl IntoIterator<Item = ProgressInfo>,
        metrics: Metrics,
    ) -> Self {
        Self {
            version: STATE_VERSION,
            saved_at: Utc::now(),
            queue,
            downloads: downloads
                .into_iter()
                .map(|info| (info.id.clone(), info))
                .collect(),
            metrics,
        }
    }

    /// A snapshot with no jobs.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Metrics::default())
    }
}
