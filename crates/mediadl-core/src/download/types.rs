//! Core domain types for downloads.
//!
//! Pure data types with no I/O dependencies.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DownloadError;

/// Caller-supplied identifier for a download job.
///
/// The id is opaque to the system; the request layer decides its format.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Status of a download job.
///
/// ```text
/// queued -> starting -> downloading -> completed | error | cancelled
/// ```
///
/// `paused` sits outside the happy path: it holds no concurrency slot and
/// returns to `queued` when resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Waiting in the queue.
    #[default]
    Queued,
    /// Taken from the queue, helper being spawned.
    Starting,
    /// Helper is reporting progress.
    Downloading,
    /// Held by the user; not queued and not running.
    Paused,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
    /// Cancelled by the user.
    Cancelled,
}

impl DownloadStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Queued,
        Self::Starting,
        Self::Downloading,
        Self::Paused,
        Self::Completed,
        Self::Error,
        Self::Cancelled,
    ];

    /// Terminal statuses accept no further transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Active statuses occupy a concurrency slot.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Downloading)
    }

    /// Whether moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        !self.is_terminal() || self == next
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DownloadError::other(format!("unknown download status: {s}")))
    }
}

/// Options passed through to the extraction helper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadMetadata {
    /// Requested format selector (e.g. `bestaudio`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Output filename template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_template: Option<String>,
    /// Free-form options forwarded as `--opt key=value`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DownloadMetadata {
    /// Metadata with a format selector.
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..Self::default()
        }
    }
}

/// Progress snapshot for one job.
///
/// Optional fields use `None` as "not reported yet"; numeric progress starts
/// at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub id: JobId,
    pub url: String,
    pub status: DownloadStatus,
    /// 0.0 ..= 100.0
    pub percent: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed_bps: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: DownloadMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressInfo {
    /// A fresh record in `queued` status.
    pub fn queued(id: JobId, url: impl Into<String>, metadata: DownloadMetadata) -> Self {
        let now = Utc::now();
        Self {
            id,
            url: url.into(),
            status: DownloadStatus::Queued,
            percent: 0.0,
            downloaded_bytes: 0,
            total_bytes: None,
            speed_bps: None,
            eta_seconds: None,
            filename: None,
            title: None,
            error: None,
            metadata,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Merge a patch into this record.
    ///
    /// Transition validity is the caller's concern; see
    /// [`DownloadStatus::can_transition_to`].
    pub fn apply(&mut self, patch: &ProgressPatch) {
        let now = Utc::now();

        if let Some(status) = patch.status {
            if status != self.status {
                match status {
                    DownloadStatus::Starting => self.started_at = Some(now),
                    DownloadStatus::Queued => {
                        self.started_at = None;
                        self.finished_at = None;
                    }
                    s if s.is_terminal() => self.finished_at = Some(now),
                    _ => {}
                }
                self.status = status;
            }
        }
        if let Some(percent) = patch.percent {
            self.percent = percent.clamp(0.0, 100.0);
        }
        if let Some(downloaded) = patch.downloaded_bytes {
            self.downloaded_bytes = downloaded;
        }
        if patch.total_bytes.is_some() {
            self.total_bytes = patch.total_bytes;
        }
        if patch.speed_bps.is_some() {
            self.speed_bps = patch.speed_bps;
        }
        if patch.eta_seconds.is_some() {
            self.eta_seconds = patch.eta_seconds;
        }
        if let Some(ref filename) = patch.filename {
            self.filename = Some(filename.clone());
        }
        if let Some(ref title) = patch.title {
            self.title = Some(title.clone());
        }
        if let Some(ref error) = patch.error {
            self.error = Some(error.clone());
        }

        self.updated_at = now;
    }

    /// Seconds since the record reached a terminal status.
    #[must_use]
    pub fn finished_age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.status.is_terminal() {
            return None;
        }
        let finished = self.finished_at.unwrap_or(self.updated_at);
        Some((now - finished).num_seconds())
    }
}

/// Partial update for a [`ProgressInfo`].
///
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressPatch {
    pub status: Option<DownloadStatus>,
    pub percent: Option<f64>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub speed_bps: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub error: Option<String>,
}

impl ProgressPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: DownloadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A terminal `error` patch carrying a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(DownloadStatus::Error),
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Set the percentage.
    #[must_use]
    pub const fn with_percent(mut self, percent: f64) -> Self {
        self.percent = Some(percent);
        self
    }

    /// Set the filename.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Whether the patch carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
