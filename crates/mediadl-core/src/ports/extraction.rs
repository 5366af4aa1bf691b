//! Extraction port definition.
//!
//! The extraction itself happens out of process. This port is the seam the
//! coordinator's workers call through; the production implementation spawns
//! a helper subprocess, tests plug in fakes.
//!
//! # Cancellation
//!
//! Cancellation is cooperative. The worker answers every progress report with
//! a [`ReportAck`]; an implementation must stop and return
//! [`DownloadError::Cancelled`] once it receives [`ReportAck::Cancel`].

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::download::{DownloadError, DownloadMetadata, JobId, ProgressPatch};

/// What to extract and where to put it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub id: JobId,
    pub url: String,
    pub output_dir: PathBuf,
    pub metadata: DownloadMetadata,
}

/// Result of a successful extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    /// Final output file name, if the helper reported one.
    pub filename: Option<String>,
}

/// One progress observation from the helper.
///
/// Every field is optional; the helper reports what it knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub percent: Option<f64>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub speed_bps: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub filename: Option<String>,
    pub title: Option<String>,
}

impl ProgressReport {
    /// A report carrying only a percentage.
    #[must_use]
    pub fn percent(percent: f64) -> Self {
        Self {
            percent: Some(percent),
            ..Self::default()
        }
    }

    /// Convert into a store patch (status left untouched).
    #[must_use]
    pub fn into_patch(self) -> ProgressPatch {
        ProgressPatch {
            status: None,
            percent: self.percent,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            speed_bps: self.speed_bps,
            eta_seconds: self.eta_seconds,
            filename: self.filename,
            title: self.title,
            error: None,
        }
    }
}

/// The worker's answer to a progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportAck {
    /// Keep going.
    Continue,
    /// The job was cancelled; stop as soon as possible.
    Cancel,
}

impl ReportAck {
    #[must_use]
    pub const fn is_cancel(self) -> bool {
        matches!(self, Self::Cancel)
    }
}

/// Receives progress from a running extraction.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Record a progress observation and say whether to continue.
    async fn report(&self, report: ProgressReport) -> ReportAck;
}

/// Runs one extraction to completion.
#[async_trait]
pub trait ExtractionPort: Send + Sync {
    /// Perform the extraction, reporting progress along the way.
    ///
    /// Returns [`DownloadError::Cancelled`] when a report was answered with
    /// [`ReportAck::Cancel`].
    async fn run(
        &self,
        request: ExtractionRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExtractionOutcome, DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_into_patch_keeps_status_unset() {
        let patch = ProgressReport {
            percent: Some(12.5),
            title: Some("clip".into()),
            ..ProgressReport::default()
        }
        .into_patch();
        assert_eq!(patch.status, None);
        assert_eq!(patch.percent, Some(12.5));
        assert_eq!(patch.title.as_deref(), Some("clip"));
    }
}
