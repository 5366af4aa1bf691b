//! Download worker.
//!
//! The worker operates on a value-type [`WorkerJob`] and cloned `Arc`
//! dependencies. It has no access to the coordinator's worker table; its
//! only side effects are progress writes through the manager.
//!
//! # Cancellation
//!
//! Cooperative. Every progress report checks the job's token (and whether
//! the record was cancelled or removed meanwhile) and answers the extractor
//! with [`ReportAck::Cancel`]; the extractor then stops its helper.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mediadl_core::{
    DownloadError, DownloadStatus, ExtractionOutcome, ExtractionPort, ExtractionRequest, JobId,
    ProgressReport, ProgressReporter, ReportAck,
};

use crate::manager::UnifiedDownloadManager;
use crate::progress::ProgressThrottle;

/// Dependencies for the download worker.
#[derive(Clone)]
pub(crate) struct WorkerDeps {
    pub manager: Arc<UnifiedDownloadManager>,
    pub extractor: Arc<dyn ExtractionPort>,
    pub progress_interval: Duration,
}

/// A job to be executed by the worker.
pub(crate) struct WorkerJob {
    pub request: ExtractionRequest,
    pub cancel: CancellationToken,
}

/// Relays extractor progress into the manager.
struct JobReporter {
    id: JobId,
    manager: Arc<UnifiedDownloadManager>,
    cancel: CancellationToken,
    throttle: ProgressThrottle,
    started: AtomicBool,
}

impl JobReporter {
    fn new(id: JobId, cancel: CancellationToken, deps: &WorkerDeps) -> Self {
        Self {
            id,
            manager: Arc::clone(&deps.manager),
            cancel,
            throttle: ProgressThrottle::new(deps.progress_interval),
            started: AtomicBool::new(false),
        }
    }

    /// Status changes and title/filename updates always go through; plain
    /// progress is throttled. Helpers send the latter only once.
    fn should_write(&self, always: bool) -> bool {
        self.throttle.admit(always)
    }
}

#[async_trait]
impl ProgressReporter for JobReporter {
    async fn report(&self, report: ProgressReport) -> ReportAck {
        if self.cancel.is_cancelled() {
            return ReportAck::Cancel;
        }

        let first = !self.started.swap(true, Ordering::AcqRel);
        let always = first || report.title.is_some() || report.filename.is_some();
        let mut patch = report.into_patch();
        if first {
            patch.status = Some(DownloadStatus::Downloading);
        }
        if !self.should_write(always) {
            return ReportAck::Continue;
        }

        if self.manager.update_download(self.id.as_str(), &patch).await {
            return ReportAck::Continue;
        }

        // Rejected: the record is gone or already terminal.
        match self.manager.get_download(self.id.as_str()).await {
            Some(info) if !info.status.is_terminal() => ReportAck::Continue,
            _ => {
                self.cancel.cancel();
                ReportAck::Cancel
            }
        }
    }
}

/// Run one job to completion.
///
/// Returns `Err(DownloadError::Cancelled)` when the job was cancelled before
/// or during the extraction.
pub(crate) async fn run_job(
    job: WorkerJob,
    deps: WorkerDeps,
) -> Result<ExtractionOutcome, DownloadError> {
    if job.cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }

    let reporter = JobReporter::new(job.request.id.clone(), job.cancel.clone(), &deps);
    let result = deps.extractor.run(job.request, &reporter).await;

    // An extractor that ignores the ack still ends up cancelled.
    if job.cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerConfig;
    use crate::test_support::MemorySink;
    use mediadl_core::{DownloadMetadata, PersistenceSink};

    struct ScriptedExtractor {
        reports: Vec<ProgressReport>,
    }

    #[async_trait]
    impl ExtractionPort for ScriptedExtractor {
        async fn run(
            &self,
            _request: ExtractionRequest,
            reporter: &dyn ProgressReporter,
        ) -> Result<ExtractionOutcome, DownloadError> {
            for report in &self.reports {
                if reporter.report(report.clone()).await.is_cancel() {
                    return Err(DownloadError::Cancelled);
                }
            }
            Ok(ExtractionOutcome {
                filename: Some("out.webm".into()),
            })
        }
    }

    async fn setup(reports: Vec<ProgressReport>) -> (WorkerDeps, WorkerJob) {
        let manager = Arc::new(UnifiedDownloadManager::new(
            ManagerConfig::default(),
            Arc::new(MemorySink::default()) as Arc<dyn PersistenceSink>,
        ));
        manager
            .add_download("a", "https://example.com/a", DownloadMetadata::default())
            .await;
        manager.take_for_launch("a").await.unwrap();

        let deps = WorkerDeps {
            manager,
            extractor: Arc::new(ScriptedExtractor { reports }),
            progress_interval: Duration::from_secs(60),
        };
        let job = WorkerJob {
            request: ExtractionRequest {
                id: JobId::new("a"),
                url: "https://example.com/a".into(),
                output_dir: std::env::temp_dir(),
                metadata: DownloadMetadata::default(),
            },
            cancel: CancellationToken::new(),
        };
        (deps, job)
    }

    #[tokio::test]
    async fn test_first_report_moves_to_downloading() {
        let (deps, job) = setup(vec![
            ProgressReport::percent(10.0),
            ProgressReport::percent(20.0),
        ])
        .await;
        let manager = Arc::clone(&deps.manager);

        let outcome = run_job(job, deps).await.unwrap();
        assert_eq!(outcome.filename.as_deref(), Some("out.webm"));

        let info = manager.get_download("a").await.unwrap();
        assert_eq!(info.status, DownloadStatus::Downloading);
        // Second report falls inside the throttle window.
        assert_eq!(info.percent, 10.0);
    }

    #[tokio::test]
    async fn test_title_inside_throttle_window_is_kept() {
        let (deps, job) = setup(vec![
            ProgressReport::percent(10.0),
            ProgressReport::percent(15.0),
            ProgressReport {
                title: Some("Clip".into()),
                filename: Some("clip.webm".into()),
                ..ProgressReport::default()
            },
        ])
        .await;
        let manager = Arc::clone(&deps.manager);

        run_job(job, deps).await.unwrap();

        let info = manager.get_download("a").await.unwrap();
        assert_eq!(info.title.as_deref(), Some("Clip"));
        assert_eq!(info.filename.as_deref(), Some("clip.webm"));
        assert_eq!(info.percent, 10.0);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let (deps, job) = setup(vec![ProgressReport::percent(10.0)]).await;
        job.cancel.cancel();
        assert_eq!(run_job(job, deps).await, Err(DownloadError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_record_stops_at_next_report() {
        let (deps, job) = setup(vec![
            ProgressReport::percent(10.0),
            ProgressReport::percent(20.0),
        ])
        .await;
        deps.manager
            .update_download(
                "a",
                &mediadl_core::ProgressPatch::status(DownloadStatus::Cancelled),
            )
            .await;

        assert_eq!(run_job(job, deps).await, Err(DownloadError::Cancelled));
    }
}
