//! End-to-end tests for the download pipeline.
//!
//! Drives a real coordinator and manager over a JSON state file with a fake
//! extractor, then reloads the file the way the binary does at startup.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

use mediadl_core::{
    DownloadError, DownloadMetadata, DownloadStatus, ExtractionOutcome, ExtractionPort,
    ExtractionRequest, ManagedService, PersistedState, PersistenceSink, ProgressInfo,
    ProgressPatch, ProgressReport, ProgressReporter,
};
use mediadl_download::{
    CoordinatorConfig, JsonStateFile, ManagerConfig, PipelineCoordinator, UnifiedDownloadManager,
};

/// Reports a few progress steps, then completes; tracks peak concurrency.
#[derive(Default)]
struct SteppingExtractor {
    running: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ExtractionPort for SteppingExtractor {
    async fn run(
        &self,
        request: ExtractionRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExtractionOutcome, DownloadError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let mut result = Ok(ExtractionOutcome {
            filename: Some(format!("{}.mp4", request.id)),
        });
        for step in 1..=4 {
            sleep(Duration::from_millis(15)).await;
            if reporter
                .report(ProgressReport::percent(f64::from(step) * 25.0))
                .await
                .is_cancel()
            {
                result = Err(DownloadError::Cancelled);
                break;
            }
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn build(
    dir: &TempDir,
    max_concurrent: usize,
    extractor: Arc<SteppingExtractor>,
) -> PipelineCoordinator {
    let sink = Arc::new(JsonStateFile::new(dir.path().join("downloads.json")));
    let manager = Arc::new(UnifiedDownloadManager::new(
        ManagerConfig {
            max_concurrent,
            flush_interval: Duration::from_millis(20),
        },
        sink as Arc<dyn PersistenceSink>,
    ));
    let mut config = CoordinatorConfig::new(dir.path().join("out"));
    config.progress_interval = Duration::ZERO;
    PipelineCoordinator::new(manager, extractor, config)
}

async fn wait_until_all_terminal(coordinator: &PipelineCoordinator) {
    let settled = timeout(Duration::from_secs(10), async {
        loop {
            let all = coordinator.progress_snapshot().await;
            if !all.is_empty() && all.iter().all(|info| info.status.is_terminal()) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "downloads did not settle");
}

#[tokio::test]
async fn test_batch_runs_under_cap_and_persists() {
    let dir = TempDir::new().unwrap();
    let extractor = Arc::new(SteppingExtractor::default());
    let coordinator = build(&dir, 2, Arc::clone(&extractor));
    coordinator.start();

    for i in 0..6 {
        coordinator
            .start_download(
                format!("job-{i}"),
                format!("https://example.com/{i}"),
                DownloadMetadata::with_format("best"),
                true,
            )
            .await
            .unwrap();
    }

    wait_until_all_terminal(&coordinator).await;
    assert!(extractor.peak.load(Ordering::SeqCst) <= 2);

    let summary = coordinator.summary().await;
    assert_eq!(summary.total, 6);
    assert_eq!(summary.count(DownloadStatus::Completed), 6);
    assert_eq!(summary.queue_size, 0);

    let metrics = coordinator.manager().get_metrics().await;
    assert_eq!(metrics.enqueue_count, 6);
    assert_eq!(metrics.completed_total, 6);

    coordinator.stop().await;

    let state = JsonStateFile::new(dir.path().join("downloads.json"))
        .load()
        .await
        .unwrap()
        .expect("state file written on stop");
    assert_eq!(state.downloads.len(), 6);
    assert!(state.queue.is_empty());
    let info = &state.downloads["job-3"];
    assert_eq!(info.status, DownloadStatus::Completed);
    assert_eq!(info.filename.as_deref(), Some("job-3.mp4"));
}

#[tokio::test]
async fn test_restart_requeues_interrupted_jobs_first() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("downloads.json");

    // A previous run died with one job mid-download and two waiting.
    let mut interrupted =
        ProgressInfo::queued("mid".into(), "https://example.com/mid", DownloadMetadata::default());
    interrupted.apply(&ProgressPatch::status(DownloadStatus::Downloading));
    let waiting: Vec<ProgressInfo> = ["w1", "w2"]
        .into_iter()
        .map(|id| {
            ProgressInfo::queued(
                id.into(),
                format!("https://example.com/{id}"),
                DownloadMetadata::default(),
            )
        })
        .collect();
    let mut done =
        ProgressInfo::queued("done".into(), "https://example.com/done", DownloadMetadata::default());
    done.apply(&ProgressPatch::status(DownloadStatus::Completed));

    let mut records = waiting;
    records.push(interrupted);
    records.push(done);
    let state = PersistedState::new(
        vec!["w2".into(), "w1".into()],
        records,
        mediadl_core::Metrics::default(),
    );
    JsonStateFile::new(&path).save(&state).await.unwrap();

    let extractor = Arc::new(SteppingExtractor::default());
    let coordinator = build(&dir, 1, extractor);
    let loaded = JsonStateFile::new(&path).load().await.unwrap().unwrap();
    let requeued = coordinator.manager().restore(loaded).await;
    assert_eq!(requeued, 3);

    let order: Vec<String> = coordinator
        .manager()
        .queued_ids()
        .await
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(order, ["mid", "w2", "w1"]);

    coordinator.start();
    coordinator.pump();
    wait_until_all_terminal(&coordinator).await;

    let summary = coordinator.summary().await;
    assert_eq!(summary.count(DownloadStatus::Completed), 4);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_cancel_mid_batch_leaves_others_running() {
    let dir = TempDir::new().unwrap();
    let coordinator = build(&dir, 1, Arc::new(SteppingExtractor::default()));
    coordinator.start();

    for id in ["a", "b"] {
        coordinator
            .start_download(
                id,
                format!("https://example.com/{id}"),
                DownloadMetadata::default(),
                true,
            )
            .await
            .unwrap();
    }
    assert!(coordinator.cancel_download("a").await);

    wait_until_all_terminal(&coordinator).await;
    let a = coordinator.manager().get_download("a").await.unwrap();
    let b = coordinator.manager().get_download("b").await.unwrap();
    assert_eq!(a.status, DownloadStatus::Cancelled);
    assert_eq!(b.status, DownloadStatus::Completed);
    coordinator.stop().await;
}
