//! Subprocess-backed [`ExtractionPort`].
//!
//! Spawns the configured helper once per job, streams its stdout through the
//! line protocol, relays progress to the worker's reporter and kills the
//! child when the reporter answers [`ReportAck::Cancel`].
//!
//! The child is registered with the process registry for its whole lifetime
//! so shutdown can terminate it even if the worker is stuck.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

use mediadl_core::{
    DownloadError, ExtractionOutcome, ExtractionPort, ExtractionRequest, NoopProcessRegistry,
    ProcessHandle, ProcessRegistryPort, ProgressReport, ProgressReporter, ReportAck, Settings,
};

use super::protocol::{HelperEvent, parse_line};

/// Unregisters the child when the bridge returns, however it returns.
struct RegistrationGuard {
    registry: Arc<dyn ProcessRegistryPort>,
    pid: Option<u32>,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid {
            self.registry.unregister(pid);
        }
    }
}

/// Runs extractions through an external helper program.
pub struct HelperCommandExtractor {
    program: PathBuf,
    base_args: Vec<String>,
    registry: Arc<dyn ProcessRegistryPort>,
}

impl HelperCommandExtractor {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            registry: Arc::new(NoopProcessRegistry),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.helper_program, settings.helper_args.clone())
    }

    /// Register spawned helpers with `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn ProcessRegistryPort>) -> Self {
        self.registry = registry;
        self
    }

    fn build_command(&self, request: &ExtractionRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .arg("--url")
            .arg(&request.url)
            .arg("--job-id")
            .arg(request.id.as_str())
            .arg("--output-dir")
            .arg(&request.output_dir);

        if let Some(ref format) = request.metadata.format {
            cmd.arg("--format").arg(format);
        }
        if let Some(ref template) = request.metadata.output_template {
            cmd.arg("--output").arg(template);
        }
        for (key, value) in &request.metadata.extra {
            cmd.arg("--opt").arg(format!("{key}={value}"));
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PYTHONUNBUFFERED", "1")
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ExtractionPort for HelperCommandExtractor {
    async fn run(
        &self,
        request: ExtractionRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExtractionOutcome, DownloadError> {
        let mut child = self.build_command(&request).spawn().map_err(|e| {
            DownloadError::helper_failed(format!(
                "Failed to spawn {}: {e}",
                self.program.display()
            ))
        })?;

        let pid = child.id();
        if let Some(pid) = pid {
            self.registry
                .register(ProcessHandle::new(pid, Some(request.id.clone())));
        }
        let _registration = RegistrationGuard {
            registry: Arc::clone(&self.registry),
            pid,
        };
        tracing::debug!(id = %request.id, pid = ?pid, "Helper spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::helper_failed("Missing stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::helper_failed("Missing stderr"))?;

        let mut stderr_reader = BufReader::new(stderr);
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_reader.read_to_end(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut outcome = ExtractionOutcome::default();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| DownloadError::helper_failed(e.to_string()))?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Ok(event) = parse_line(line) else {
                tracing::debug!(id = %request.id, line, "Helper output");
                continue;
            };

            let ack = match event {
                HelperEvent::Progress(report) => {
                    if report.filename.is_some() {
                        outcome.filename.clone_from(&report.filename);
                    }
                    reporter.report(report).await
                }
                HelperEvent::Info { title, filename } => {
                    if filename.is_some() {
                        outcome.filename.clone_from(&filename);
                    }
                    reporter
                        .report(ProgressReport {
                            title,
                            filename,
                            ..ProgressReport::default()
                        })
                        .await
                }
                HelperEvent::Error { message } => {
                    kill(&mut child, &request).await;
                    return Err(DownloadError::helper_failed(message));
                }
                HelperEvent::Complete { filename } => {
                    if filename.is_some() {
                        outcome.filename = filename;
                    }
                    ReportAck::Continue
                }
            };

            if ack.is_cancel() {
                kill(&mut child, &request).await;
                return Err(DownloadError::Cancelled);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::helper_failed(e.to_string()))?;

        let stderr_buf = stderr_task.await.unwrap_or_default();
        let stderr_text = String::from_utf8_lossy(&stderr_buf).trim().to_string();

        if !status.success() {
            let reason = if stderr_text.is_empty() {
                format!("helper exited with {status}")
            } else {
                stderr_text
            };
            return Err(DownloadError::helper_failed(reason));
        }

        Ok(outcome)
    }
}

async fn kill(child: &mut Child, request: &ExtractionRequest) {
    if let Err(e) = child.kill().await {
        tracing::warn!(id = %request.id, error = %e, "Failed to kill helper");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use mediadl_core::{DownloadMetadata, JobId};

    #[derive(Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<ProgressReport>>,
        cancel_after: Option<usize>,
    }

    #[async_trait]
    impl ProgressReporter for RecordingReporter {
        async fn report(&self, report: ProgressReport) -> ReportAck {
            let mut reports = self.reports.lock().unwrap();
            reports.push(report);
            match self.cancel_after {
                Some(n) if reports.len() >= n => ReportAck::Cancel,
                _ => ReportAck::Continue,
            }
        }
    }

    #[derive(Default)]
    struct RecordingRegistry {
        registered: Mutex<Vec<u32>>,
        unregistered: Mutex<Vec<u32>>,
    }

    impl ProcessRegistryPort for RecordingRegistry {
        fn register(&self, handle: ProcessHandle) {
            self.registered.lock().unwrap().push(handle.pid);
        }

        fn unregister(&self, pid: u32) -> Option<ProcessHandle> {
            self.unregistered.lock().unwrap().push(pid);
            None
        }

        fn list(&self) -> Vec<ProcessHandle> {
            Vec::new()
        }
    }

    fn shell(script: &str) -> HelperCommandExtractor {
        HelperCommandExtractor::new("sh", vec!["-c".into(), script.into(), "helper".into()])
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            id: JobId::new("job-1"),
            url: "https://example.com/v".into(),
            output_dir: std::env::temp_dir(),
            metadata: DownloadMetadata::with_format("best"),
        }
    }

    #[tokio::test]
    async fn test_relays_progress_and_completes() {
        let extractor = shell(
            r#"echo '{"status":"info","title":"Clip"}'
echo 'some noise'
echo '{"status":"progress","percent":50}'
echo '{"status":"complete","filename":"clip.webm"}'"#,
        );
        let reporter = RecordingReporter::default();

        let outcome = extractor.run(request(), &reporter).await.unwrap();
        assert_eq!(outcome.filename.as_deref(), Some("clip.webm"));

        let reports = reporter.reports.lock().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].title.as_deref(), Some("Clip"));
        assert_eq!(reports[1].percent, Some(50.0));
    }

    #[tokio::test]
    async fn test_passes_job_arguments() {
        let extractor = shell(
            r#"printf '{"status":"complete","filename":"%s|%s|%s"}\n' "$2" "$4" "$8""#,
        );
        let outcome = extractor
            .run(request(), &RecordingReporter::default())
            .await
            .unwrap();
        assert_eq!(
            outcome.filename.as_deref(),
            Some("https://example.com/v|job-1|best")
        );
    }

    #[tokio::test]
    async fn test_error_message_wins() {
        let extractor = shell(r#"echo '{"status":"error","message":"HTTP 403"}'; sleep 5"#);
        let err = extractor
            .run(request(), &RecordingReporter::default())
            .await
            .unwrap_err();
        assert_eq!(err, DownloadError::helper_failed("HTTP 403"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let extractor = shell("echo 'unsupported url' >&2; exit 3");
        let err = extractor
            .run(request(), &RecordingReporter::default())
            .await
            .unwrap_err();
        assert_eq!(err, DownloadError::helper_failed("unsupported url"));
    }

    #[tokio::test]
    async fn test_cancel_ack_kills_helper() {
        let extractor = shell(
            r#"echo '{"status":"progress","percent":1}'
sleep 30
echo '{"status":"complete"}'"#,
        );
        let reporter = RecordingReporter {
            cancel_after: Some(1),
            ..RecordingReporter::default()
        };

        let started = std::time::Instant::now();
        let err = extractor.run(request(), &reporter).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_registers_and_unregisters_child() {
        let registry = Arc::new(RecordingRegistry::default());
        let extractor = shell(r#"echo '{"status":"complete"}'"#)
            .with_registry(Arc::clone(&registry) as Arc<dyn ProcessRegistryPort>);

        extractor
            .run(request(), &RecordingReporter::default())
            .await
            .unwrap();

        let registered = registry.registered.lock().unwrap().clone();
        assert_eq!(registered.len(), 1);
        assert_eq!(*registry.unregistered.lock().unwrap(), registered);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let extractor = HelperCommandExtractor::new("/nonexistent/mediadl-helper", Vec::new());
        let err = extractor
            .run(request(), &RecordingReporter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HelperFailed { .. }));
    }
}
