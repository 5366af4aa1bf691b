//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together:
//! - State file sink (via mediadl-download)
//! - Download manager and pipeline coordinator (via mediadl-download)
//! - Helper bridge registered with the process registry (via mediadl-runtime)
//! - Lifecycle supervisor (via mediadl-runtime)
//!
//! The manager's persistence loop starts here (it only flushes once something
//! is marked dirty). Dispatch and cleanup loops start in `serve`, once the
//! lock is held and saved state has been restored.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use mediadl_core::{
    DirectoryCreationStrategy, ManagedService, PersistenceSink, ProcessRegistryPort, Settings,
    ensure_directory,
};
use mediadl_download::{
    CoordinatorConfig, HelperCommandExtractor, JsonStateFile, ManagerConfig, PipelineCoordinator,
    UnifiedDownloadManager,
};
use mediadl_runtime::{LifecycleSupervisor, ProcessRegistry, SupervisorConfig};

/// Fully composed service.
pub struct ServiceContext {
    pub settings: Settings,
    pub state_file: PathBuf,
    pub coordinator: Arc<PipelineCoordinator>,
    pub registry: Arc<ProcessRegistry>,
    pub supervisor: LifecycleSupervisor,
}

impl ServiceContext {
    /// Reload the saved state file into the manager.
    ///
    /// A missing file is a fresh start. An unreadable one is logged and
    /// ignored so a corrupt file never blocks startup.
    pub async fn restore_state(&self) -> usize {
        let sink = JsonStateFile::new(&self.state_file);
        match sink.load().await {
            Ok(Some(state)) => self.coordinator.manager().restore(state).await,
            Ok(None) => 0,
            Err(e) => {
                warn!(path = %self.state_file.display(), error = %e, "Ignoring unreadable state file");
                0
            }
        }
    }
}

/// Bootstrap the service from resolved settings.
pub fn bootstrap(settings: Settings) -> Result<ServiceContext> {
    let download_dir = settings
        .effective_download_dir()
        .context("Failed to resolve download directory")?;
    ensure_directory(&download_dir, DirectoryCreationStrategy::AutoCreate)
        .with_context(|| format!("Download directory {} is not usable", download_dir.display()))?;
    let state_file = settings
        .effective_state_file()
        .context("Failed to resolve state file")?;

    let registry = Arc::new(ProcessRegistry::new());
    let sink: Arc<dyn PersistenceSink> = Arc::new(JsonStateFile::new(&state_file));
    let manager = Arc::new(UnifiedDownloadManager::new(
        ManagerConfig::from_settings(&settings),
        sink,
    ));
    let extractor = Arc::new(
        HelperCommandExtractor::from_settings(&settings)
            .with_registry(Arc::clone(&registry) as Arc<dyn ProcessRegistryPort>),
    );
    let coordinator = Arc::new(PipelineCoordinator::new(
        manager,
        extractor,
        CoordinatorConfig::from_settings(&settings, &download_dir),
    ));

    let supervisor = LifecycleSupervisor::new(
        SupervisorConfig::from_settings(&settings).context("Failed to resolve lock directory")?,
        Arc::clone(&registry) as Arc<dyn ProcessRegistryPort>,
        Arc::clone(&coordinator) as Arc<dyn ManagedService>,
    );

    info!(
        download_dir = %download_dir.display(),
        state_file = %state_file.display(),
        max_concurrent = settings.max_concurrent,
        helper = %settings.helper_program,
        "Service composed"
    );

    Ok(ServiceContext {
        settings,
        state_file,
        coordinator,
        registry,
        supervisor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediadl_core::{DownloadMetadata, DownloadStatus, PersistedState, ProgressInfo};
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            download_dir: Some(dir.path().join("downloads")),
            state_file: Some(dir.path().join("state").join("downloads.json")),
            lock_dir: Some(dir.path().join("locks")),
            ..Settings::with_defaults()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_creates_download_dir() {
        let dir = TempDir::new().unwrap();
        let ctx = bootstrap(settings(&dir)).unwrap();

        assert!(dir.path().join("downloads").is_dir());
        assert_eq!(ctx.state_file, dir.path().join("state").join("downloads.json"));
        assert_eq!(ctx.restore_state().await, 0);
        ctx.coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_restore_state_requeues_saved_jobs() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let state_file = settings.state_file.clone().unwrap();

        let info =
            ProgressInfo::queued("a".into(), "https://example.com/a", DownloadMetadata::default());
        let state =
            PersistedState::new(vec!["a".into()], vec![info], mediadl_core::Metrics::default());
        JsonStateFile::new(&state_file).save(&state).await.unwrap();

        let ctx = bootstrap(settings).unwrap();
        assert_eq!(ctx.restore_state().await, 1);
        let restored = ctx.coordinator.manager().get_download("a").await.unwrap();
        assert_eq!(restored.status, DownloadStatus::Queued);
        ctx.coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_bootstrap_never_writes_clean_state() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let state_file = settings.state_file.clone().unwrap();
        std::fs::create_dir_all(state_file.parent().unwrap()).unwrap();
        std::fs::write(&state_file, "owned by another instance").unwrap();

        let ctx = bootstrap(settings).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        ctx.coordinator.stop().await;

        let content = std::fs::read_to_string(&state_file).unwrap();
        assert_eq!(content, "owned by another instance");
    }

    #[tokio::test]
    async fn test_corrupt_state_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let state_file = settings.state_file.clone().unwrap();
        std::fs::create_dir_all(state_file.parent().unwrap()).unwrap();
        std::fs::write(&state_file, "{ not json").unwrap();

        let ctx = bootstrap(settings).unwrap();
        assert_eq!(ctx.restore_state().await, 0);
        ctx.coordinator.stop().await;
    }
}
