//! Lifecycle supervisor.
//!
//! Owns the instance lock and drives the ordered shutdown of the service.
//!
//! # Startup
//! 1. Sweep orphaned helpers/services for our port
//! 2. Warn if the port is still taken
//! 3. Acquire the lock (with `force`, kill a live owner and retry once)
//!
//! # Shutdown
//! 1. Flip the shutdown flag (repeat calls are no-ops) and stop admitting work
//! 2. Log the progress snapshot and force a flush
//! 3. Terminate tracked helper processes
//! 4. Stop the service
//! 5. Remove partial-download artifacts
//! 6. Release the lock

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use mediadl_core::{ManagedService, PathError, ProcessRegistryPort, Settings};

use crate::artifacts::remove_partial_artifacts;
use crate::error::LifecycleError;
use crate::lockfile::{LockFile, acquire_lock, delete_lock, pid_exists, read_lock, sweep_orphans};
use crate::process::{TerminationReport, ensure_port_available, kill_pid, terminate_all};

/// Supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub host: String,
    pub port: u16,
    pub lock_dir: PathBuf,
    /// Swept for partial downloads on shutdown.
    pub download_dir: PathBuf,
    pub orphan_process_names: Vec<String>,
    /// How long helpers get between SIGTERM and SIGKILL.
    pub shutdown_grace: Duration,
}

impl SupervisorConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, PathError> {
        Ok(Self {
            host: settings.host.clone(),
            port: settings.port,
            lock_dir: settings.effective_lock_dir()?,
            download_dir: settings.effective_download_dir()?,
            orphan_process_names: settings.orphan_process_names.clone(),
            shutdown_grace: Duration::from_secs(settings.shutdown_grace_secs),
        })
    }
}

/// What [`LifecycleSupervisor::shutdown`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Another shutdown was already running; nothing was done.
    pub already_in_progress: bool,
    /// Job records present when shutdown began.
    pub jobs: usize,
    /// Of those, jobs that were still queued or running.
    pub unfinished: usize,
    pub flushed: bool,
    pub processes: TerminationReport,
    pub artifacts_removed: usize,
    pub lock_released: bool,
}

/// Starts and stops the whole service.
pub struct LifecycleSupervisor {
    config: SupervisorConfig,
    registry: Arc<dyn ProcessRegistryPort>,
    service: Arc<dyn ManagedService>,
    lock: Mutex<Option<LockFile>>,
    shutting_down: AtomicBool,
}

impl LifecycleSupervisor {
    pub fn new(
        config: SupervisorConfig,
        registry: Arc<dyn ProcessRegistryPort>,
        service: Arc<dyn ManagedService>,
    ) -> Self {
        Self {
            config,
            registry,
            service,
            lock: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn holds_lock(&self) -> bool {
        self.lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|lock| !lock.is_released())
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Sweep orphans and take the instance lock.
    ///
    /// Without `force`, a live instance on the same port is a
    /// [`LifecycleError::LockConflict`]. With `force` that instance is killed
    /// and the lock retried once.
    pub async fn startup(&self, force: bool) -> Result<(), LifecycleError> {
        let port = self.config.port;
        let dir = &self.config.lock_dir;

        let live_owner = read_lock(dir, port)
            .ok()
            .map(|data| data.pid)
            .filter(|&pid| pid != std::process::id() && pid_exists(pid));
        let exclude: Vec<u32> = live_owner.into_iter().collect();
        sweep_orphans(&self.config.orphan_process_names, port, &exclude).await;

        if let Err(e) = ensure_port_available(&self.config.host, port) {
            warn!(error = %e, "Port is still in use after orphan sweep");
        }

        let lock = match acquire_lock(dir, port) {
            Ok(lock) => lock,
            Err(LifecycleError::LockConflict { pid, .. }) if force => {
                warn!(pid, port, "Killing running instance (--force)");
                if let Err(e) = kill_pid(pid).await {
                    warn!(pid, error = %e, "Failed to kill running instance");
                }
                if !pid_exists(pid) {
                    delete_lock(dir, port).map_err(|e| {
                        LifecycleError::lock_io(crate::lockfile::lock_path(dir, port), e)
                    })?;
                }
                acquire_lock(dir, port)?
            }
            Err(e) => return Err(e),
        };

        *self.lock.lock().unwrap_or_else(PoisonError::into_inner) = Some(lock);
        info!(port, "Startup complete");
        Ok(())
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Run the ordered shutdown sequence once.
    ///
    /// Every step runs even if an earlier one failed; failures are logged.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            info!("Shutdown already in progress");
            return ShutdownReport {
                already_in_progress: true,
                ..ShutdownReport::default()
            };
        }
        info!("Shutting down");
        let mut report = ShutdownReport::default();
        self.service.prepare_shutdown().await;

        // Snapshot + flush
        let snapshot = self.service.progress_snapshot().await;
        report.jobs = snapshot.len();
        for info in snapshot.iter().filter(|info| !info.status.is_terminal()) {
            report.unfinished += 1;
            info!(
                id = %info.id,
                status = %info.status,
                percent = info.percent,
                "Unfinished download at shutdown"
            );
        }
        match self.service.flush().await {
            Ok(()) => report.flushed = true,
            Err(e) => warn!(error = %e, "Final state flush failed"),
        }

        // Helpers
        report.processes = terminate_all(self.registry.as_ref(), self.config.shutdown_grace).await;

        // Service
        self.service.stop().await;

        // Partial files
        let download_dir = self.config.download_dir.clone();
        match tokio::task::spawn_blocking(move || remove_partial_artifacts(&download_dir)).await {
            Ok(Ok(removed)) => report.artifacts_removed = removed,
            Ok(Err(e)) => warn!(error = %e, "Failed to clean partial downloads"),
            Err(e) => warn!(error = %e, "Partial download cleanup task failed"),
        }

        // Lock
        let lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(lock) = lock {
            match lock.release() {
                Ok(released) => report.lock_released = released,
                Err(e) => warn!(path = %lock.path().display(), error = %e, "Failed to release lock"),
            }
        }

        info!(
            jobs = report.jobs,
            unfinished = report.unfinished,
            artifacts_removed = report.artifacts_removed,
            "Shutdown complete"
        );
        report
    }

    /// Wait for SIGTERM/SIGINT (Ctrl+C off Unix), then shut down.
    pub async fn run_until_signal(&self) -> ShutdownReport {
        wait_for_signal().await;
        self.shutdown().await
    }
}

/// Resolve once a termination signal arrives.
///
/// - **Unix:** SIGTERM and SIGINT, with fallbacks if registration fails.
/// - **Other:** Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            info!("Received SIGINT (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            info!("Received SIGTERM");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
