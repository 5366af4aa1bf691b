//! Terminate every tracked helper process.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use mediadl_core::ProcessRegistryPort;

use crate::lockfile::pid_exists;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of [`terminate_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Exited after SIGTERM (or were already gone).
    pub terminated: usize,
    /// Needed SIGKILL.
    pub killed: usize,
    /// Could not be signalled or survived SIGKILL.
    pub failed: usize,
}

impl TerminationReport {
    pub const fn total(&self) -> usize {
        self.terminated + self.killed + self.failed
    }
}

/// SIGTERM every tracked process, wait up to `grace`, SIGKILL the rest.
///
/// Failures are logged per pid and never stop the remaining processes from
/// being handled. Every handled pid is unregistered.
pub async fn terminate_all(
    registry: &dyn ProcessRegistryPort,
    grace: Duration,
) -> TerminationReport {
    let handles = registry.list();
    let mut report = TerminationReport::default();
    if handles.is_empty() {
        return report;
    }

    info!(count = handles.len(), grace_secs = grace.as_secs(), "Terminating helper processes");

    // Phase 1: SIGTERM everyone
    let mut pending = Vec::with_capacity(handles.len());
    for handle in &handles {
        match terminate(handle.pid) {
            Ok(true) => pending.push(handle.pid),
            Ok(false) => report.terminated += 1,
            Err(e) => {
                warn!(pid = handle.pid, error = %e, "Failed to send SIGTERM");
                pending.push(handle.pid);
            }
        }
    }

    // Phase 2: shared grace period
    let deadline = Instant::now() + grace;
    loop {
        pending.retain(|&pid| {
            let alive = pid_exists(pid);
            if !alive {
                debug!(pid, "Process exited");
                report.terminated += 1;
            }
            alive
        });
        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        sleep(POLL_INTERVAL).await;
    }

    // Phase 3: SIGKILL stragglers
    for pid in &pending {
        match force_kill(*pid).await {
            Ok(()) => {
                warn!(pid, "Process ignored SIGTERM, killed");
                report.killed += 1;
            }
            Err(e) => {
                warn!(pid, error = %e, "Failed to kill process");
                report.failed += 1;
            }
        }
    }

    for handle in &handles {
        registry.unregister(handle.pid);
    }

    info!(
        terminated = report.terminated,
        killed = report.killed,
        failed = report.failed,
        "Helper processes stopped"
    );
    report
}

#[cfg(unix)]
fn terminate(pid: u32) -> std::io::Result<bool> {
    super::pid::send(pid, nix::sys::signal::Signal::SIGTERM)
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> std::io::Result<bool> {
    // No graceful signal available; everything goes to the forceful phase.
    Ok(true)
}

#[cfg(unix)]
async fn force_kill(pid: u32) -> std::io::Result<()> {
    if !super::pid::send(pid, nix::sys::signal::Signal::SIGKILL)? {
        return Ok(());
    }
    for _ in 0..20 {
        if !pid_exists(pid) {
            return Ok(());
        }
        sleep(POLL_INTERVAL).await;
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("process {pid} did not exit after SIGKILL"),
    ))
}

#[cfg(not(unix))]
async fn force_kill(pid: u32) -> std::io::Result<()> {
    super::kill_pid(pid).await
}
