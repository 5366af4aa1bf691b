//! Kill a process by PID without reaping (no Child handle available).

use std::io;

#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tokio::time::sleep;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Kill a process by PID with SIGTERM → SIGKILL escalation.
///
/// # Strategy
/// 1. Send SIGTERM
/// 2. Poll for up to 2 seconds to verify process exit
/// 3. If still alive, send SIGKILL
/// 4. Poll again for up to 2 seconds to verify exit
///
/// Cannot reap: if the caller owns the child, it must wait on it.
///
/// # Returns
/// - `Ok(())` if process was killed or already gone
/// - `Err` if kill operations fail (excluding ESRCH)
pub async fn kill_pid(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        kill_pid_unix(pid).await
    }

    #[cfg(not(unix))]
    {
        kill_pid_other(pid)
    }
}

#[cfg(unix)]
pub(super) fn to_nix_pid(pid: u32) -> io::Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))
}

/// Send `sig`; `Ok(false)` means the process was already gone.
#[cfg(unix)]
pub(super) fn send(pid: u32, sig: Signal) -> io::Result<bool> {
    match signal::kill(to_nix_pid(pid)?, sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

#[cfg(unix)]
async fn wait_gone(pid: u32, polls: u32) -> bool {
    for _ in 0..polls {
        sleep(Duration::from_millis(100)).await;
        if !crate::lockfile::pid_exists(pid) {
            return true;
        }
    }
    false
}

#[cfg(unix)]
async fn kill_pid_unix(pid: u32) -> io::Result<()> {
    // Phase 1: SIGTERM
    if !send(pid, Signal::SIGTERM)? {
        return Ok(());
    }
    if wait_gone(pid, 20).await {
        return Ok(());
    }

    // Phase 2: SIGKILL
    tracing::debug!(pid, "Process ignored SIGTERM, sending SIGKILL");
    if !send(pid, Signal::SIGKILL)? {
        return Ok(());
    }
    if wait_gone(pid, 20).await {
        return Ok(());
    }

    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("process {pid} did not exit after SIGKILL"),
    ))
}

#[cfg(not(unix))]
fn kill_pid_other(pid: u32) -> io::Result<()> {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    match system.process(sys_pid) {
        None => Ok(()),
        Some(process) if process.kill() => Ok(()),
        Some(_) => Err(io::Error::other(format!("failed to kill process {pid}"))),
    }
}
