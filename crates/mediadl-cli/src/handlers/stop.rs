//! Stop command handler.

use anyhow::{Context, Result};

use mediadl_core::Settings;
use mediadl_runtime::{kill_pid, pid_exists, read_lock};
use mediadl_runtime::lockfile::delete_lock;

/// Stop the instance recorded in the lock file for the configured port.
pub async fn execute(settings: &Settings) -> Result<()> {
    let lock_dir = settings
        .effective_lock_dir()
        .context("Failed to resolve lock directory")?;
    let port = settings.port;

    let Ok(data) = read_lock(&lock_dir, port) else {
        println!("No instance is serving port {port}");
        return Ok(());
    };

    if data.pid == std::process::id() || !pid_exists(data.pid) {
        delete_lock(&lock_dir, port).context("Failed to remove stale lock file")?;
        println!("Removed stale lock for port {port} (pid {} not running)", data.pid);
        return Ok(());
    }

    println!("Stopping instance on port {port} (pid {})...", data.pid);
    kill_pid(data.pid)
        .await
        .with_context(|| format!("Failed to stop pid {}", data.pid))?;

    // A clean shutdown releases its own lock; a killed one leaves it behind.
    delete_lock(&lock_dir, port).context("Failed to remove lock file")?;
    println!("Stopped");
    Ok(())
}
