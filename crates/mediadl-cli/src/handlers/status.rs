//! Status command handler.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use mediadl_core::{DownloadStatus, PersistenceSink, Settings, StatusSummary};
use mediadl_download::JsonStateFile;
use mediadl_runtime::lockfile::list_locks;
use mediadl_runtime::{pid_exists, read_lock};

/// Print the lock owner and a summary of the saved state file.
pub async fn execute(settings: &Settings) -> Result<()> {
    let lock_dir = settings
        .effective_lock_dir()
        .context("Failed to resolve lock directory")?;
    let state_file = settings
        .effective_state_file()
        .context("Failed to resolve state file")?;

    match read_lock(&lock_dir, settings.port) {
        Ok(data) if pid_exists(data.pid) => {
            println!("Instance:  running (pid {}, port {})", data.pid, data.port);
        }
        Ok(data) => println!("Instance:  stale lock (pid {} not running)", data.pid),
        Err(_) => println!("Instance:  not running (port {})", settings.port),
    }
    for other in list_locks(&lock_dir)
        .unwrap_or_default()
        .into_iter()
        .filter(|data| data.port != settings.port && pid_exists(data.pid))
    {
        println!("Other:     pid {} on port {}", other.pid, other.port);
    }

    let Some(state) = JsonStateFile::new(&state_file)
        .load()
        .await
        .with_context(|| format!("Failed to read {}", state_file.display()))?
    else {
        println!("State:     no saved state at {}", state_file.display());
        return Ok(());
    };

    let saved_at: DateTime<Local> = state.saved_at.into();
    println!(
        "State:     {} (saved {})",
        state_file.display(),
        saved_at.format("%Y-%m-%d %H:%M:%S")
    );
    let summary = StatusSummary::from_records(
        state.downloads.values(),
        state.queue.len(),
        settings.max_concurrent,
    );
    println!("{}", format_summary(&summary));
    Ok(())
}

/// One `status: count` line per non-empty status.
pub fn format_summary(summary: &StatusSummary) -> String {
    let mut lines = vec![format!(
        "Downloads: {} total, {} queued in order",
        summary.total, summary.queue_size
    )];
    for status in DownloadStatus::ALL {
        let count = summary.count(status);
        if count > 0 {
            lines.push(format!("  {:<12} {count}", status.as_str()));
        }
    }
    lines.join("\n")
}
