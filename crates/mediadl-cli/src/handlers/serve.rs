//! Serve command handler.

use anyhow::{Context, Result};
use tracing::info;

use mediadl_core::Settings;

use crate::bootstrap::bootstrap;

/// Run the service until a termination signal arrives.
///
/// Order matters: the lock is taken before the state file is read, so two
/// instances never restore (and then overwrite) the same state.
pub async fn execute(settings: Settings, force: bool) -> Result<()> {
    let ctx = bootstrap(settings)?;

    ctx.supervisor
        .startup(force)
        .await
        .context("Failed to start (use --force to replace a running instance)")?;

    let requeued = ctx.restore_state().await;
    ctx.coordinator.start();

    info!(
        port = ctx.settings.port,
        requeued,
        max_concurrent = ctx.settings.max_concurrent,
        "mediadl is running"
    );

    let report = ctx.supervisor.run_until_signal().await;
    println!(
        "Stopped: {} job(s) tracked, {} unfinished, {} helper(s) stopped, {} partial file(s) removed",
        report.jobs,
        report.unfinished,
        report.processes.total(),
        report.artifacts_removed,
    );
    Ok(())
}
