//! Startup orphan sweep for helpers and services left by a previous crash.

use std::ffi::OsString;
use std::path::Path;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, info, warn};

use crate::process::kill_pid;

/// Outcome of [`sweep_orphans`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub killed: usize,
    pub failed: usize,
}

/// Whether a process looks like one of ours serving `port`.
///
/// The process name or its program path must match one of `names`, and the
/// command line must reference the port as `--port <p>`, `--port=<p>` or
/// `:<p>`.
pub fn matches_orphan(name: &str, cmd: &[String], names: &[String], port: u16) -> bool {
    let program = cmd
        .first()
        .and_then(|arg| Path::new(arg).file_name())
        .and_then(|s| s.to_str());
    let named = names
        .iter()
        .any(|n| n == name || program == Some(n.as_str()));

    named && references_port(cmd, port)
}

fn references_port(cmd: &[String], port: u16) -> bool {
    let port_str = port.to_string();
    let flag_value = format!("--port={port_str}");
    let colon = format!(":{port_str}");

    cmd.iter().enumerate().any(|(i, arg)| {
        if arg == &flag_value {
            return true;
        }
        if arg == "--port" && cmd.get(i + 1) == Some(&port_str) {
            return true;
        }
        arg.match_indices(&colon).any(|(at, _)| {
            !arg[at + colon.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        })
    })
}

/// Scan OS processes for orphans matching `names` and `port`.
///
/// `exclude` lists pids that must never be returned (ourselves, the live
/// lock owner).
pub fn find_orphans(names: &[String], port: u16, exclude: &[u32]) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
    );

    let self_pid = std::process::id();
    let mut found: Vec<u32> = system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            let pid = pid.as_u32();
            if pid == self_pid || exclude.contains(&pid) {
                return None;
            }
            let name = process.name().to_string_lossy();
            let cmd: Vec<String> = process.cmd().iter().map(os_to_string).collect();
            matches_orphan(&name, &cmd, names, port).then_some(pid)
        })
        .collect();
    found.sort_unstable();
    found
}

fn os_to_string(arg: &OsString) -> String {
    arg.to_string_lossy().into_owned()
}

/// Force-kill every orphan found by [`find_orphans`].
pub async fn sweep_orphans(names: &[String], port: u16, exclude: &[u32]) -> SweepReport {
    let orphans = find_orphans(names, port, exclude);
    let mut report = SweepReport::default();

    if orphans.is_empty() {
        debug!(port, "No orphaned processes found");
        return report;
    }

    info!(port, count = orphans.len(), "Found orphaned processes, killing");
    for pid in orphans {
        match kill_pid(pid).await {
            Ok(()) => {
                debug!(pid, "Killed orphaned process");
                report.killed += 1;
            }
            Err(e) => {
                warn!(pid, error = %e, "Failed to kill orphaned process");
                report.failed += 1;
            }
        }
    }

    info!(
        killed = report.killed,
        failed = report.failed,
        "Orphan sweep complete"
    );
    report
}
