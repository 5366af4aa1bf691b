//! Process termination.
//!
//! Provides two strategies:
//! - `terminate_all`: every process in a registry, SIGTERM to all, one shared
//!   grace period, SIGKILL for stragglers
//! - `kill_pid`: one pid without a `Child` handle (orphans, `mediadl stop`)

mod group;
mod pid;

pub use group::{TerminationReport, terminate_all};
pub use pid::kill_pid;
