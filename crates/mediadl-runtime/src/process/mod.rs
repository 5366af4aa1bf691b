//! Process management for helper subprocesses.
//!
//! - [`ProcessRegistry`]: pids spawned on behalf of jobs
//! - [`terminate_all`]: graceful-then-forceful termination of everything tracked
//! - [`kill_pid`]: SIGTERM → SIGKILL for a single pid without a child handle
//! - [`is_port_available`]: bind probe used for startup diagnostics

mod ports;
mod registry;
mod shutdown;

pub use ports::{ensure_port_available, is_port_available};
pub use registry::ProcessRegistry;
pub use shutdown::{TerminationReport, kill_pid, terminate_all};
