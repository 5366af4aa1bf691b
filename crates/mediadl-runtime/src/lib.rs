//! Process runtime and OS-level concerns for mediadl.
//!
//! - [`process`] - registry of spawned helpers, signal escalation, port checks
//! - [`lockfile`] - single-instance lock per port, orphan sweep
//! - [`artifacts`] - partial-download cleanup
//! - [`supervisor`] - startup and ordered shutdown of the whole service

pub mod artifacts;
pub mod error;
pub mod lockfile;
pub mod process;
pub mod supervisor;

pub use artifacts::{is_partial_artifact, remove_partial_artifacts};
pub use error::LifecycleError;
pub use lockfile::{LockFile, LockFileData, acquire_lock, pid_exists, read_lock, sweep_orphans};
pub use process::{
    ProcessRegistry, TerminationReport, is_port_available, kill_pid, terminate_all,
};
pub use supervisor::{LifecycleSupervisor, ShutdownReport, SupervisorConfig, wait_for_signal};
