//! Single-instance lock files and orphan cleanup.
//!
//! One `<port>.lock` file per served port records the owning pid.
//!
//! # Safety guarantees
//! - Exclusive creation (`create_new`), so two instances never both win
//! - A lock whose pid is gone is stale and purged automatically
//! - Orphan sweep only kills processes whose name and command line match

mod guard;
mod io;
mod sweep;
mod verify;

pub use guard::{LockFile, acquire_lock};
pub use io::{LockFileData, delete_lock, list_locks, lock_path, read_lock};
pub use sweep::{SweepReport, find_orphans, matches_orphan, sweep_orphans};
pub use verify::pid_exists;
