//! Acquiring and releasing the instance lock.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::io::{LockFileData, create_lock, delete_lock, read_lock};
use super::verify::pid_exists;
use crate::error::LifecycleError;

/// A lock file owned by this process.
#[derive(Debug)]
pub struct LockFile {
    dir: PathBuf,
    path: PathBuf,
    port: u16,
    released: AtomicBool,
}

impl LockFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Remove the lock file. Idempotent; returns `true` the first time.
    ///
    /// The file is only removed while it still names this process.
    pub fn release(&self) -> io::Result<bool> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        match read_lock(&self.dir, self.port) {
            Ok(data) if data.pid != std::process::id() => {
                warn!(port = self.port, owner = data.pid, "Lock file was taken over, leaving it");
                return Ok(false);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            _ => {}
        }
        delete_lock(&self.dir, self.port)?;
        info!(port = self.port, path = %self.path.display(), "Released instance lock");
        Ok(true)
    }
}

/// Create `<dir>/<port>.lock` for this process.
///
/// An existing lock whose pid is no longer running (or that cannot be
/// parsed) is stale: it is purged and creation retried once. A live owner
/// yields [`LifecycleError::LockConflict`].
pub fn acquire_lock(dir: &Path, port: u16) -> Result<LockFile, LifecycleError> {
    let data = LockFileData {
        pid: std::process::id(),
        port,
    };

    for _ in 0..2 {
        match create_lock(dir, data) {
            Ok(path) => {
                info!(port, path = %path.display(), "Acquired instance lock");
                return Ok(LockFile {
                    dir: dir.to_path_buf(),
                    path,
                    port,
                    released: AtomicBool::new(false),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                purge_if_stale(dir, port)?;
            }
            Err(e) => return Err(LifecycleError::lock_io(super::lock_path(dir, port), e)),
        }
    }

    Err(LifecycleError::lock_io(
        super::lock_path(dir, port),
        io::Error::new(io::ErrorKind::AlreadyExists, "lock file reappeared after purge"),
    ))
}

fn purge_if_stale(dir: &Path, port: u16) -> Result<(), LifecycleError> {
    let path = super::lock_path(dir, port);
    match read_lock(dir, port) {
        Ok(existing) if existing.pid != std::process::id() && pid_exists(existing.pid) => {
            return Err(LifecycleError::LockConflict {
                pid: existing.pid,
                port,
            });
        }
        Ok(existing) => {
            warn!(port, pid = existing.pid, "Removing stale lock file (owner not running)");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(port, "Lock file vanished before it could be read");
            return Ok(());
        }
        Err(e) => {
            warn!(port, error = %e, "Removing unreadable lock file");
        }
    }
    delete_lock(dir, port).map_err(|e| LifecycleError::lock_io(path, e))
}
