//! Lifecycle errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use mediadl_core::PathError;

/// Errors raised while starting or stopping the service.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Another live instance owns the port.
    #[error("Another instance (pid {pid}) is already serving port {port}")]
    LockConflict { pid: u32, port: u16 },

    #[error("Lock file error at {path}: {source}")]
    LockIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),
}

impl LifecycleError {
    pub fn lock_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::LockIo {
            path: path.into(),
            source,
        }
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::LockConflict { .. })
    }
}
