//! Path resolution errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    /// Neither `MEDIADL_DATA_DIR` nor a platform data directory is available.
    #[error("No data directory available (set MEDIADL_DATA_DIR)")]
    NoDataDir,

    #[error("Empty path")]
    EmptyPath,

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// Missing, and the caller did not allow creating it.
    #[error("{} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("Cannot {op} {}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PathError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
