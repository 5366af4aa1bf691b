//! JSON state file sink.
//!
//! Each save fully overwrites the file. Writes are atomic: the document goes
//! to `<file>.tmp` first and is then renamed over the target.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use mediadl_core::{PersistedState, PersistenceError, PersistenceSink, STATE_VERSION};

/// Persists manager snapshots to a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PersistenceSink for JsonStateFile {
    async fn save(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::trace!(
            path = %self.path.display(),
            downloads = state.downloads.len(),
            "State saved"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedState>, PersistenceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: PersistedState = serde_json::from_slice(&bytes)?;
        if state.version > STATE_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: state.version,
                expected: STATE_VERSION,
            });
        }
        Ok(Some(state))
    }
}
