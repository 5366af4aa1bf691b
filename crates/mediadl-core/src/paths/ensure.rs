//! Directory preparation.

use std::fs;
use std::path::Path;

use super::error::PathError;

/// What [`ensure_directory`] does when the directory is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectoryCreationStrategy {
    #[default]
    AutoCreate,
    /// Report [`PathError::Missing`] instead.
    Disallow,
}

/// Make sure `path` is a writable directory, creating it if allowed.
pub fn ensure_directory(path: &Path, strategy: DirectoryCreationStrategy) -> Result<(), PathError> {
    if path.as_os_str().is_empty() {
        return Err(PathError::EmptyPath);
    }

    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(PathError::NotADirectory(path.to_path_buf())),
        Err(_) if strategy == DirectoryCreationStrategy::Disallow => {
            return Err(PathError::Missing(path.to_path_buf()));
        }
        Err(_) => fs::create_dir_all(path).map_err(|e| PathError::io("create", path, e))?,
    }

    verify_writable(path)
}

/// Probe that files can be created in `path`.
///
/// The probe file name carries our pid so concurrent probes never collide.
pub fn verify_writable(path: &Path) -> Result<(), PathError> {
    let probe = path.join(format!(".mediadl-probe-{}", std::process::id()));
    fs::write(&probe, b"").map_err(|e| PathError::io("write to", path, e))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}
