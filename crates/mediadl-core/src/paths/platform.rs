//! Platform-specific root resolution.

use std::env;
use std::path::PathBuf;

use super::error::PathError;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "MEDIADL_DATA_DIR";

/// Get the root directory for application data (state file, lock files).
///
/// Resolution order:
/// 1. `MEDIADL_DATA_DIR` environment variable (highest priority)
/// 2. System data directory (e.g., `~/.local/share/mediadl`)
///
/// The directory is not created here; callers use
/// [`ensure_directory`](super::ensure_directory) when they need it.
pub fn data_root() -> Result<PathBuf, PathError> {
    resolve_data_root(env::var(DATA_DIR_ENV).ok().as_deref(), dirs::data_local_dir())
}

/// Pure resolver behind [`data_root`].
pub fn resolve_data_root(
    env_override: Option<&str>,
    system_data_dir: Option<PathBuf>,
) -> Result<PathBuf, PathError> {
    if let Some(raw) = env_override {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::EmptyPath);
        }
        return Ok(PathBuf::from(trimmed));
    }

    system_data_dir
        .map(|dir| dir.join("mediadl"))
        .ok_or(PathError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let root = resolve_data_root(Some("/tmp/mdl"), Some(PathBuf::from("/data"))).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/mdl"));
    }

    #[test]
    fn test_system_dir_fallback() {
        let root = resolve_data_root(None, Some(PathBuf::from("/data"))).unwrap();
        assert_eq!(root, PathBuf::from("/data/mediadl"));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            resolve_data_root(Some("  "), None),
            Err(PathError::EmptyPath)
        ));
        assert!(matches!(
            resolve_data_root(None, None),
            Err(PathError::NoDataDir)
        ));
    }
}
