//! Well-known files and directories under the data root.

use std::path::{Path, PathBuf};

use super::error::PathError;
use super::platform::data_root;

/// Subdirectory of the data root holding `<port>.lock` files.
pub const LOCK_DIR_NAME: &str = "locks";

/// File name of the persisted manager state.
pub const STATE_FILE_NAME: &str = "downloads.json";

/// Lock directory under an explicit root.
pub fn lock_dir_in(root: &Path) -> PathBuf {
    root.join(LOCK_DIR_NAME)
}

/// State file under an explicit root.
pub fn state_file_in(root: &Path) -> PathBuf {
    root.join(STATE_FILE_NAME)
}

/// Directory holding per-port lock files.
pub fn lock_dir() -> Result<PathBuf, PathError> {
    Ok(lock_dir_in(&data_root()?))
}

/// Default location of the persisted state file.
pub fn state_file_path() -> Result<PathBuf, PathError> {
    Ok(state_file_in(&data_root()?))
}

/// Default download directory.
///
/// `<Downloads>/mediadl` when the platform has a downloads folder, otherwise
/// `<data root>/downloads`.
pub fn default_download_dir() -> Result<PathBuf, PathError> {
    match dirs::download_dir() {
        Some(dir) => Ok(dir.join("mediadl")),
        None => Ok(data_root()?.join("downloads")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_root() {
        let root = Path::new("/srv/mediadl");
        assert_eq!(lock_dir_in(root), PathBuf::from("/srv/mediadl/locks"));
        assert_eq!(
            state_file_in(root),
            PathBuf::from("/srv/mediadl/downloads.json")
        );
    }
}
