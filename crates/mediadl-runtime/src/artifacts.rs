//! Partial-download cleanup.
//!
//! The helper leaves `*.part`, `*.ytdl`, `*.part-Frag<N>` and `*.temp`
//! files behind when it is killed mid-download.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Whether a file name is a leftover from an interrupted download.
pub fn is_partial_artifact(file_name: &str) -> bool {
    file_name.ends_with(".part")
        || file_name.ends_with(".ytdl")
        || file_name.ends_with(".temp")
        || file_name.contains(".part-Frag")
}

/// Remove partial-download files under `dir`, recursively.
///
/// Returns the number of files removed. A missing directory removes nothing
/// and only an unreadable `dir` itself is an error. Unreadable
/// subdirectories and failed removals are logged and skipped.
pub fn remove_partial_artifacts(dir: &Path) -> io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) if current.as_path() == dir => return Err(e),
            Err(e) => {
                warn!(path = %current.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %current.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping entry of unknown type");
                    continue;
                }
            };

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            let is_artifact = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_partial_artifact);
            if !file_type.is_file() || !is_artifact {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed partial download");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial download"),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn recognises_artifact_names() {
        assert!(is_partial_artifact("clip.mp4.part"));
        assert!(is_partial_artifact("clip.mp4.ytdl"));
        assert!(is_partial_artifact("clip.f137.mp4.part-Frag12"));
        assert!(is_partial_artifact("clip.temp"));
        assert!(!is_partial_artifact("clip.mp4"));
        assert!(!is_partial_artifact("particle.txt"));
    }

    #[test]
    fn removes_only_artifacts_recursively() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("channel");
        fs::create_dir_all(&nested).unwrap();

        for name in ["a.mp4.part", "a.mp4.ytdl", "keep.mp4"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::write(nested.join("b.mp4.part-Frag3"), b"x").unwrap();
        fs::write(nested.join("b.temp"), b"x").unwrap();
        fs::write(nested.join("b.webm"), b"x").unwrap();

        assert_eq!(remove_partial_artifacts(dir.path()).unwrap(), 4);
        assert!(dir.path().join("keep.mp4").exists());
        assert!(nested.join("b.webm").exists());
        assert!(!nested.join("b.temp").exists());
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_subdir_does_not_stop_sweep() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("c.mp4.part"), b"x").unwrap();
        fs::write(dir.path().join("a.mp4.part"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = remove_partial_artifacts(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Root ignores the mode bits and clears the locked dir too.
        assert!(result.unwrap() >= 1);
        assert!(!dir.path().join("a.mp4.part").exists());
    }

    #[test]
    fn missing_dir_removes_nothing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(remove_partial_artifacts(&dir.path().join("nope")).unwrap(), 0);
    }
}
