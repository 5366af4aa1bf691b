//! Lock file I/O.
//!
//! Format: two-line text file
//! ```text
//! <pid>
//! <port>
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Lock file content parsed from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockFileData {
    pub pid: u32,
    pub port: u16,
}

/// `<dir>/<port>.lock`
pub fn lock_path(dir: &Path, port: u16) -> PathBuf {
    dir.join(format!("{port}.lock"))
}

/// Create the lock file, failing with `AlreadyExists` if it is present.
pub(super) fn create_lock(dir: &Path, data: LockFileData) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = lock_path(dir, data.port);

    let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
    let written = file
        .write_all(format!("{}\n{}\n", data.pid, data.port).as_bytes())
        .and_then(|()| file.sync_all());
    if let Err(e) = written {
        // Never leave a half-written lock behind.
        let _ = fs::remove_file(&path);
        return Err(e);
    }
    Ok(path)
}

/// Read the lock file for `port`.
pub fn read_lock(dir: &Path, port: u16) -> io::Result<LockFileData> {
    let content = fs::read_to_string(lock_path(dir, port))?;
    parse_lock_content(&content)
}

/// Delete the lock file (idempotent - no error if missing).
pub fn delete_lock(dir: &Path, port: u16) -> io::Result<()> {
    match fs::remove_file(lock_path(dir, port)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// All parseable lock files in `dir`. Malformed files are skipped.
pub fn list_locks(dir: &Path) -> io::Result<Vec<LockFileData>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("lock") {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path)
            && let Ok(data) = parse_lock_content(&content)
        {
            results.push(data);
        }
    }
    results.sort_by_key(|data| data.port);
    Ok(results)
}

fn parse_lock_content(content: &str) -> io::Result<LockFileData> {
    let mut lines = content.lines();

    let pid = lines
        .next()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing or invalid PID"))?;

    let port = lines
        .next()
        .and_then(|s| s.trim().parse::<u16>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing or invalid port"))?;

    Ok(LockFileData { pid, port })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_lock() {
        let dir = TempDir::new().unwrap();
        let data = LockFileData { pid: 4242, port: 8765 };

        let path = create_lock(dir.path(), data).unwrap();
        assert_eq!(path, dir.path().join("8765.lock"));
        assert_eq!(read_lock(dir.path(), 8765).unwrap(), data);

        delete_lock(dir.path(), 8765).unwrap();
        assert!(!path.exists());
        // Second delete should be idempotent
        delete_lock(dir.path(), 8765).unwrap();
    }

    #[test]
    fn create_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let data = LockFileData { pid: 1, port: 9000 };
        create_lock(dir.path(), data).unwrap();

        let err = create_lock(dir.path(), data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn list_skips_foreign_and_malformed_files() {
        let dir = TempDir::new().unwrap();
        create_lock(dir.path(), LockFileData { pid: 7, port: 9001 }).unwrap();
        fs::write(dir.path().join("9002.lock"), "garbage").unwrap();
        fs::write(dir.path().join("notes.txt"), "1\n2\n").unwrap();

        let locks = list_locks(dir.path()).unwrap();
        assert_eq!(locks, vec![LockFileData { pid: 7, port: 9001 }]);
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_locks(&dir.path().join("absent")).unwrap().is_empty());
    }
}
