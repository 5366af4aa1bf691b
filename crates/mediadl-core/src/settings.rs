//! Settings domain types and validation.
//!
//! Settings are read once at startup from a [`ConfigProvider`] and passed
//! down explicitly; nothing re-reads configuration at runtime.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::paths::{self, PathError};
use crate::ports::ConfigProvider;

/// Default port of the request layer.
pub const DEFAULT_PORT: u16 = 8765;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Configuration keys understood by [`Settings::from_provider`].
pub mod keys {
    pub const MAX_CONCURRENT: &str = "max_concurrent";
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const DOWNLOAD_DIR: &str = "download_dir";
    pub const STATE_FILE: &str = "state_file";
    pub const LOCK_DIR: &str = "lock_dir";
    pub const HELPER_PROGRAM: &str = "helper_program";
    pub const HELPER_ARGS: &str = "helper_args";
    pub const FLUSH_INTERVAL_MS: &str = "flush_interval_ms";
    pub const CLEANUP_INTERVAL_SECS: &str = "cleanup_interval_secs";
    pub const FINISHED_MAX_AGE_SECS: &str = "finished_max_age_secs";
    pub const SHUTDOWN_GRACE_SECS: &str = "shutdown_grace_secs";
    pub const ORPHAN_PROCESS_NAMES: &str = "orphan_process_names";

    /// Every key, in documentation order.
    pub const ALL: [&str; 13] = [
        MAX_CONCURRENT,
        HOST,
        PORT,
        DOWNLOAD_DIR,
        STATE_FILE,
        LOCK_DIR,
        HELPER_PROGRAM,
        HELPER_ARGS,
        FLUSH_INTERVAL_MS,
        CLEANUP_INTERVAL_SECS,
        FINISHED_MAX_AGE_SECS,
        SHUTDOWN_GRACE_SECS,
        ORPHAN_PROCESS_NAMES,
    ];
}

/// Application settings.
///
/// Directory fields are optional; `None` means "use the platform default"
/// (see the `effective_*` accessors).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Concurrency cap for running downloads.
    pub max_concurrent: usize,

    pub host: String,

    /// Service port; also names the lock file.
    pub port: u16,

    pub download_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub lock_dir: Option<PathBuf>,

    /// Extraction helper executable.
    pub helper_program: String,

    /// Arguments placed before the per-job arguments (e.g. a script path).
    pub helper_args: Vec<String>,

    pub flush_interval_ms: u64,
    pub cleanup_interval_secs: u64,

    /// Terminal jobs older than this are evicted by the cleanup loop.
    pub finished_max_age_secs: u64,

    /// Grace period between SIGTERM and SIGKILL.
    pub shutdown_grace_secs: u64,

    /// Process names considered ours by the orphan sweep.
    pub orphan_process_names: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            max_concurrent: 1,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            download_dir: None,
            state_file: None,
            lock_dir: None,
            helper_program: "mediadl-helper".to_string(),
            helper_args: Vec::new(),
            flush_interval_ms: 100,
            cleanup_interval_secs: 120,
            finished_max_age_secs: 3600,
            shutdown_grace_secs: 5,
            orphan_process_names: vec!["mediadl".to_string(), "mediadl-helper".to_string()],
        }
    }

    /// Read every key from a provider, keeping defaults for missing keys.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self, SettingsError> {
        let mut settings = Self::with_defaults();

        if let Some(v) = parse_key(provider, keys::MAX_CONCURRENT)? {
            settings.max_concurrent = v;
        }
        if let Some(v) = non_empty(provider, keys::HOST) {
            settings.host = v;
        }
        if let Some(v) = parse_key(provider, keys::PORT)? {
            settings.port = v;
        }
        if let Some(v) = non_empty(provider, keys::DOWNLOAD_DIR) {
            settings.download_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(provider, keys::STATE_FILE) {
            settings.state_file = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(provider, keys::LOCK_DIR) {
            settings.lock_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = provider.lookup(keys::HELPER_PROGRAM) {
            settings.helper_program = v.trim().to_string();
        }
        if let Some(v) = provider.lookup(keys::HELPER_ARGS) {
            settings.helper_args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = parse_key(provider, keys::FLUSH_INTERVAL_MS)? {
            settings.flush_interval_ms = v;
        }
        if let Some(v) = parse_key(provider, keys::CLEANUP_INTERVAL_SECS)? {
            settings.cleanup_interval_secs = v;
        }
        if let Some(v) = parse_key(provider, keys::FINISHED_MAX_AGE_SECS)? {
            settings.finished_max_age_secs = v;
        }
        if let Some(v) = parse_key(provider, keys::SHUTDOWN_GRACE_SECS)? {
            settings.shutdown_grace_secs = v;
        }
        if let Some(v) = provider.lookup(keys::ORPHAN_PROCESS_NAMES) {
            settings.orphan_process_names = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Download directory, falling back to the platform default.
    pub fn effective_download_dir(&self) -> Result<PathBuf, PathError> {
        match self.download_dir {
            Some(ref dir) => Ok(dir.clone()),
            None => paths::default_download_dir(),
        }
    }

    /// State file, falling back to `<data root>/downloads.json`.
    pub fn effective_state_file(&self) -> Result<PathBuf, PathError> {
        match self.state_file {
            Some(ref file) => Ok(file.clone()),
            None => paths::state_file_path(),
        }
    }

    /// Lock directory, falling back to `<data root>/locks`.
    pub fn effective_lock_dir(&self) -> Result<PathBuf, PathError> {
        match self.lock_dir {
            Some(ref dir) => Ok(dir.clone()),
            None => paths::lock_dir(),
        }
    }
}

fn non_empty(provider: &dyn ConfigProvider, key: &str) -> Option<String> {
    provider
        .lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_key<T: FromStr>(
    provider: &dyn ConfigProvider,
    key: &'static str,
) -> Result<Option<T>, SettingsError> {
    match non_empty(provider, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| SettingsError::InvalidValue { key, value: raw }),
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Max concurrent downloads must be between 1 and 64, got {0}")]
    InvalidMaxConcurrent(usize),

    #[error("Port should be >= 1024 (privileged ports require root), got {0}")]
    InvalidPort(u16),

    #[error("Flush interval must be at least 10 ms, got {0}")]
    InvalidFlushInterval(u64),

    #[error("Cleanup interval must be at least 1 second, got {0}")]
    InvalidCleanupInterval(u64),

    #[error("Shutdown grace period must be at most 300 seconds, got {0}")]
    InvalidShutdownGrace(u64),

    #[error("Helper program cannot be empty")]
    EmptyHelperProgram,

    #[error("Host cannot be empty")]
    EmptyHost,
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if !(1..=64).contains(&settings.max_concurrent) {
        return Err(SettingsError::InvalidMaxConcurrent(settings.max_concurrent));
    }

    if settings.port < 1024 {
        return Err(SettingsError::InvalidPort(settings.port));
    }

    if settings.host.trim().is_empty() {
        return Err(SettingsError::EmptyHost);
    }

    if settings.helper_program.trim().is_empty() {
        return Err(SettingsError::EmptyHelperProgram);
    }

    if settings.flush_interval_ms < 10 {
        return Err(SettingsError::InvalidFlushInterval(settings.flush_interval_ms));
    }

    if settings.cleanup_interval_secs == 0 {
        return Err(SettingsError::InvalidCleanupInterval(
            settings.cleanup_interval_secs,
        ));
    }

    if settings.shutdown_grace_secs > 300 {
        return Err(SettingsError::InvalidShutdownGrace(
            settings.shutdown_grace_secs,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MapConfigProvider;

    #[test]
    fn test_default_settings() {
        let settings = Settings::with_defaults();
        assert_eq!(settings.max_concurrent, 1);
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.flush_interval_ms, 100);
        assert_eq!(settings.cleanup_interval_secs, 120);
        assert_eq!(settings.shutdown_grace_secs, 5);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_from_empty_provider_is_default() {
        let settings = Settings::from_provider(&MapConfigProvider::new()).unwrap();
        assert_eq!(settings, Settings::with_defaults());
    }

    #[test]
    fn test_from_provider_parses_values() {
        let provider = MapConfigProvider::new()
            .with(keys::MAX_CONCURRENT, "3")
            .with(keys::PORT, "9100")
            .with(keys::DOWNLOAD_DIR, "/tmp/media")
            .with(keys::HELPER_ARGS, "helper.py  --quiet")
            .with(keys::ORPHAN_PROCESS_NAMES, "yt-dlp, mediadl ,");
        let settings = Settings::from_provider(&provider).unwrap();

        assert_eq!(settings.max_concurrent, 3);
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.download_dir, Some(PathBuf::from("/tmp/media")));
        assert_eq!(settings.helper_args, vec!["helper.py", "--quiet"]);
        assert_eq!(settings.orphan_process_names, vec!["yt-dlp", "mediadl"]);
    }

    #[test]
    fn test_from_provider_rejects_garbage() {
        let provider = MapConfigProvider::new().with(keys::PORT, "eighty");
        let err = Settings::from_provider(&provider).unwrap_err();
        assert_eq!(
            err,
            SettingsError::InvalidValue {
                key: keys::PORT,
                value: "eighty".to_string()
            }
        );
    }

    #[test]
    fn test_validate_ranges() {
        let mut settings = Settings::with_defaults();
        settings.max_concurrent = 0;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidMaxConcurrent(0))
        ));

        let mut settings = Settings::with_defaults();
        settings.port = 80;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidPort(80))
        ));

        let mut settings = Settings::with_defaults();
        settings.helper_program = "  ".to_string();
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::EmptyHelperProgram)
        ));
    }

    #[test]
    fn test_explicit_dirs_win() {
        let mut settings = Settings::with_defaults();
        settings.lock_dir = Some(PathBuf::from("/run/mediadl"));
        assert_eq!(
            settings.effective_lock_dir().unwrap(),
            PathBuf::from("/run/mediadl")
        );
    }
}
