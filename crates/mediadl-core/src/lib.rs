//! Core domain types and port definitions for mediadl.
//!
//! This crate has no runtime, process or filesystem-heavy dependencies. It
//! defines the vocabulary shared by the download orchestration layer
//! (`mediadl-download`), the process runtime (`mediadl-runtime`) and the
//! composition root (`mediadl-cli`).
//!
//! - [`download`] - job identifiers, progress records, metrics, persisted state
//! - [`ports`] - trait abstractions for extraction, persistence, configuration,
//!   process tracking and service lifecycle
//! - [`settings`] - typed settings read once at startup
//! - [`paths`] - canonical data, lock and state locations

pub mod download;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use download::{
    DownloadError, DownloadMetadata, DownloadResult, DownloadStatus, JobId, Metrics,
    PersistedState, ProgressInfo, ProgressPatch, STATE_VERSION, StatusSummary,
};
pub use ports::{
    ConfigProvider, ExtractionOutcome, ExtractionPort, ExtractionRequest, ManagedService,
    MapConfigProvider, NoopProcessRegistry, PersistenceError, PersistenceSink, ProcessHandle,
    ProcessRegistryPort, ProgressReport, ProgressReporter, ReportAck,
};
pub use settings::{DEFAULT_HOST, DEFAULT_PORT, Settings, SettingsError, keys, validate_settings};

// Re-export path utilities
pub use paths::{
    DATA_DIR_ENV, DirectoryCreationStrategy, PathError, data_root, default_download_dir,
    ensure_directory, lock_dir, lock_dir_in, resolve_data_root, state_file_in, state_file_path,
    verify_writable,
};
