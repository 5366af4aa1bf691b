//! Path utilities for mediadl data directories.
//!
//! This module provides the canonical path resolution for all mediadl
//! components:
//! - Application data root
//! - Lock file directory
//! - Persisted state file
//! - Default download directory
//!
//! # Design
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - No interactive/terminal I/O
//! - Environment lookups are kept in `platform`; the resolvers in `files`
//!   take the root explicitly so they can be tested without touching the
//!   process environment

mod ensure;
mod error;
mod files;
mod platform;

pub use error::PathError;

pub use platform::{DATA_DIR_ENV, data_root, resolve_data_root};

pub use files::{
    LOCK_DIR_NAME, STATE_FILE_NAME, default_download_dir, lock_dir, lock_dir_in, state_file_in,
    state_file_path,
};

pub use ensure::{DirectoryCreationStrategy, ensure_directory, verify_writable};
