//! Download error types.
//!
//! These errors are serializable and do not hold external error types like
//! `std::io::Error`. For I/O errors, the kind and message are captured as
//! strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::DownloadStatus;

/// Error type for download operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// I/O error during file or process operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`", "`PermissionDenied`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// No job with this id is known.
    #[error("Not found: {id}")]
    NotFound {
        /// The unknown job id.
        id: String,
    },

    /// The job already has a live worker.
    #[error("Already active: {id}")]
    AlreadyActive {
        /// The job id.
        id: String,
    },

    /// A status change that the lifecycle does not allow.
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// The job id.
        id: String,
        /// Current status.
        from: DownloadStatus,
        /// Rejected target status.
        to: DownloadStatus,
    },

    /// The extraction helper reported failure or exited abnormally.
    #[error("Helper failed: {message}")]
    HelperFailed {
        /// Helper-provided message or captured stderr.
        message: String,
    },

    /// The helper produced output that violates the line protocol.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Detailed error message.
        message: String,
    },

    /// Download was cancelled by user.
    #[error("Download cancelled")]
    Cancelled,

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl DownloadError {
    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an already active error.
    pub fn already_active(id: impl Into<String>) -> Self {
        Self::AlreadyActive { id: id.into() }
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(
        id: impl Into<String>,
        from: DownloadStatus,
        to: DownloadStatus,
    ) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            from,
            to,
        }
    }

    /// Create a helper failure.
    pub fn helper_failed(message: impl Into<String>) -> Self {
        Self::HelperFailed {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this error represents a user cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Message suitable for the `error` field of a progress record.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::HelperFailed { message } | Self::Other { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_error(&err)
    }
}

/// Result type alias for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;
