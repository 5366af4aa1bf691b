//! Line protocol spoken by the extraction helper.
//!
//! The helper writes one JSON object per line to stdout. Every message has a
//! required `status` field:
//!
//! ```json
//! {"status": "progress", "percent": 42.0, "downloaded": 1024, "total": 4096, "speed": 512.0, "eta": 6, "filename": "clip.webm"}
//! {"status": "info", "title": "Some clip", "filename": "clip.webm"}
//! {"status": "error", "message": "HTTP Error 403: Forbidden"}
//! {"status": "complete", "filename": "clip.webm"}
//! ```

use serde::Deserialize;
use thiserror::Error;

use mediadl_core::ProgressReport;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when parsing protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing or invalid 'status' field")]
    InvalidStatus,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),
}

// ============================================================================
// Protocol Events
// ============================================================================

/// Events emitted by the helper.
#[derive(Debug, Clone, PartialEq)]
pub enum HelperEvent {
    /// Download progress.
    Progress(ProgressReport),

    /// Metadata became known.
    Info {
        title: Option<String>,
        filename: Option<String>,
    },

    /// The helper gave up.
    Error { message: String },

    /// The helper finished successfully.
    Complete { filename: Option<String> },
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Deserialize)]
struct RawEnvelope {
    status: Option<String>,
    percent: Option<f64>,
    // Python helpers send byte counts and ETAs as floats as often as ints.
    downloaded: Option<f64>,
    total: Option<f64>,
    speed: Option<f64>,
    eta: Option<f64>,
    filename: Option<String>,
    title: Option<String>,
    message: Option<String>,
    detail: Option<String>,
}

/// Parse a single line of helper output.
///
/// Returns an error for anything that is not a protocol message; the caller
/// decides whether that is fatal (it is not: such lines are logged).
pub fn parse_line(line: &str) -> Result<HelperEvent, ProtocolError> {
    let envelope: RawEnvelope = serde_json::from_str(line)?;
    let status = envelope.status.ok_or(ProtocolError::InvalidStatus)?;

    match status.as_str() {
        "progress" => {
            let downloaded = whole(envelope.downloaded);
            let total = whole(envelope.total);
            Ok(HelperEvent::Progress(ProgressReport {
                percent: envelope.percent.or_else(|| derive_percent(downloaded, total)),
                downloaded_bytes: downloaded,
                total_bytes: total,
                speed_bps: envelope.speed,
                eta_seconds: whole(envelope.eta),
                filename: envelope.filename,
                title: envelope.title,
            }))
        }

        "info" => Ok(HelperEvent::Info {
            title: envelope.title,
            filename: envelope.filename,
        }),

        "error" => {
            let message = envelope
                .message
                .or(envelope.detail)
                .ok_or(ProtocolError::MissingField("message"))?;
            Ok(HelperEvent::Error { message })
        }

        "complete" => Ok(HelperEvent::Complete {
            filename: envelope.filename,
        }),

        other => Err(ProtocolError::UnknownStatus(other.to_string())),
    }
}

/// Round a non-negative float to a whole count; saturates at `u64::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(value: Option<f64>) -> Option<u64> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64)
}

#[allow(clippy::cast_precision_loss)]
fn derive_percent(downloaded: Option<u64>, total: Option<u64>) -> Option<f64> {
    match (downloaded, total) {
        (Some(done), Some(total)) if total > 0 => Some(done as f64 * 100.0 / total as f64),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
