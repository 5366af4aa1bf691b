//! Download domain types, errors and snapshots.
//!
//! Pure data types. No I/O, networking, or runtime dependencies allowed.
//!
//! # Structure
//!
//! - `types` - identifiers, status and the fixed-shape progress record
//! - `errors` - error type for download operations
//! - `metrics` - queue metrics and status summaries
//! - `state` - the document written by the persistence sink

pub mod errors;
pub mod metrics;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use errors::{DownloadError, DownloadResult};
pub use metrics::{Metrics, StatusSummary};
pub use state::{PersistedState, STATE_VERSION};
pub use types::{DownloadMetadata, DownloadStatus, JobId, ProgressInfo, ProgressPatch};
