//! Download orchestration for mediadl.
//!
//! This crate implements the job-side half of the system on top of the ports
//! in `mediadl-core`:
//!
//! - [`store`] - thread-safe job id → progress snapshot map
//! - [`persistence`] - debounced background flusher and the JSON state sink
//! - [`queue`] - pure queue-order state machine
//! - [`manager`] - queue, admission counters, metrics, record lifecycle
//! - [`coordinator`] - concurrency-capped dispatch, workers, cleanup loop
//! - [`helper`] - the subprocess-backed extraction port
//! - [`progress`] - progress write throttling

pub mod coordinator;
pub mod helper;
pub mod manager;
pub mod persistence;
pub mod progress;
pub mod queue;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{CleanupReport, CoordinatorConfig, PipelineCoordinator};
pub use helper::HelperCommandExtractor;
pub use manager::{ManagerConfig, UnifiedDownloadManager};
pub use persistence::{AsyncPersistence, FlushTarget, JsonStateFile};
pub use progress::ProgressThrottle;
pub use queue::QueueOrder;
pub use store::ProgressStore;
