//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No process or filesystem implementation details in signatures
//! - `mediadl-download` and `mediadl-runtime` meet only through these traits
//! - Intent-based methods (report progress, register a child), not plumbing

pub mod config;
pub mod extraction;
pub mod persistence;
pub mod process_registry;
pub mod service;

use thiserror::Error;

pub use config::{ConfigProvider, MapConfigProvider};
pub use extraction::{
    ExtractionOutcome, ExtractionPort, ExtractionRequest, ProgressReport, ProgressReporter,
    ReportAck,
};
pub use persistence::PersistenceSink;
pub use process_registry::{NoopProcessRegistry, ProcessHandle, ProcessRegistryPort};
pub use service::ManagedService;

/// Errors raised by a persistence sink.
///
/// Callers treat every variant as transient: the flush is retried on the
/// next tick.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// Reading or writing the backing store failed.
    #[error("Storage error: {0}")]
    Io(String),

    /// The document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The stored document has a format version this build cannot read.
    #[error("Unsupported state version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the document.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
