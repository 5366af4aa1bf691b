//! Persistence sink port definition.
//!
//! The manager hands full snapshots to a sink; the sink overwrites whatever it
//! stored before. There is no incremental journal.

use async_trait::async_trait;

use super::PersistenceError;
use crate::download::PersistedState;

/// Port for persisting manager snapshots.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store a snapshot, replacing the previous one.
    async fn save(&self, state: &PersistedState) -> Result<(), PersistenceError>;

    /// Load the last stored snapshot, `None` if nothing was ever saved.
    async fn load(&self) -> Result<Option<PersistedState>, PersistenceError>;
}
