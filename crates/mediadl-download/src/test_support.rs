//! Shared fakes for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use mediadl_core::{PersistedState, PersistenceError, PersistenceSink};

/// Sink keeping every saved snapshot in memory.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<PersistedState>>,
}

impl MemorySink {
    pub fn last(&self) -> Option<PersistedState> {
        self.saved.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn save(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        self.saved.lock().unwrap().push(state.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedState>, PersistenceError> {
        Ok(self.last())
    }
}
