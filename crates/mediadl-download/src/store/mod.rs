//! Thread-safe progress store.
//!
//! Maps job ids to their latest [`ProgressInfo`]. Every operation takes the
//! single internal lock for the duration of an in-memory map operation and
//! returns clones; no I/O ever happens under the lock.
//!
//! Iteration order is insertion order, so `list()` is stable across calls.

use indexmap::IndexMap;
use tokio::sync::Mutex;

use mediadl_core::{JobId, ProgressInfo, ProgressPatch};

/// Mapping from job id to progress snapshot.
#[derive(Debug, Default)]
pub struct ProgressStore {
    entries: Mutex<IndexMap<JobId, ProgressInfo>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one job.
    pub async fn get(&self, id: &str) -> Option<ProgressInfo> {
        self.entries.lock().await.get(id).cloned()
    }

    /// Whether a job is present.
    pub async fn contains(&self, id: &str) -> bool {
        self.entries.lock().await.contains_key(id)
    }

    /// Insert or replace a record, returning the previous one.
    ///
    /// A replaced record keeps its position in iteration order.
    pub async fn insert(&self, info: ProgressInfo) -> Option<ProgressInfo> {
        self.entries.lock().await.insert(info.id.clone(), info)
    }

    /// Merge a patch into an existing record.
    ///
    /// Returns the merged snapshot, or `None` if the id is unknown.
    pub async fn update(&self, id: &str, patch: &ProgressPatch) -> Option<ProgressInfo> {
        let mut entries = self.entries.lock().await;
        let info = entries.get_mut(id)?;
        info.apply(patch);
        Some(info.clone())
    }

    /// Remove a record.
    pub async fn remove(&self, id: &str) -> Option<ProgressInfo> {
        self.entries.lock().await.shift_remove(id)
    }

    /// Remove every record matching `predicate`, returning them.
    pub async fn remove_where<F>(&self, mut predicate: F) -> Vec<ProgressInfo>
    where
        F: FnMut(&ProgressInfo) -> bool,
    {
        let mut entries = self.entries.lock().await;
        let mut removed = Vec::new();
        entries.retain(|_, info| {
            if predicate(info) {
                removed.push(info.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Snapshots for `ids`, in the given order, skipping unknown ids.
    pub async fn get_many(&self, ids: &[JobId]) -> Vec<ProgressInfo> {
        let entries = self.entries.lock().await;
        ids.iter().filter_map(|id| entries.get(id).cloned()).collect()
    }

    /// Number of records in an active status.
    pub async fn active_count(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|info| info.status.is_active())
            .count()
    }

    /// Snapshot of every record, in insertion order.
    pub async fn list(&self) -> Vec<ProgressInfo> {
        self.entries.lock().await.values().cloned().collect()
    }

    /// Replace the whole mapping.
    pub async fn replace_all(&self, records: impl IntoIterator<Item = ProgressInfo>) {
        let fresh: IndexMap<JobId, ProgressInfo> = records
            .into_iter()
            .map(|info| (info.id.clone(), info))
            .collect();
        *self.entries.lock().await = fresh;
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use mediadl_core::{DownloadMetadata, DownloadStatus};

    fn record(id: &str) -> ProgressInfo {
        ProgressInfo::queued(
            JobId::new(id),
            format!("https://example.com/{id}"),
            DownloadMetadata::default(),
        )
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let store = ProgressStore::new();
        assert!(store.insert(record("a")).await.is_none());
        assert_eq!(store.get("a").await.unwrap().url, "https://example.com/a");
        assert_eq!(store.len().await, 1);

        assert!(store.remove("a").await.is_some());
        assert!(store.get("a").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_unknown_is_none() {
        let store = ProgressStore::new();
        let patch = ProgressPatch::status(DownloadStatus::Downloading);
        assert!(store.update("missing", &patch).await.is_none());
    }

    #[tokio::test]
    async fn test_update_returns_merged_clone() {
        let store = ProgressStore::new();
        store.insert(record("a")).await;

        let merged = store
            .update("a", &ProgressPatch::status(DownloadStatus::Downloading).with_percent(40.0))
            .await
            .unwrap();
        assert_eq!(merged.status, DownloadStatus::Downloading);
        assert_eq!(store.get("a").await.unwrap().percent, 40.0);
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let store = ProgressStore::new();
        for id in ["c", "a", "b"] {
            store.insert(record(id)).await;
        }
        store.insert(record("a")).await;

        let ids: Vec<_> = store.list().await.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![JobId::new("c"), JobId::new("a"), JobId::new("b")]);
    }

    #[tokio::test]
    async fn test_remove_where() {
        let store = ProgressStore::new();
        store.insert(record("a")).await;
        store.insert(record("b")).await;
        store
            .update("b", &ProgressPatch::status(DownloadStatus::Completed))
            .await;

        let removed = store.remove_where(|i| i.status.is_terminal()).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id.as_str(), "b");
        assert!(store.contains("a").await);
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let store = Arc::new(ProgressStore::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert(record(&format!("job-{i}"))).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 50);
    }
}
