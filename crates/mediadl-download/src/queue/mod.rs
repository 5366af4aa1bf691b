//! Queue order management.
//!
//! This module provides a pure state machine for the order in which queued
//! jobs are dispatched. No I/O is performed here; the manager owns the lock
//! and the side effects (store updates, metrics, persistence).
//!
//! # Design
//!
//! - Pure synchronous state machine (no async, no IO, no tracing)
//! - Each id appears at most once
//! - Insertion order is dispatch priority unless reordered or force-started

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use mediadl_core::JobId;

/// A job waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEntry {
    pub id: JobId,
    /// When the job entered the queue; feeds the dequeue latency metric.
    pub enqueued_at: Instant,
}

impl QueuedEntry {
    fn new(id: JobId) -> Self {
        Self {
            id,
            enqueued_at: Instant::now(),
        }
    }
}

/// Ordered sequence of queued job ids.
///
/// This is a sync type with no internal locking; the caller
/// (`UnifiedDownloadManager`) is responsible for synchronization.
#[derive(Debug, Default)]
pub struct QueueOrder {
    pending: VecDeque<QueuedEntry>,
}

impl QueueOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check if an id is currently queued.
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// 0-based position of an id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.pending.iter().position(|entry| entry.id.as_str() == id)
    }

    /// Append an id at the tail. Returns `false` if it was already queued.
    pub fn push_back(&mut self, id: JobId) -> bool {
        if self.contains(id.as_str()) {
            return false;
        }
        self.pending.push_back(QueuedEntry::new(id));
        true
    }

    /// Pop the next entry from the front of the queue.
    pub fn pop_front(&mut self) -> Option<QueuedEntry> {
        self.pending.pop_front()
    }

    /// Remove an id wherever it sits.
    pub fn remove(&mut self, id: &str) -> Option<QueuedEntry> {
        let index = self.position(id)?;
        self.pending.remove(index)
    }

    /// Move a queued id to the front. Returns `false` if it is not queued.
    pub fn move_to_front(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(0) => true,
            Some(index) => {
                if let Some(entry) = self.pending.remove(index) {
                    self.pending.push_front(entry);
                }
                true
            }
            None => false,
        }
    }

    /// Replace the order with `new_order`.
    ///
    /// Succeeds only if `new_order` is exactly a permutation of the queued
    /// ids (same length, no duplicates, no unknown ids). On failure the
    /// order is unchanged.
    pub fn reorder(&mut self, new_order: &[JobId]) -> bool {
        if new_order.len() != self.pending.len() {
            return false;
        }

        let mut seen = HashSet::with_capacity(new_order.len());
        if !new_order.iter().all(|id| seen.insert(id.as_str())) {
            return false;
        }

        let mut reordered = VecDeque::with_capacity(new_order.len());
        for id in new_order {
            match self.pending.iter().find(|entry| &entry.id == id) {
                Some(entry) => reordered.push_back(entry.clone()),
                None => return false,
            }
        }

        self.pending = reordered;
        true
    }

    /// Empty the queue, returning the removed entries in order.
    pub fn clear(&mut self) -> Vec<QueuedEntry> {
        self.pending.drain(..).collect()
    }

    /// Queued ids in dispatch order.
    pub fn ids(&self) -> Vec<JobId> {
        self.pending.iter().map(|entry| entry.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<JobId> {
        names.iter().map(|n| JobId::new(*n)).collect()
    }

    fn queue_of(names: &[&str]) -> QueueOrder {
        let mut queue = QueueOrder::new();
        for id in ids(names) {
            queue.push_back(id);
        }
        queue
    }

    #[test]
    fn test_push_back_is_unique() {
        let mut queue = queue_of(&["a", "b"]);
        assert!(!queue.push_back(JobId::new("a")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_pop_front_order() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.pop_front().unwrap().id.as_str(), "a");
        assert_eq!(queue.ids(), ids(&["b", "c"]));
    }

    #[test]
    fn test_reorder_exact_permutation() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert!(queue.reorder(&ids(&["c", "a", "b"])));
        assert_eq!(queue.ids(), ids(&["c", "a", "b"]));
    }

    #[test]
    fn test_reorder_rejects_non_permutations() {
        let mut queue = queue_of(&["a", "b", "c"]);

        assert!(!queue.reorder(&ids(&["a", "b"])));
        assert!(!queue.reorder(&ids(&["a", "b", "x"])));
        assert!(!queue.reorder(&ids(&["a", "a", "b"])));
        assert!(!queue.reorder(&ids(&["a", "b", "c", "d"])));

        assert_eq!(queue.ids(), ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_reorder_empty_queue() {
        let mut queue = QueueOrder::new();
        assert!(queue.reorder(&[]));
        assert!(!queue.reorder(&ids(&["a"])));
    }

    #[test]
    fn test_move_to_front() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert!(queue.move_to_front("c"));
        assert_eq!(queue.ids(), ids(&["c", "a", "b"]));
        assert!(queue.move_to_front("c"));
        assert!(!queue.move_to_front("zzz"));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert!(queue.remove("b").is_some());
        assert!(queue.remove("b").is_none());
        assert_eq!(queue.clear().len(), 2);
        assert!(queue.is_empty());
    }
}
