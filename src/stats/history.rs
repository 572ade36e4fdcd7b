//! Bounded FIFO history ring buffer.

use std::collections::VecDeque;
use std::sync::RwLock;

/// Ring buffer of the most recent `capacity` items.
///
/// Insertion always appends; once full, the oldest item is evicted. There
/// is no random deletion. Reads take a snapshot in chronological order.
pub struct RollingHistory<T> {
    entries: RwLock<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> RollingHistory<T> {
    /// Creates a history bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Adds a new entry, evicting the oldest if at capacity.
    pub fn push(&self, entry: T) {
        let mut entries = self.entries.write().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Returns all entries in chronological order (oldest first).
    pub fn get_all(&self) -> Vec<T> {
        self.entries.read().unwrap().iter().cloned().collect()
    }

    /// Returns the most recent entry, if any.
    pub fn latest(&self) -> Option<T> {
        self.entries.read().unwrap().back().cloned()
    }

    /// Returns the number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Returns true if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Maximum number of entries retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
