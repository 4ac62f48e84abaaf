//! Dedup guard over the keys of queued tasks.

use crate::model::EquivalenceKey;
use std::collections::HashSet;

/// Keys of tasks currently waiting in the FIFO. A key leaves the set as soon
/// as its task is dequeued, so an equivalent task may be queued while the
/// first one runs.
#[derive(Debug, Default)]
pub struct EquivalenceSet {
    keys: HashSet<EquivalenceKey>,
}

impl EquivalenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the key was already present.
    pub fn insert(&mut self, key: EquivalenceKey) -> bool {
        self.keys.insert(key)
    }

    pub fn remove(&mut self, key: &EquivalenceKey) -> bool {
        self.keys.remove(key)
    }

    pub fn contains(&self, key: &EquivalenceKey) -> bool {
        self.keys.contains(key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
