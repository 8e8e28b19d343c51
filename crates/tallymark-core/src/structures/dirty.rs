//! Dirty key tracking shared by the bucket and counter caches

use std::collections::HashSet;
use std::hash::Hash;

use parking_lot::Mutex;

/// Set of keys whose cached value differs from the store.
///
/// Flushes take the whole set at once and put back whatever they failed to
/// write.
pub struct DirtySet<K> {
    keys: Mutex<HashSet<K>>,
}

impl<K: Eq + Hash + Clone> DirtySet<K> {
    /// Create an empty set
    pub fn new() -> Self {
        Self { keys: Mutex::new(HashSet::new()) }
    }

    /// Mark a key dirty; returns the new dirty count
    pub fn mark(&self, key: K) -> usize {
        let mut keys = self.keys.lock();
        keys.insert(key);
        keys.len()
    }

    /// Take every dirty key, leaving the set empty
    pub fn take(&self) -> Vec<K> {
        std::mem::take(&mut *self.keys.lock()).into_iter().collect()
    }

    /// Put keys back after a failed flush
    pub fn requeue(&self, keys: impl IntoIterator<Item = K>) {
        self.keys.lock().extend(keys);
    }

    /// Whether `key` is dirty
    pub fn contains(&self, key: &K) -> bool {
        self.keys.lock().contains(key)
    }

    /// Number of dirty keys
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether nothing is dirty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for DirtySet<K> {
    fn default() -> Self {
        Self::new()
    }
}
