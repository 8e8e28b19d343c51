//! Cache of per-entity event counters

use dashmap::DashMap;

use crate::structures::dirty::DirtySet;
use crate::types::{CounterKey, Result};

/// Event counters keyed by (bitmap, id), with dirty tracking for flushes.
///
/// Each counter is only ever written by the consumer that owns its entity,
/// so plain inserts are enough.
pub struct CounterCache {
    values: DashMap<CounterKey, u64>,
    dirty: DirtySet<CounterKey>,
}

impl CounterCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self { values: DashMap::new(), dirty: DirtySet::new() }
    }

    /// Cached counter, loading it with `load` on a miss
    pub fn get_or_load<F>(&self, key: &CounterKey, load: F) -> Result<u64>
    where
        F: FnOnce() -> Result<u64>,
    {
        if let Some(value) = self.values.get(key) {
            return Ok(*value);
        }
        let loaded = load()?;
        Ok(*self.values.entry(key.clone()).or_insert(loaded))
    }

    /// Cached counter without touching the store
    pub fn get(&self, key: &CounterKey) -> Option<u64> {
        self.values.get(key).map(|v| *v)
    }

    /// Set a counter and mark it dirty; returns the dirty count
    pub fn set(&self, key: CounterKey, value: u64) -> usize {
        self.values.insert(key.clone(), value);
        self.dirty.mark(key)
    }

    /// Take the dirty counters with their current values
    pub fn take_dirty(&self) -> Vec<(CounterKey, u64)> {
        self.dirty
            .take()
            .into_iter()
            .filter_map(|key| {
                let value = self.get(&key)?;
                Some((key, value))
            })
            .collect()
    }

    /// Mark counters dirty again after a failed flush
    pub fn requeue_dirty(&self, keys: impl IntoIterator<Item = CounterKey>) {
        self.dirty.requeue(keys);
    }

    /// Number of dirty counters
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Number of cached counters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for CounterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BitmapKey, IntId};

    #[test]
    fn load_once_then_serve_from_memory() {
        let cache = CounterCache::new();
        let key = BitmapKey::new("ns", "b").counter(IntId(1));
        assert_eq!(cache.get_or_load(&key, || Ok(4)).unwrap(), 4);
        assert_eq!(cache.get_or_load(&key, || panic!("must not reload")).unwrap(), 4);
        assert_eq!(cache.dirty_len(), 0);
    }

    #[test]
    fn set_marks_dirty_and_take_returns_latest() {
        let cache = CounterCache::new();
        let key = BitmapKey::new("ns", "b").counter(IntId(2));
        cache.set(key.clone(), 1);
        cache.set(key.clone(), 2);
        assert_eq!(cache.take_dirty(), vec![(key, 2)]);
        assert_eq!(cache.dirty_len(), 0);
    }
}
