//! Concurrent cache of count bucket bitmaps
//!
//! Each bucket lives in an `ArcSwap` slot holding an immutable
//! [`BucketSnapshot`]. Updates clone the bitmap, apply an edit and publish
//! the result with a compare-and-swap, retrying if another consumer won the
//! race. The superseded snapshot is retired to the engine's reclamation
//! domain rather than dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use roaring::RoaringBitmap;
use serde::Serialize;

use crate::structures::dirty::DirtySet;
use crate::structures::epoch::{Guard, ReclamationDomain};
use crate::types::{BucketKey, Error, Result};

/// Immutable published copy of one bucket
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSnapshot {
    /// Member ids
    pub bitmap: RoaringBitmap,
    /// Publish counter for this bucket, starting at 0 for a loaded value
    pub version: u64,
    /// Global epoch at publish time
    pub epoch: u64,
}

/// Shared handle to a published snapshot
pub type SnapshotRef = Arc<BucketSnapshot>;

/// Reclamation domain for superseded snapshots
pub type SnapshotDomain = ReclamationDomain<SnapshotRef>;

/// Pin guard over [`SnapshotDomain`]
pub type SnapshotGuard<'a> = Guard<'a, SnapshotRef>;

/// Cache activity counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    publishes: AtomicU64,
    cas_retries: AtomicU64,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups served from memory
    pub hits: u64,
    /// Lookups that needed the store
    pub misses: u64,
    /// Successful publishes
    pub publishes: u64,
    /// Lost compare-and-swap races
    pub cas_retries: u64,
}

/// Bucket bitmap cache
pub struct BitmapCache {
    slots: DashMap<BucketKey, Arc<ArcSwap<BucketSnapshot>>>,
    dirty: DirtySet<BucketKey>,
    domain: Arc<SnapshotDomain>,
    stats: CacheStats,
}

impl BitmapCache {
    /// Create an empty cache retiring into `domain`
    pub fn new(domain: Arc<SnapshotDomain>) -> Self {
        Self {
            slots: DashMap::new(),
            dirty: DirtySet::new(),
            domain,
            stats: CacheStats::default(),
        }
    }

    /// Current snapshot of `key`, if cached
    pub fn get(&self, guard: &SnapshotGuard<'_>, key: &BucketKey) -> Option<SnapshotRef> {
        debug_assert!(guard.belongs_to(&self.domain));
        match self.slots.get(key) {
            Some(slot) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(slot.load_full())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Current snapshot of `key`, loading it with `load` on a miss.
    ///
    /// A loaded bucket is clean. If another thread cached the bucket first,
    /// its snapshot wins and `load`'s result is discarded.
    pub fn get_or_load<F>(&self, guard: &SnapshotGuard<'_>, key: &BucketKey, load: F) -> Result<SnapshotRef>
    where
        F: FnOnce() -> Result<RoaringBitmap>,
    {
        if let Some(snapshot) = self.get(guard, key) {
            return Ok(snapshot);
        }
        let bitmap = load()?;
        let loaded = Arc::new(BucketSnapshot { bitmap, version: 0, epoch: self.domain.epoch() });
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ArcSwap::new(loaded)))
            .value()
            .clone();
        Ok(slot.load_full())
    }

    /// Apply `edit` to the bucket and publish the result.
    ///
    /// The bucket must already be cached. `edit` may run more than once when
    /// publishes race. Returns the newly published snapshot.
    pub fn update<F>(&self, guard: &SnapshotGuard<'_>, key: &BucketKey, mut edit: F) -> Result<SnapshotRef>
    where
        F: FnMut(&mut RoaringBitmap),
    {
        debug_assert!(guard.belongs_to(&self.domain));
        let slot = match self.slots.get(key) {
            Some(slot) => Arc::clone(slot.value()),
            None => {
                return Err(Error::invariant(format!(
                    "bucket {}#{} updated before it was cached",
                    key.bitmap, key.count
                )))
            }
        };

        loop {
            let current = slot.load_full();
            let mut bitmap = current.bitmap.clone();
            edit(&mut bitmap);
            let next = Arc::new(BucketSnapshot {
                bitmap,
                version: current.version + 1,
                epoch: self.domain.epoch(),
            });
            let previous = slot.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                drop(previous);
                self.domain.retire(current);
                self.dirty.mark(key.clone());
                self.stats.publishes.fetch_add(1, Ordering::Relaxed);
                crate::log_trace!(bucket = %key.bitmap, count = key.count, version = next.version, "published bucket");
                return Ok(next);
            }
            self.stats.cas_retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the dirty buckets with their current snapshots
    pub fn take_dirty(&self) -> Vec<(BucketKey, SnapshotRef)> {
        self.dirty
            .take()
            .into_iter()
            .filter_map(|key| {
                let snapshot = self.slots.get(&key).map(|slot| slot.load_full())?;
                Some((key, snapshot))
            })
            .collect()
    }

    /// Mark buckets dirty again after a failed flush
    pub fn requeue_dirty(&self, keys: impl IntoIterator<Item = BucketKey>) {
        self.dirty.requeue(keys);
    }

    /// Number of dirty buckets
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Whether `key` has unflushed changes
    pub fn is_dirty(&self, key: &BucketKey) -> bool {
        self.dirty.contains(key)
    }

    /// Number of cached buckets
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Counts of every cached bucket belonging to `bitmap`
    pub fn cached_counts(&self, bitmap: &crate::types::BitmapKey) -> Vec<(u64, SnapshotRef)> {
        self.slots
            .iter()
            .filter(|entry| &entry.key().bitmap == bitmap)
            .map(|entry| (entry.key().count, entry.value().load_full()))
            .collect()
    }

    /// Cache counters
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            publishes: self.stats.publishes.load(Ordering::Relaxed),
            cas_retries: self.stats.cas_retries.load(Ordering::Relaxed),
        }
    }
}
