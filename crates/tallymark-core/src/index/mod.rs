//! Bucketed count index
//!
//! For every bitmap the index keeps one event counter per entity and one
//! bucket per distinct count. An entity with count `n` is a member of bucket
//! `n` and of no other bucket of that bitmap. Adds move the entity from
//! bucket `n` to bucket `n + 1` through the bitmap cache; the maintenance
//! scheduler later writes dirty buckets and counters back to the store.

/// Entity id mapping
pub mod ids;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringBitmap;

use crate::storage::keys::{bitmap_prefix, bucket_count, bucket_key, counter_key, decode_bitmap, decode_u64, encode_bitmap, encode_u64};
use crate::storage::{KvStore, StorageResult, Table};
use crate::structures::{BitmapCache, CounterCache, SnapshotDomain, SnapshotGuard, SnapshotRef};
use crate::types::error::invariant_violation;
use crate::types::{BitmapKey, BucketKey, CounterKey, Error, IntId, Result};

pub use ids::IdMap;

/// Dirty state collected for one flush
#[derive(Default)]
pub struct FlushBatch {
    buckets: Vec<(BucketKey, SnapshotRef)>,
    counters: Vec<(CounterKey, u64)>,
}

impl FlushBatch {
    /// Rows the batch will write or delete
    pub fn len(&self) -> usize {
        self.buckets.len() + self.counters.len()
    }

    /// Whether there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The count index over a store
pub struct CountIndex<S: KvStore> {
    store: Arc<S>,
    ids: IdMap<S>,
    buckets: BitmapCache,
    counters: CounterCache,
    domain: Arc<SnapshotDomain>,
    /// Held shared across one add's publishes, exclusively while a flush
    /// takes the dirty sets
    commit: RwLock<()>,
}

impl<S: KvStore> CountIndex<S> {
    /// Create an index over `store` with its own reclamation domain
    pub fn new(store: Arc<S>) -> Self {
        let domain = SnapshotDomain::new();
        Self {
            ids: IdMap::new(Arc::clone(&store)),
            buckets: BitmapCache::new(Arc::clone(&domain)),
            counters: CounterCache::new(),
            store,
            domain,
            commit: RwLock::new(()),
        }
    }

    /// Reclamation domain readers must register with
    pub fn domain(&self) -> &Arc<SnapshotDomain> {
        &self.domain
    }

    /// Entity id mapping
    pub fn ids(&self) -> &IdMap<S> {
        &self.ids
    }

    /// Record one event for `entity` in `bitmap`; returns the new count.
    ///
    /// Everything that can fail (id allocation, counter and bucket loads)
    /// happens before the first publish, so an error leaves the cache
    /// untouched.
    pub fn add(&self, guard: &SnapshotGuard<'_>, bitmap: &BitmapKey, entity: &str) -> Result<u64> {
        let id = self.ids.resolve_or_create(entity)?;
        let ckey = bitmap.counter(id);
        let old_count = self.counters.get_or_load(&ckey, || self.load_counter(&ckey))?;
        let new_count = old_count
            .checked_add(1)
            .ok_or_else(|| Error::invariant(format!("event counter overflow for {entity} in {bitmap}")))?;

        let old_bucket = bitmap.bucket(old_count);
        let new_bucket = bitmap.bucket(new_count);
        if old_count > 0 {
            self.buckets.get_or_load(guard, &old_bucket, || self.load_bucket(&old_bucket))?;
        }
        self.buckets.get_or_load(guard, &new_bucket, || self.load_bucket(&new_bucket))?;

        // Both buckets are cached now, so the publishes below cannot miss.
        let _commit = self.commit.read();
        if old_count > 0 {
            self.buckets
                .update(guard, &old_bucket, |bm| {
                    bm.remove(id.get());
                })
                .inspect_err(|e| invariant_violation(&e.to_string()))?;
        }
        self.buckets
            .update(guard, &new_bucket, |bm| {
                bm.insert(id.get());
            })
            .inspect_err(|e| invariant_violation(&e.to_string()))?;
        self.counters.set(ckey, new_count);

        crate::log_trace!(%bitmap, entity, old_count, new_count, "add");
        Ok(new_count)
    }

    /// Members of the bucket at `count`, ascending. Absent buckets are empty.
    pub fn members(&self, guard: &SnapshotGuard<'_>, bitmap: &BitmapKey, count: u64) -> Result<Vec<u32>> {
        let key = bitmap.bucket(count);
        let snapshot = self.buckets.get_or_load(guard, &key, || self.load_bucket(&key))?;
        Ok(snapshot.bitmap.iter().collect())
    }

    /// Entity ids of the bucket at `count`
    pub fn entities(&self, guard: &SnapshotGuard<'_>, bitmap: &BitmapKey, count: u64) -> Result<Vec<String>> {
        self.members(guard, bitmap, count)?
            .into_iter()
            .map(|raw| {
                self.ids
                    .reverse(IntId(raw))?
                    .ok_or_else(|| Error::not_found(format!("no entity mapped to integer id {raw}")))
            })
            .collect()
    }

    /// Current count of `entity` in `bitmap`; 0 if never seen
    pub fn count(&self, bitmap: &BitmapKey, entity: &str) -> Result<u64> {
        match self.ids.lookup(entity)? {
            Some(id) => {
                let ckey = bitmap.counter(id);
                self.counters.get_or_load(&ckey, || self.load_counter(&ckey))
            }
            None => Ok(0),
        }
    }

    /// Counts with at least one member, ascending
    pub fn counts(&self, guard: &SnapshotGuard<'_>, bitmap: &BitmapKey) -> Result<Vec<u64>> {
        debug_assert!(guard.belongs_to(&self.domain));
        let prefix = bitmap_prefix(bitmap);
        let mut present = BTreeMap::new();
        for (key, _) in self.store.scan_prefix(Table::Bitmaps, &prefix)? {
            present.insert(bucket_count(prefix.len(), &key)?, true);
        }
        // Cached snapshots are at least as new as the stored rows.
        for (count, snapshot) in self.buckets.cached_counts(bitmap) {
            present.insert(count, !snapshot.bitmap.is_empty());
        }
        Ok(present.into_iter().filter_map(|(count, live)| live.then_some(count)).collect())
    }

    /// Take all dirty buckets and counters.
    ///
    /// No add is between its bucket publishes and its counter update while
    /// the sets are taken, so a batch never splits one add.
    pub fn collect_dirty(&self) -> FlushBatch {
        let _commit = self.commit.write();
        FlushBatch { buckets: self.buckets.take_dirty(), counters: self.counters.take_dirty() }
    }

    /// Write a batch in one transaction; returns rows written or deleted.
    ///
    /// Empty buckets are deleted rather than stored.
    pub fn write_batch(&self, batch: &FlushBatch) -> StorageResult<usize> {
        let mut rows: Vec<(Table, Vec<u8>, Option<Vec<u8>>)> = Vec::with_capacity(batch.len());
        for (key, snapshot) in &batch.buckets {
            let value = if snapshot.bitmap.is_empty() { None } else { Some(encode_bitmap(&snapshot.bitmap)?) };
            rows.push((Table::Bitmaps, bucket_key(key), value));
        }
        for (key, value) in &batch.counters {
            rows.push((Table::EventCounters, counter_key(key), Some(encode_u64(*value).to_vec())));
        }

        self.store.transact(|txn| {
            for (table, key, value) in &rows {
                match value {
                    Some(v) => txn.put(*table, key, v)?,
                    None => {
                        txn.delete(*table, key)?;
                    }
                }
            }
            Ok(rows.len())
        })
    }

    /// Mark a batch's keys dirty again after it failed to write
    pub fn requeue(&self, batch: FlushBatch) {
        self.buckets.requeue_dirty(batch.buckets.into_iter().map(|(k, _)| k));
        self.counters.requeue_dirty(batch.counters.into_iter().map(|(k, _)| k));
    }

    /// Dirty buckets plus dirty counters
    pub fn dirty_len(&self) -> usize {
        self.buckets.dirty_len() + self.counters.dirty_len()
    }

    /// Bucket cache
    pub fn bucket_cache(&self) -> &BitmapCache {
        &self.buckets
    }

    /// Counter cache
    pub fn counter_cache(&self) -> &CounterCache {
        &self.counters
    }

    fn load_counter(&self, key: &CounterKey) -> Result<u64> {
        match self.store.get(Table::EventCounters, &counter_key(key))? {
            Some(raw) => Ok(decode_u64(&raw)?),
            None => Ok(0),
        }
    }

    fn load_bucket(&self, key: &BucketKey) -> Result<RoaringBitmap> {
        match self.store.get(Table::Bitmaps, &bucket_key(key))? {
            Some(raw) => Ok(decode_bitmap(&raw)?),
            None => Ok(RoaringBitmap::new()),
        }
    }
}
