//! Engine facade
//!
//! Validates requests, routes each one to the partition consumer that owns
//! it and wraps results into [`Response`] values for the translator. The
//! engine owns the index, the maintenance scheduler and the consumer pool;
//! [`Engine::shutdown`] stops them in that dependency order.

mod partition;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::index::CountIndex;
use crate::maintenance::{MaintenanceScheduler, MaintenanceSnapshot};
use crate::routing::Topology;
use crate::storage::KvStore;
use crate::structures::{CacheStatsSnapshot, DomainSnapshot};
use crate::types::{BitmapKey, Error, Response, Result, ValidationError};

use partition::PartitionPool;

/// Request counters kept by the facade
#[derive(Debug, Default)]
struct RequestCounters {
    adds: AtomicU64,
    adds_failed: AtomicU64,
    queries: AtomicU64,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Flush and reclamation counters
    pub maintenance: MaintenanceSnapshot,
    /// Reclamation domain state
    pub epoch: DomainSnapshot,
    /// Bucket cache counters
    pub cache: CacheStatsSnapshot,
    /// Buckets awaiting flush
    pub dirty_buckets: usize,
    /// Event counters awaiting flush
    pub dirty_counters: usize,
    /// Buckets held in memory
    pub cached_buckets: usize,
    /// Event counters held in memory
    pub cached_counters: usize,
    /// Successful adds
    pub adds: u64,
    /// Rejected or failed adds
    pub adds_failed: u64,
    /// Read requests served
    pub queries: u64,
    /// Consumer threads
    pub consumers: u32,
    /// Operation queues
    pub total_queues: u32,
    /// Whether the engine still accepts requests
    pub running: bool,
}

/// The tagging engine over one store
pub struct Engine<S: KvStore> {
    config: EngineConfig,
    index: Arc<CountIndex<S>>,
    scheduler: Arc<MaintenanceScheduler<S>>,
    pool: PartitionPool<S>,
    counters: RequestCounters,
    stopped: AtomicBool,
    closing: Mutex<()>,
}

impl<S: KvStore> Engine<S> {
    /// Validate `config`, then start maintenance and the partition consumers
    pub fn open(config: EngineConfig, store: Arc<S>) -> Result<Self> {
        config.validate()?;
        let topology = Topology::new(config.routing.total_queues, config.routing.queues_per_consumer)?;

        let index = Arc::new(CountIndex::new(store));
        let scheduler = MaintenanceScheduler::new(Arc::clone(&index), config.maintenance.clone());
        scheduler.start()?;

        let pool = match PartitionPool::start(Arc::clone(&index), topology, config.routing.queue_capacity) {
            Ok(pool) => pool,
            Err(e) => {
                if let Err(stop_err) = scheduler.stop() {
                    crate::log_error!(error = %stop_err, "failed to stop maintenance after startup error");
                }
                return Err(e);
            }
        };

        crate::log_info!(
            consumers = topology.consumers(),
            max_field_length = config.limits.max_field_length,
            "engine opened"
        );
        Ok(Self {
            config,
            index,
            scheduler,
            pool,
            counters: RequestCounters::default(),
            stopped: AtomicBool::new(false),
            closing: Mutex::new(()),
        })
    }

    /// Record one event for `entity_id`; the response carries the new count
    pub fn add(&self, namespace: &str, bitmap: &str, entity_id: &str) -> Response {
        self.try_add(namespace, bitmap, entity_id).into()
    }

    /// [`Engine::add`] with a typed result
    pub fn try_add(&self, namespace: &str, bitmap: &str, entity_id: &str) -> Result<u64> {
        let result = self.add_inner(namespace, bitmap, entity_id);
        match &result {
            Ok(_) => self.counters.adds.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.counters.adds_failed.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    fn add_inner(&self, namespace: &str, bitmap: &str, entity_id: &str) -> Result<u64> {
        let key = self.bitmap_key(namespace, bitmap)?;
        self.check_field("entity_id", entity_id)?;

        let entity = entity_id.to_owned();
        let scheduler = Arc::clone(&self.scheduler);
        self.pool.dispatch(entity_id, move |index, guard| {
            let count = index.add(guard, &key, &entity)?;
            scheduler.notify_dirty(index.dirty_len());
            Ok(count)
        })
    }

    /// Integer ids holding exactly `count` events
    pub fn members(&self, namespace: &str, bitmap: &str, count: u64) -> Response {
        self.try_members(namespace, bitmap, count).into()
    }

    /// [`Engine::members`] with a typed result
    pub fn try_members(&self, namespace: &str, bitmap: &str, count: u64) -> Result<Vec<u32>> {
        let key = self.bitmap_key(namespace, bitmap)?;
        self.query(&key.to_string(), move |index, guard| index.members(guard, &key, count))
    }

    /// Current count of `entity_id`, 0 if it was never seen
    pub fn count(&self, namespace: &str, bitmap: &str, entity_id: &str) -> Response {
        self.try_count(namespace, bitmap, entity_id).into()
    }

    /// [`Engine::count`] with a typed result
    pub fn try_count(&self, namespace: &str, bitmap: &str, entity_id: &str) -> Result<u64> {
        let key = self.bitmap_key(namespace, bitmap)?;
        self.check_field("entity_id", entity_id)?;
        let entity = entity_id.to_owned();
        self.query(entity_id, move |index, _| index.count(&key, &entity))
    }

    /// Entity id strings holding exactly `count` events
    pub fn entities(&self, namespace: &str, bitmap: &str, count: u64) -> Result<Vec<String>> {
        let key = self.bitmap_key(namespace, bitmap)?;
        self.query(&key.to_string(), move |index, guard| index.entities(guard, &key, count))
    }

    /// Counts that currently have at least one member, ascending
    pub fn counts(&self, namespace: &str, bitmap: &str) -> Result<Vec<u64>> {
        let key = self.bitmap_key(namespace, bitmap)?;
        self.query(&key.to_string(), move |index, guard| index.counts(guard, &key))
    }

    /// Flush dirty state now; returns rows written
    pub fn flush(&self) -> Result<usize> {
        self.scheduler.force_flush()
    }

    /// Current statistics
    pub fn stats(&self) -> EngineStats {
        let buckets = self.index.bucket_cache();
        let counters = self.index.counter_cache();
        let topology = self.pool.topology();
        EngineStats {
            maintenance: self.scheduler.stats(),
            epoch: self.index.domain().snapshot(),
            cache: buckets.stats(),
            dirty_buckets: buckets.dirty_len(),
            dirty_counters: counters.dirty_len(),
            cached_buckets: buckets.len(),
            cached_counters: counters.len(),
            adds: self.counters.adds.load(Ordering::Relaxed),
            adds_failed: self.counters.adds_failed.load(Ordering::Relaxed),
            queries: self.counters.queries.load(Ordering::Relaxed),
            consumers: topology.consumers(),
            total_queues: topology.total_queues(),
            running: self.pool.is_running(),
        }
    }

    /// Effective configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying index
    pub fn index(&self) -> &Arc<CountIndex<S>> {
        &self.index
    }

    /// Stop accepting work, drain the queues, stop maintenance and flush.
    ///
    /// Later calls return once the first has finished and do nothing else.
    /// Requests made afterwards fail with [`Error::Shutdown`].
    pub fn shutdown(&self) -> Result<()> {
        let _closing = self.closing.lock();
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.pool.shutdown();
        self.scheduler.stop()?;
        crate::log_info!("engine shut down");
        Ok(())
    }

    fn query<R, F>(&self, route_key: &str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&CountIndex<S>, &crate::structures::SnapshotGuard<'_>) -> Result<R> + Send + 'static,
    {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        self.pool.dispatch(route_key, f)
    }

    fn bitmap_key(&self, namespace: &str, bitmap: &str) -> Result<BitmapKey> {
        self.check_field("namespace", namespace)?;
        self.check_field("bitmap", bitmap)?;
        Ok(BitmapKey::new(namespace, bitmap))
    }

    fn check_field(&self, field: &'static str, value: &str) -> Result<()> {
        validate_field(field, value, self.config.limits.max_field_length).map_err(Error::from)
    }
}

impl<S: KvStore> Drop for Engine<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            crate::log_error!(error = %e, "engine shutdown on drop failed");
        }
    }
}

/// Check that `value` is present and at most `max` bytes long
pub fn validate_field(field: &'static str, value: &str, max: usize) -> std::result::Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong { field, len: value.len(), max });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
