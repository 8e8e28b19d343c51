//! Prometheus metrics for the tallymark engine
//!
//! The engine keeps its own atomic counters. A sampler copies
//! [`EngineStats`] into the registry on an interval and before every scrape.

use crate::core::Result;
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge, Registry,
};
use tallymark_core::EngineStats;

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Global metrics instance, created by [`init_registry`]
static INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Request counters
pub struct OperationMetrics {
    /// Successful adds
    pub adds_total: IntCounter,
    /// Rejected or failed adds
    pub adds_failed_total: IntCounter,
    /// Read requests
    pub queries_total: IntCounter,
}

/// Maintenance and cache gauges
pub struct MaintenanceMetrics {
    /// Rows written by flushes
    pub entries_written: IntGauge,
    /// Scheduler ticks
    pub flush_cycles: IntGauge,
    /// Flushes that exhausted their retries
    pub flush_failures: IntGauge,
    /// Reclamation passes
    pub reclaim_cycles: IntGauge,
    /// Snapshots released by reclamation
    pub objects_reclaimed: IntGauge,
    /// Buckets awaiting flush
    pub dirty_buckets: IntGauge,
    /// Retired snapshots not yet released
    pub retired_pending: IntGauge,
    /// Current reclamation epoch
    pub global_epoch: IntGauge,
}

/// Centralized metrics collection
pub struct Metrics {
    /// Request counters
    pub operations: OperationMetrics,
    /// Maintenance gauges
    pub maintenance: MaintenanceMetrics,
}

impl Metrics {
    /// Register every metric in `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            operations: OperationMetrics::new(registry)?,
            maintenance: MaintenanceMetrics::new(registry)?,
        })
    }

    /// The global metrics instance, if [`init_registry`] has run
    pub fn global() -> Option<&'static Metrics> {
        INSTANCE.get()
    }

    /// Copy engine statistics into the registered metrics
    pub fn observe(&self, stats: &EngineStats) {
        advance(&self.operations.adds_total, stats.adds);
        advance(&self.operations.adds_failed_total, stats.adds_failed);
        advance(&self.operations.queries_total, stats.queries);

        let m = &self.maintenance;
        m.entries_written.set(clamp(stats.maintenance.entries_written));
        m.flush_cycles.set(clamp(stats.maintenance.flush_cycles));
        m.flush_failures.set(clamp(stats.maintenance.flush_failures));
        m.reclaim_cycles.set(clamp(stats.maintenance.reclaim_cycles));
        m.objects_reclaimed.set(clamp(stats.maintenance.objects_reclaimed));
        m.dirty_buckets.set(clamp(stats.dirty_buckets as u64));
        m.retired_pending.set(clamp(stats.epoch.pending as u64));
        m.global_epoch.set(clamp(stats.epoch.global_epoch));
    }
}

impl OperationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            adds_total: register_int_counter_with_registry!(
                "tm_adds_total",
                "Total number of successful adds",
                registry
            )?,
            adds_failed_total: register_int_counter_with_registry!(
                "tm_adds_failed_total",
                "Total number of rejected or failed adds",
                registry
            )?,
            queries_total: register_int_counter_with_registry!(
                "tm_queries_total",
                "Total number of read requests",
                registry
            )?,
        })
    }
}

impl MaintenanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            entries_written: register_int_gauge_with_registry!(
                "tm_entries_written",
                "Rows written or deleted by flushes",
                registry
            )?,
            flush_cycles: register_int_gauge_with_registry!(
                "tm_flush_cycles",
                "Completed maintenance ticks",
                registry
            )?,
            flush_failures: register_int_gauge_with_registry!(
                "tm_flush_failures",
                "Flushes that gave up after every retry",
                registry
            )?,
            reclaim_cycles: register_int_gauge_with_registry!(
                "tm_reclaim_cycles",
                "Epoch reclamation passes",
                registry
            )?,
            objects_reclaimed: register_int_gauge_with_registry!(
                "tm_objects_reclaimed",
                "Retired snapshots released",
                registry
            )?,
            dirty_buckets: register_int_gauge_with_registry!(
                "tm_dirty_buckets",
                "Buckets awaiting flush",
                registry
            )?,
            retired_pending: register_int_gauge_with_registry!(
                "tm_retired_pending",
                "Retired snapshots not yet released",
                registry
            )?,
            global_epoch: register_int_gauge_with_registry!(
                "tm_global_epoch",
                "Current reclamation epoch",
                registry
            )?,
        })
    }
}

/// Raise a monotonic counter to `total`
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Create the global metrics instance; later calls return the same one
pub fn init_registry() -> Result<&'static Metrics> {
    INSTANCE.get_or_try_init(|| Metrics::new(&REGISTRY))
}

/// Get the Prometheus registry for serving metrics
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Encode every metric in `registry` in the Prometheus text format
pub fn encode(registry: &Registry) -> Result<String> {
    let encoder = prometheus::TextEncoder::new();
    Ok(encoder.encode_to_string(&registry.gather())?)
}

/// Collect and return all global metrics as a Prometheus-formatted string
pub fn collect_metrics() -> Result<String> {
    encode(registry())
}
