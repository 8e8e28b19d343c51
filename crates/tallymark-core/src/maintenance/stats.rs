//! Maintenance counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the maintenance scheduler
#[derive(Debug, Default)]
pub struct MaintenanceStats {
    entries_written: AtomicU64,
    flush_cycles: AtomicU64,
    flush_failures: AtomicU64,
    reclaim_cycles: AtomicU64,
    objects_reclaimed: AtomicU64,
}

/// Point-in-time copy of [`MaintenanceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceSnapshot {
    /// Rows written or deleted by successful flushes
    pub entries_written: u64,
    /// Completed scheduler ticks
    pub flush_cycles: u64,
    /// Flushes that gave up after every retry
    pub flush_failures: u64,
    /// Reclamation passes
    pub reclaim_cycles: u64,
    /// Retired snapshots released
    pub objects_reclaimed: u64,
}

impl MaintenanceStats {
    #[inline]
    pub(crate) fn record_written(&self, rows: usize) {
        self.entries_written.fetch_add(rows as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cycle(&self) -> u64 {
        self.flush_cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub(crate) fn record_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_reclaim(&self, objects: usize) {
        self.reclaim_cycles.fetch_add(1, Ordering::Relaxed);
        self.objects_reclaimed.fetch_add(objects as u64, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> MaintenanceSnapshot {
        MaintenanceSnapshot {
            entries_written: self.entries_written.load(Ordering::Relaxed),
            flush_cycles: self.flush_cycles.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            reclaim_cycles: self.reclaim_cycles.load(Ordering::Relaxed),
            objects_reclaimed: self.objects_reclaimed.load(Ordering::Relaxed),
        }
    }
}
