//! Concurrent in-memory structures backing the index

/// Epoch-based reclamation domain
pub mod epoch;

/// Bucket bitmap cache
pub mod bitmap_cache;

/// Event counter cache
pub mod counter_cache;

/// Dirty key tracking
pub mod dirty;

pub use bitmap_cache::{BitmapCache, BucketSnapshot, CacheStatsSnapshot, SnapshotDomain, SnapshotGuard, SnapshotRef};
pub use counter_cache::CounterCache;
pub use epoch::{DomainSnapshot, Guard, Participant, ReclamationDomain};
