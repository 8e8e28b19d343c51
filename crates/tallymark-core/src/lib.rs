//! # Tallymark Core
//!
//! Entity tagging engine. For every namespace and bitmap it tracks which
//! entities currently hold each event count, backed by an epoch-reclaimed
//! bitmap cache that a background scheduler flushes to the store.

#![warn(missing_docs)]

/// Configuration, logging and engine construction
pub mod core;

/// Type definitions shared across the engine
pub mod types;

/// Key to queue and consumer routing
pub mod routing;

/// Backing store abstraction and backends
pub mod storage;

/// Concurrent in-memory structures
pub mod structures;

/// Bucketed count index
pub mod index;

/// Background flush and reclamation
pub mod maintenance;

/// Request facade and partition consumers
pub mod engine;

/// Response rendering
pub mod translator;

// Re-export commonly used items
pub use crate::core::{open_engine, ConfiguredEngine, EngineConfig, StorageConfig, StorageType};
pub use engine::{Engine, EngineStats};
pub use storage::{KvStore, LmdbStore, MemStore};
pub use types::{BitmapKey, Error, IntId, Payload, Response, ResponseKind, Result};
