//! Engine factory
//!
//! Opens the configured backing store and builds an [`Engine`] over it. The
//! engine is generic over its store, so the factory hands back an enum with
//! one variant per backend.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::EngineConfig;
use crate::engine::{Engine, EngineStats};
use crate::storage::{LmdbOptions, LmdbStore, MemStore};
use crate::types::{Response, Result};

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Durable LMDB environment
    #[default]
    Lmdb,
    /// Process-local memory, lost on exit
    Memory,
}

impl std::str::FromStr for StorageType {
    type Err = crate::types::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lmdb" => Ok(StorageType::Lmdb),
            "memory" | "mem" => Ok(StorageType::Memory),
            other => Err(crate::types::Error::config(format!("unknown storage type: {other}"))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to open
    pub storage_type: StorageType,

    /// Directory of the LMDB environment
    pub data_dir: PathBuf,

    /// LMDB map size in bytes
    pub map_size: usize,

    /// LMDB reader slots
    pub max_readers: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let lmdb = LmdbOptions::default();
        Self {
            storage_type: StorageType::Lmdb,
            data_dir: PathBuf::from("./data"),
            map_size: lmdb.map_size,
            max_readers: lmdb.max_readers,
        }
    }
}

impl StorageConfig {
    fn lmdb_options(&self) -> LmdbOptions {
        LmdbOptions { map_size: self.map_size, max_readers: self.max_readers }
    }
}

/// An engine over whichever backend was configured
pub enum ConfiguredEngine {
    /// Engine over LMDB
    Lmdb(Engine<LmdbStore>),
    /// Engine over the in-memory store
    Memory(Engine<MemStore>),
}

/// Forward a call to the engine inside either variant
macro_rules! with_engine {
    ($self:expr, $engine:ident => $body:expr) => {
        match $self {
            ConfiguredEngine::Lmdb($engine) => $body,
            ConfiguredEngine::Memory($engine) => $body,
        }
    };
}

impl ConfiguredEngine {
    /// Backend in use
    pub fn storage_type(&self) -> StorageType {
        match self {
            ConfiguredEngine::Lmdb(_) => StorageType::Lmdb,
            ConfiguredEngine::Memory(_) => StorageType::Memory,
        }
    }

    /// See [`Engine::add`]
    pub fn add(&self, namespace: &str, bitmap: &str, entity_id: &str) -> Response {
        with_engine!(self, e => e.add(namespace, bitmap, entity_id))
    }

    /// See [`Engine::members`]
    pub fn members(&self, namespace: &str, bitmap: &str, count: u64) -> Response {
        with_engine!(self, e => e.members(namespace, bitmap, count))
    }

    /// See [`Engine::count`]
    pub fn count(&self, namespace: &str, bitmap: &str, entity_id: &str) -> Response {
        with_engine!(self, e => e.count(namespace, bitmap, entity_id))
    }

    /// See [`Engine::entities`]
    pub fn entities(&self, namespace: &str, bitmap: &str, count: u64) -> Result<Vec<String>> {
        with_engine!(self, e => e.entities(namespace, bitmap, count))
    }

    /// See [`Engine::counts`]
    pub fn counts(&self, namespace: &str, bitmap: &str) -> Result<Vec<u64>> {
        with_engine!(self, e => e.counts(namespace, bitmap))
    }

    /// See [`Engine::flush`]
    pub fn flush(&self) -> Result<usize> {
        with_engine!(self, e => e.flush())
    }

    /// See [`Engine::stats`]
    pub fn stats(&self) -> EngineStats {
        with_engine!(self, e => e.stats())
    }

    /// See [`Engine::config`]
    pub fn config(&self) -> &EngineConfig {
        with_engine!(self, e => e.config())
    }

    /// See [`Engine::shutdown`]
    pub fn shutdown(&self) -> Result<()> {
        with_engine!(self, e => e.shutdown())
    }
}

/// Open the configured store and start an engine over it
pub fn open_engine(storage: &StorageConfig, config: EngineConfig) -> Result<ConfiguredEngine> {
    crate::log_info!(storage_type = ?storage.storage_type, "opening engine");

    match storage.storage_type {
        StorageType::Lmdb => {
            let store = LmdbStore::open(&storage.data_dir, storage.lmdb_options())?;
            let engine = Engine::open(config, Arc::new(store))?;
            Ok(ConfiguredEngine::Lmdb(engine))
        }
        StorageType::Memory => {
            let engine = Engine::open(config, Arc::new(MemStore::new()))?;
            Ok(ConfiguredEngine::Memory(engine))
        }
    }
}
