//! Storage layer
//!
//! The engine treats the backing store as a set of named byte-keyed tables
//! with atomic multi-row write transactions. [`LmdbStore`] is the durable
//! backend; [`MemStore`] keeps the same contract in memory.

/// Row key and value encodings
pub mod keys;

/// LMDB backend
pub mod lmdb;

/// In-memory backend
pub mod mem;

pub use lmdb::{LmdbOptions, LmdbStore};
pub use mem::MemStore;

use crate::types::StorageError;

/// Result alias for storage calls
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Named tables of the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Entity id string to integer id
    IdToInt,
    /// Integer id to entity id string
    IntToId,
    /// Engine metadata such as the id allocator
    Metadata,
    /// Per (bitmap, id) event counts
    EventCounters,
    /// Serialized count buckets
    Bitmaps,
}

impl Table {
    /// Every table, in creation order
    pub const ALL: [Table; 5] = [
        Table::IdToInt,
        Table::IntToId,
        Table::Metadata,
        Table::EventCounters,
        Table::Bitmaps,
    ];

    /// Table name inside the store
    pub fn name(self) -> &'static str {
        match self {
            Table::IdToInt => "id_to_int",
            Table::IntToId => "int_to_id",
            Table::Metadata => "metadata",
            Table::EventCounters => "event_counters",
            Table::Bitmaps => "bitmaps",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Operations available inside a write transaction
pub trait WriteTxn {
    /// Read a row, observing this transaction's own writes
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Insert or overwrite a row
    fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Remove a row, returning whether it existed
    fn delete(&mut self, table: Table, key: &[u8]) -> StorageResult<bool>;
}

/// Transactional byte-keyed store
///
/// `transact` commits everything the closure wrote if it returns `Ok`, and
/// nothing if it returns `Err` or the commit itself fails.
pub trait KvStore: Send + Sync + 'static {
    /// Read a single row
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// All rows whose key starts with `prefix`, in key order
    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Run `f` inside one atomic write transaction
    fn transact<R, F>(&self, f: F) -> StorageResult<R>
    where
        F: FnOnce(&mut dyn WriteTxn) -> StorageResult<R>;
}

/// Metadata key of the next integer id to hand out
pub const NEXT_ID_KEY: &[u8] = b"next_id";

/// First integer id ever allocated; 0 is never used
pub const FIRST_INT_ID: u64 = 1;

/// Seed the id allocator if the store is fresh
pub(crate) fn init_metadata<S: KvStore>(store: &S) -> StorageResult<()> {
    store.transact(|txn| {
        if txn.get(Table::Metadata, NEXT_ID_KEY)?.is_none() {
            txn.put(Table::Metadata, NEXT_ID_KEY, &keys::encode_u64(FIRST_INT_ID))?;
        }
        Ok(())
    })
}

#[cfg(test)]
pub(crate) mod faulty;
