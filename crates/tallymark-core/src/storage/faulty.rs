//! Store wrapper that fails a configurable number of write transactions

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{KvStore, MemStore, StorageResult, Table, WriteTxn};
use crate::types::StorageError;

pub(crate) struct FaultyStore {
    inner: MemStore,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self { inner: MemStore::new(), failures_left: AtomicUsize::new(0), attempts: AtomicUsize::new(0) }
    }

    /// Fail the next `n` write transactions
    pub(crate) fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn inner(&self) -> &MemStore {
        &self.inner
    }
}

impl KvStore for FaultyStore {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(table, key)
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan_prefix(table, prefix)
    }

    fn transact<R, F>(&self, f: F) -> StorageResult<R>
    where
        F: FnOnce(&mut dyn WriteTxn) -> StorageResult<R>,
    {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Transaction("injected failure".into()));
        }
        self.inner.transact(f)
    }
}
