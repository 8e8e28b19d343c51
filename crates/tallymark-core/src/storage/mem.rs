//! In-memory backend

use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::{init_metadata, KvStore, StorageResult, Table, WriteTxn};

type Rows = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile store with the same transactional contract as LMDB.
///
/// Writers are serialized by one lock; a transaction stages its writes and
/// applies them only once the closure returns `Ok`.
pub struct MemStore {
    tables: Mutex<[Rows; 5]>,
}

impl MemStore {
    /// Create an empty store with the id allocator seeded
    pub fn new() -> Self {
        let store = Self { tables: Mutex::new(Default::default()) };
        // Seeding cannot fail without a fault in the closure itself.
        if let Err(e) = init_metadata(&store) {
            crate::log_error!(error = %e, "failed to seed in-memory metadata");
        }
        store
    }

    /// Number of rows in `table`
    pub fn len(&self, table: Table) -> usize {
        self.tables.lock()[table.index()].len()
    }

    /// Whether `table` is empty
    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

struct MemWriteTxn<'a> {
    base: &'a [Rows; 5],
    staged: BTreeMap<(Table, Vec<u8>), Option<Vec<u8>>>,
}

impl WriteTxn for MemWriteTxn<'_> {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(staged) = self.staged.get(&(table, key.to_vec())) {
            return Ok(staged.clone());
        }
        Ok(self.base[table.index()].get(key).cloned())
    }

    fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.staged.insert((table, key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, table: Table, key: &[u8]) -> StorageResult<bool> {
        let existed = self.get(table, key)?.is_some();
        self.staged.insert((table, key.to_vec()), None);
        Ok(existed)
    }
}

impl KvStore for MemStore {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tables.lock()[table.index()].get(key).cloned())
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let tables = self.tables.lock();
        Ok(tables[table.index()]
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn transact<R, F>(&self, f: F) -> StorageResult<R>
    where
        F: FnOnce(&mut dyn WriteTxn) -> StorageResult<R>,
    {
        let mut tables = self.tables.lock();
        let mut txn = MemWriteTxn { base: &*tables, staged: BTreeMap::new() };
        let out = f(&mut txn)?;
        let staged = txn.staged;
        for ((table, key), value) in staged {
            let rows = &mut tables[table.index()];
            match value {
                Some(v) => {
                    rows.insert(key, v);
                }
                None => {
                    rows.remove(&key);
                }
            }
        }
        Ok(out)
    }
}
