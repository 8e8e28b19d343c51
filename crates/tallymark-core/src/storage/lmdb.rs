//! LMDB backend built on `heed`

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};

use super::{init_metadata, KvStore, StorageResult, Table, WriteTxn};

/// LMDB environment options
#[derive(Debug, Clone)]
pub struct LmdbOptions {
    /// Maximum size of the memory map in bytes
    pub map_size: usize,
    /// Maximum concurrent read transactions
    pub max_readers: u32,
}

impl Default for LmdbOptions {
    fn default() -> Self {
        Self {
            map_size: 1024 * 1024 * 1024, // 1GB
            max_readers: 126,
        }
    }
}

/// Durable store over one LMDB environment with a database per [`Table`]
pub struct LmdbStore {
    env: Env,
    dbs: [Database<Bytes, Bytes>; 5],
    path: PathBuf,
}

impl LmdbStore {
    /// Open (or create) the environment at `path`
    pub fn open(path: impl AsRef<Path>, options: LmdbOptions) -> StorageResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process and path, and the
        // files are not modified externally while it is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.map_size)
                .max_dbs(Table::ALL.len() as u32)
                .max_readers(options.max_readers)
                .open(path)?
        };

        let mut txn = env.write_txn()?;
        let dbs = [
            env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::IdToInt.name()))?,
            env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::IntToId.name()))?,
            env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::Metadata.name()))?,
            env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::EventCounters.name()))?,
            env.create_database::<Bytes, Bytes>(&mut txn, Some(Table::Bitmaps.name()))?,
        ];
        txn.commit()?;

        let store = Self { env, dbs, path: path.to_path_buf() };
        init_metadata(&store)?;
        crate::log_info!(path = %store.path.display(), "opened LMDB store");
        Ok(store)
    }

    /// Directory holding the environment
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn db(&self, table: Table) -> Database<Bytes, Bytes> {
        self.dbs[table.index()]
    }
}

struct LmdbWriteTxn<'a> {
    txn: RwTxn<'a>,
    dbs: &'a [Database<Bytes, Bytes>; 5],
}

impl WriteTxn for LmdbWriteTxn<'_> {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.dbs[table.index()].get(&self.txn, key)?.map(<[u8]>::to_vec))
    }

    fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.dbs[table.index()].put(&mut self.txn, key, value)?;
        Ok(())
    }

    fn delete(&mut self, table: Table, key: &[u8]) -> StorageResult<bool> {
        Ok(self.dbs[table.index()].delete(&mut self.txn, key)?)
    }
}

impl KvStore for LmdbStore {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let txn = self.env.read_txn()?;
        let value = self.db(table).get(&txn, key)?.map(<[u8]>::to_vec);
        Ok(value)
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let txn = self.env.read_txn()?;
        let mut rows = Vec::new();
        for entry in self.db(table).prefix_iter(&txn, prefix)? {
            let (key, value) = entry?;
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    fn transact<R, F>(&self, f: F) -> StorageResult<R>
    where
        F: FnOnce(&mut dyn WriteTxn) -> StorageResult<R>,
    {
        let mut txn = LmdbWriteTxn { txn: self.env.write_txn()?, dbs: &self.dbs };
        // Dropping an uncommitted RwTxn aborts it.
        let out = f(&mut txn)?;
        txn.txn.commit()?;
        Ok(out)
    }
}
