//! Entity id to integer id mapping

use std::sync::Arc;

use dashmap::DashMap;

use crate::storage::keys::{decode_int_id, decode_u64, encode_u64, int_id_key};
use crate::storage::{KvStore, Table, NEXT_ID_KEY};
use crate::types::{IntId, Result, StorageError};

/// Bidirectional id mapping with an in-memory forward cache.
///
/// Mappings are written straight to the store when first created; they are
/// never changed or removed afterwards.
pub struct IdMap<S: KvStore> {
    store: Arc<S>,
    forward: DashMap<String, IntId>,
}

impl<S: KvStore> IdMap<S> {
    /// Create a mapping over `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store, forward: DashMap::new() }
    }

    /// Integer id of `entity`, allocating one on first sight
    pub fn resolve_or_create(&self, entity: &str) -> Result<IntId> {
        if let Some(id) = self.lookup(entity)? {
            return Ok(id);
        }

        let key = entity.as_bytes();
        let id = self.store.transact(|txn| {
            // Another writer may have created it since the lookup above.
            if let Some(raw) = txn.get(Table::IdToInt, key)? {
                return decode_int_id(&raw);
            }
            let raw = txn
                .get(Table::Metadata, NEXT_ID_KEY)?
                .ok_or_else(|| StorageError::corruption("id allocator row missing"))?;
            let next = decode_u64(&raw)?;
            let id = IntId(u32::try_from(next).map_err(|_| StorageError::IdSpaceExhausted)?);

            txn.put(Table::Metadata, NEXT_ID_KEY, &encode_u64(next + 1))?;
            txn.put(Table::IdToInt, key, &int_id_key(id))?;
            txn.put(Table::IntToId, &int_id_key(id), key)?;
            Ok(id)
        })?;

        crate::log_trace!(entity, id = id.get(), "allocated integer id");
        self.forward.insert(entity.to_owned(), id);
        Ok(id)
    }

    /// Integer id of `entity` if one was ever allocated
    pub fn lookup(&self, entity: &str) -> Result<Option<IntId>> {
        if let Some(id) = self.forward.get(entity) {
            return Ok(Some(*id));
        }
        match self.store.get(Table::IdToInt, entity.as_bytes())? {
            Some(raw) => {
                let id = decode_int_id(&raw)?;
                self.forward.insert(entity.to_owned(), id);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Entity id behind an integer id
    pub fn reverse(&self, id: IntId) -> Result<Option<String>> {
        match self.store.get(Table::IntToId, &int_id_key(id))? {
            Some(raw) => {
                let entity = String::from_utf8(raw)
                    .map_err(|e| StorageError::corruption(format!("entity id {id} is not UTF-8: {e}")))?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// Number of ids held in the forward cache
    pub fn cached(&self) -> usize {
        self.forward.len()
    }
}
