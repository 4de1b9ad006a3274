//! Transactional key-value seam
//!
//! The registry and the reference store are written against [`KvStore`];
//! the engine behind it is interchangeable. Write transactions are
//! serialized (single writer) so read-modify-write sequences inside one
//! transaction observe a stable snapshot and commit atomically.

use std::collections::BTreeMap;
use std::sync::Arc;

use maia_types::{StoreError, StoreResult};
use parking_lot::{Mutex, MutexGuard, RwLock};

/// Ordered key-value store with atomic write transactions and
/// prefix-scoped iteration
pub trait KvStore: Send + Sync {
    /// Point read outside any transaction
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Ordered scan of every pair whose key starts with `prefix`
    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Open a write transaction; blocks while another writer is active
    fn begin_write(&self) -> StoreResult<Box<dyn KvTransaction + '_>>;
}

/// A write transaction: buffered mutations applied atomically on commit.
/// Reads observe the transaction's own pending writes. Transactions hold
/// the writer lock and must not live across an await point.
pub trait KvTransaction {
    /// Read through the pending change set
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Ordered prefix scan through the pending change set
    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Buffer a put
    fn put(&mut self, key: &[u8], value: Vec<u8>);

    /// Buffer a delete
    fn delete(&mut self, key: &[u8]);

    /// Apply the change set atomically
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Embedded in-memory engine: a `BTreeMap` under a read-write lock, with a
/// dedicated writer mutex serializing transactions.
#[derive(Default)]
pub struct InMemoryKv {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    writer: Mutex<()>,
}

impl InMemoryKv {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind an `Arc<dyn KvStore>`
    pub fn shared() -> Arc<dyn KvStore> {
        Arc::new(Self::new())
    }

    fn range_scan(
        data: &BTreeMap<Vec<u8>, Vec<u8>>,
        prefix: &[u8],
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        data.range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl KvStore for InMemoryKv {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(Self::range_scan(&self.data.read(), prefix))
    }

    fn begin_write(&self) -> StoreResult<Box<dyn KvTransaction + '_>> {
        let guard = self.writer.lock();
        Ok(Box::new(InMemoryTransaction {
            store: self,
            _guard: guard,
            pending: BTreeMap::new(),
        }))
    }
}

/// Change-set entry: `Some` = put, `None` = delete
type Pending = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

struct InMemoryTransaction<'a> {
    store: &'a InMemoryKv,
    _guard: MutexGuard<'a, ()>,
    pending: Pending,
}

impl KvTransaction for InMemoryTransaction<'_> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        if let Some(entry) = self.pending.get(key) {
            return Ok(entry.clone());
        }
        Ok(self.store.data.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = {
            let data = self.store.data.read();
            InMemoryKv::range_scan(&data, prefix).into_iter().collect()
        };
        for (key, entry) in self.pending.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match entry {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) {
        self.pending.insert(key.to_vec(), Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.pending.insert(key.to_vec(), None);
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut data = self.store.data.write();
        for (key, entry) in self.pending {
            match entry {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Decode a JSON record fetched from the KV
pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(StoreError::from)
}

/// Encode a record for storage
pub(crate) fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(StoreError::from)
}
