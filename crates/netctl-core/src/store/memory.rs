// # Memory Record Store
//
// In-memory implementation of RecordStore.
//
// ## Purpose
//
// Stands in for the console's database in tests and embedded setups, and
// holds the JSON snapshot the CLI loads at startup.
//
// ## Consistency
//
// - Each record is stored whole; `get` returns a clone, so a reader keeps
//   a consistent snapshot while another task updates the record
// - Writes to the map are serialized by the RwLock
// - Nothing is written to disk

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::record_store::{Record, RecordStore};

/// In-memory record store implementation
///
/// Records are kept in a `BTreeMap` keyed by id, so `list` is ordered.
///
/// # Example
///
/// ```rust,no_run
/// use netctl_core::store::MemoryRecordStore;
/// use netctl_core::traits::RecordStore;
/// use netctl_core::config::WolTarget;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRecordStore::new();
///     store.create(WolTarget::new("nas", "AA:BB:CC:DD:EE:FF")).await?;
///
///     let target = store.get("nas").await?;
///     assert!(target.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryRecordStore<R> {
    inner: Arc<RwLock<BTreeMap<String, R>>>,
}

impl<R: Record> MemoryRecordStore<R> {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Create a store pre-filled with records
    ///
    /// Later duplicates replace earlier ones.
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.id().to_string(), record))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl<R: Record> Default for MemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryRecordStore<R> {
    async fn list(&self) -> Result<Vec<R>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<R>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn create(&self, record: R) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(record.id()) {
            return Err(Error::store(format!(
                "{} '{}' already exists",
                R::KIND,
                record.id()
            )));
        }
        guard.insert(record.id().to_string(), record);
        Ok(())
    }

    async fn update(&self, record: R) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        match guard.get_mut(record.id()) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(Error::not_found(format!("{} '{}'", R::KIND, record.id()))),
        }
    }

    async fn upsert(&self, record: R) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(record.id().to_string(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("{} '{}'", R::KIND, id)))
    }
}
