// # Record Store Trait
//
// Defines the persistence boundary of the core.
//
// ## Purpose
//
// Access rule sets, provider accounts and Wake-on-LAN targets are owned by
// an external store. The core only reads a snapshot of a record per call
// and forwards validated admin writes; it never writes durably itself.
//
// ## Implementations
//
// - In-memory: [`crate::store::MemoryRecordStore`]
// - Anything else (SQLite, the console's own database) lives outside this crate

use async_trait::async_trait;

/// A record kept by a [`RecordStore`]
pub trait Record: Clone + Send + Sync + 'static {
    /// Human-readable record kind, used in error messages
    const KIND: &'static str;

    /// Record id
    fn id(&self) -> &str;
}

/// Trait for record store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
/// Writes to a single record must be serialized by the store so that a
/// `get` always returns a consistent snapshot.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// List all records
    async fn list(&self) -> Result<Vec<R>, crate::Error>;

    /// Get a record by id
    ///
    /// # Returns
    ///
    /// - `Ok(Some(R))`: The record
    /// - `Ok(None)`: No record with this id
    /// - `Err(Error)`: Storage error
    async fn get(&self, id: &str) -> Result<Option<R>, crate::Error>;

    /// Create a record
    ///
    /// Fails with `Error::Store` if the id is already taken.
    async fn create(&self, record: R) -> Result<(), crate::Error>;

    /// Replace an existing record
    ///
    /// Fails with `Error::NotFound` if the id is unknown.
    async fn update(&self, record: R) -> Result<(), crate::Error>;

    /// Create or replace a record in one step
    ///
    /// Two concurrent upserts of a new id both succeed; the last one wins.
    async fn upsert(&self, record: R) -> Result<(), crate::Error>;

    /// Delete a record
    ///
    /// Fails with `Error::NotFound` if the id is unknown.
    async fn delete(&self, id: &str) -> Result<(), crate::Error>;
}
