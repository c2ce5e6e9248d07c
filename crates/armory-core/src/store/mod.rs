//! # Backing Stores
//!
//! The engine's only dependency on persistence is the narrow `BackingStore`
//! contract: per entry-type list/get/put/delete of raw records. The host
//! application supplies an implementation; two ship with the crate:
//! - `MemoryStore`: `BTreeMap` tables, volatile, counts reads
//! - `RedbStore`: one redb table per entry type, ACID, persistent

mod redb_store;

pub use redb_store::RedbStore;

use crate::{ArmoryError, EntryType, RawRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// BACKINGSTORE TRAIT
// =============================================================================

/// Per entry-type CRUD over raw records.
///
/// No transactional guarantees are required beyond per-call atomicity.
/// Records are always written whole; the engine never issues partial-field
/// writes.
#[async_trait]
pub trait BackingStore: Send + Sync + fmt::Debug {
    /// List every id stored for an entry type, in a stable order.
    async fn list_ids(&self, entry_type: EntryType) -> Result<Vec<String>, ArmoryError>;

    /// Fetch one raw record. `Ok(None)` when no row exists.
    async fn get(&self, entry_type: EntryType, id: &str)
    -> Result<Option<RawRecord>, ArmoryError>;

    /// Insert or overwrite one raw record.
    async fn put(
        &self,
        entry_type: EntryType,
        id: &str,
        record: &RawRecord,
    ) -> Result<(), ArmoryError>;

    /// Delete one row. Returns `true` if a row was removed.
    async fn delete(&self, entry_type: EntryType, id: &str) -> Result<bool, ArmoryError>;

    /// Check whether a row exists.
    async fn contains(&self, entry_type: EntryType, id: &str) -> Result<bool, ArmoryError> {
        Ok(self.get(entry_type, id).await?.is_some())
    }
}

/// Shared handle to a backing store.
pub type SharedStore = Arc<dyn BackingStore>;

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Volatile in-memory store.
///
/// Tables are `BTreeMap`s so `list_ids` enumerates deterministically.
/// Every `get` bumps a read counter, which tests use to observe that a
/// resolution context fetched a row at most once. `contains` is not a read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<EntryType, BTreeMap<String, RawRecord>>>,
    reads: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row without going through the async contract.
    pub fn insert(&self, entry_type: EntryType, id: impl Into<String>, record: RawRecord) {
        self.tables
            .write()
            .entry(entry_type)
            .or_default()
            .insert(id.into(), record);
    }

    /// Synchronous peek at a row (no read accounting).
    #[must_use]
    pub fn row(&self, entry_type: EntryType, id: &str) -> Option<RawRecord> {
        self.tables
            .read()
            .get(&entry_type)
            .and_then(|table| table.get(id))
            .cloned()
    }

    /// Number of rows stored for an entry type.
    #[must_use]
    pub fn len(&self, entry_type: EntryType) -> usize {
        self.tables.read().get(&entry_type).map_or(0, BTreeMap::len)
    }

    /// Check if the store holds no rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.read().values().all(BTreeMap::is_empty)
    }

    /// Total number of `get` calls served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn list_ids(&self, entry_type: EntryType) -> Result<Vec<String>, ArmoryError> {
        Ok(self
            .tables
            .read()
            .get(&entry_type)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(
        &self,
        entry_type: EntryType,
        id: &str,
    ) -> Result<Option<RawRecord>, ArmoryError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.row(entry_type, id))
    }

    async fn put(
        &self,
        entry_type: EntryType,
        id: &str,
        record: &RawRecord,
    ) -> Result<(), ArmoryError> {
        self.insert(entry_type, id, record.clone());
        Ok(())
    }

    /// Existence check without a read.
    async fn contains(&self, entry_type: EntryType, id: &str) -> Result<bool, ArmoryError> {
        Ok(self
            .tables
            .read()
            .get(&entry_type)
            .is_some_and(|table| table.contains_key(id)))
    }

    async fn delete(&self, entry_type: EntryType, id: &str) -> Result<bool, ArmoryError> {
        Ok(self
            .tables
            .write()
            .get_mut(&entry_type)
            .is_some_and(|table| table.remove(id).is_some()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str) -> RawRecord {
        let mut raw = RawRecord::new();
        raw.insert("name".into(), json!(name));
        raw
    }

    #[tokio::test]
    async fn memory_store_crud() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store
            .put(EntryType::Weapon, "w1", &record("Rifle"))
            .await
            .expect("put");
        let fetched = store.get(EntryType::Weapon, "w1").await.expect("get");
        assert_eq!(fetched, Some(record("Rifle")));

        assert!(store.delete(EntryType::Weapon, "w1").await.expect("delete"));
        assert!(!store.delete(EntryType::Weapon, "w1").await.expect("delete"));
        assert!(store.get(EntryType::Weapon, "w1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn contains_is_not_counted_as_a_read() {
        let store = MemoryStore::new();
        store.insert(EntryType::Weapon, "w1", record("Rifle"));

        assert!(store.contains(EntryType::Weapon, "w1").await.expect("contains"));
        assert!(!store.contains(EntryType::Weapon, "w2").await.expect("contains"));
        assert!(!store.contains(EntryType::Mech, "w1").await.expect("contains"));
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn memory_store_lists_ids_in_order() {
        let store = MemoryStore::new();
        store.insert(EntryType::Quirk, "c", record("c"));
        store.insert(EntryType::Quirk, "a", record("a"));
        store.insert(EntryType::Quirk, "b", record("b"));

        let ids = store.list_ids(EntryType::Quirk).await.expect("list");
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(store.list_ids(EntryType::Mech).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn memory_store_counts_reads() {
        let store = MemoryStore::new();
        store.insert(EntryType::Frame, "f1", record("Everest"));

        let _ = store.get(EntryType::Frame, "f1").await;
        let _ = store.get(EntryType::Frame, "missing").await;
        assert_eq!(store.reads(), 2);
        assert!(store.contains(EntryType::Frame, "f1").await.expect("contains"));
    }
}
