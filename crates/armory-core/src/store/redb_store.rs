//! # redb-backed Record Store
//!
//! A disk-backed `BackingStore` using the redb embedded database.
//!
//! Layout:
//! - one table per entry type, named by `EntryType::as_str()`
//! - key: record id (`&str`)
//! - value: the raw record as JSON bytes
//!
//! redb is synchronous; every call runs on the blocking pool so a slow
//! commit never stalls the async resolution chain on the runtime threads.

use super::BackingStore;
use crate::{ArmoryError, EntryType, RawRecord};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Table definition for an entry type.
fn table(entry_type: EntryType) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(entry_type.as_str())
}

fn storage_err(e: impl std::fmt::Display) -> ArmoryError {
    ArmoryError::StorageError(e.to_string())
}

/// A persistent record store using redb.
///
/// Cheap to clone; clones share one database handle.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a record database at the given path.
    ///
    /// Tables for every entry type are created up front so read transactions
    /// never hit a missing table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArmoryError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            for entry_type in EntryType::ALL {
                let _ = write_txn.open_table(table(entry_type)).map_err(storage_err)?;
            }
            write_txn.commit().map_err(storage_err)?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    /// Run a closure against the database on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, ArmoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, ArmoryError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(storage_err)?
    }
}

#[async_trait]
impl BackingStore for RedbStore {
    async fn list_ids(&self, entry_type: EntryType) -> Result<Vec<String>, ArmoryError> {
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let rows = read_txn.open_table(table(entry_type)).map_err(storage_err)?;

            let mut ids = Vec::new();
            for entry in rows.iter().map_err(storage_err)? {
                let (key, _) = entry.map_err(storage_err)?;
                ids.push(key.value().to_string());
            }
            Ok(ids)
        })
        .await
    }

    async fn get(
        &self,
        entry_type: EntryType,
        id: &str,
    ) -> Result<Option<RawRecord>, ArmoryError> {
        let id = id.to_string();
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(storage_err)?;
            let rows = read_txn.open_table(table(entry_type)).map_err(storage_err)?;

            let Some(data) = rows.get(id.as_str()).map_err(storage_err)? else {
                return Ok(None);
            };
            let record: RawRecord = serde_json::from_slice(data.value())
                .map_err(|e| ArmoryError::SerializationError(e.to_string()))?;
            Ok(Some(record))
        })
        .await
    }

    async fn put(
        &self,
        entry_type: EntryType,
        id: &str,
        record: &RawRecord,
    ) -> Result<(), ArmoryError> {
        let id = id.to_string();
        let bytes = serde_json::to_vec(record)
            .map_err(|e| ArmoryError::SerializationError(e.to_string()))?;
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(storage_err)?;
            {
                let mut rows = write_txn.open_table(table(entry_type)).map_err(storage_err)?;
                rows.insert(id.as_str(), bytes.as_slice())
                    .map_err(storage_err)?;
            }
            write_txn.commit().map_err(storage_err)
        })
        .await
    }

    async fn delete(&self, entry_type: EntryType, id: &str) -> Result<bool, ArmoryError> {
        let id = id.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(storage_err)?;
            let existed = {
                let mut rows = write_txn.open_table(table(entry_type)).map_err(storage_err)?;
                rows.remove(id.as_str()).map_err(storage_err)?.is_some()
            };
            write_txn.commit().map_err(storage_err)?;
            Ok(existed)
        })
        .await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(name: &str) -> RawRecord {
        let mut raw = RawRecord::new();
        raw.insert("name".into(), json!(name));
        raw
    }

    #[tokio::test]
    async fn redb_store_persists_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("records.db");

        {
            let store = RedbStore::open(&path).expect("open");
            store
                .put(EntryType::Weapon, "w1", &record("Rifle"))
                .await
                .expect("put");
        }

        let store = RedbStore::open(&path).expect("reopen");
        let fetched = store.get(EntryType::Weapon, "w1").await.expect("get");
        assert_eq!(fetched, Some(record("Rifle")));
        assert_eq!(
            store.list_ids(EntryType::Weapon).await.expect("list"),
            vec!["w1".to_string()]
        );
    }

    #[tokio::test]
    async fn redb_store_delete_reports_existence() {
        let dir = tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("records.db")).expect("open");

        store
            .put(EntryType::Quirk, "q1", &record("Haunted"))
            .await
            .expect("put");
        assert!(store.delete(EntryType::Quirk, "q1").await.expect("delete"));
        assert!(!store.delete(EntryType::Quirk, "q1").await.expect("delete"));
        assert!(store.get(EntryType::Quirk, "q1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn redb_store_tables_are_isolated_per_type() {
        let dir = tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("records.db")).expect("open");

        store
            .put(EntryType::Weapon, "shared", &record("weapon"))
            .await
            .expect("put");
        assert!(store.get(EntryType::System, "shared").await.expect("get").is_none());
    }
}
