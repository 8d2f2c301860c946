use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::KVError;
use crate::selector::Selector;
use crate::traits::{Cursor, KVStore, Mutation, Version};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");
const HISTORY: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("history");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQ_KEY: &str = "seq";

fn storage<E: Display>(e: E) -> KVError {
    KVError::Storage(e.to_string())
}

fn serialization<E: Display>(e: E) -> KVError {
    KVError::Serialization(e.to_string())
}

/// RedbStore is a KVStore implementation backed by redb, a pure-Rust embedded
/// key-value database.
///
/// Live values sit in the `kv` table. Every put and delete also appends a
/// JSON-encoded [`Version`] to `history`, keyed by `(key, seq)` where `seq`
/// is a store-wide counter kept in `meta`, so a range over one key yields its
/// versions in commit order.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        let db = Database::create(path).map_err(storage)?;

        // Ensure the tables exist by doing a write transaction.
        let write_txn = db.begin_write().map_err(storage)?;
        {
            write_txn.open_table(TABLE).map_err(storage)?;
            write_txn.open_table(HISTORY).map_err(storage)?;
            write_txn.open_table(META).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;

        debug!("RedbStore: opened {:?}", path);
        Ok(Self { db: Arc::new(db) })
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(TABLE).map_err(storage)?;

        match table.get(key) {
            Ok(Some(val)) => Ok(Some(val.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(storage(e)),
        }
    }

    fn apply(&self, mutations: &[Mutation]) -> Result<(), KVError> {
        let tx_id = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = Utc::now();

        // An early return drops the uncommitted transaction, which aborts it.
        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage)?;
            let mut history = write_txn.open_table(HISTORY).map_err(storage)?;
            let mut meta = write_txn.open_table(META).map_err(storage)?;

            let mut seq = meta
                .get(SEQ_KEY)
                .map_err(storage)?
                .map(|v| v.value())
                .unwrap_or(0);

            for mutation in mutations {
                let version = match mutation {
                    Mutation::Put { key, value } => {
                        table
                            .insert(key.as_str(), value.as_slice())
                            .map_err(storage)?;
                        Version {
                            tx_id: tx_id.clone(),
                            timestamp,
                            value: value.clone(),
                            is_delete: false,
                        }
                    }
                    Mutation::Delete { key } => {
                        let removed = table.remove(key.as_str()).map_err(storage)?.is_some();
                        if !removed {
                            continue;
                        }
                        Version {
                            tx_id: tx_id.clone(),
                            timestamp,
                            value: Vec::new(),
                            is_delete: true,
                        }
                    }
                };

                seq += 1;
                let encoded = serde_json::to_vec(&version).map_err(serialization)?;
                history
                    .insert((mutation.key(), seq), encoded.as_slice())
                    .map_err(storage)?;
            }

            meta.insert(SEQ_KEY, seq).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;

        debug!("RedbStore: committed {} ({} mutations)", tx_id, mutations.len());
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(TABLE).map_err(storage)?;

        let mut results = Vec::new();
        let iter = table.range(prefix..).map_err(storage)?;

        for entry in iter {
            let entry = entry.map_err(storage)?;
            let key = entry.0.value().to_string();
            if !key.starts_with(prefix) {
                break;
            }
            let value = entry.1.value().to_vec();
            results.push((key, value));
        }

        Ok(results)
    }

    fn query(&self, selector: &Selector) -> Result<Cursor<'_, (String, Vec<u8>)>, KVError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(TABLE).map_err(storage)?;

        let mut results = Vec::new();
        for entry in table.iter().map_err(storage)? {
            let entry = entry.map_err(storage)?;
            let value = entry.1.value();
            if selector.matches_bytes(value) {
                results.push((entry.0.value().to_string(), value.to_vec()));
            }
        }

        Ok(Box::new(results.into_iter().map(Ok)))
    }

    fn history(&self, key: &str) -> Result<Cursor<'_, Version>, KVError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(HISTORY).map_err(storage)?;

        let mut versions = Vec::new();
        for entry in table.range((key, 0u64)..=(key, u64::MAX)).map_err(storage)? {
            let entry = entry.map_err(storage)?;
            let version: Version =
                serde_json::from_slice(entry.1.value()).map_err(serialization)?;
            versions.push(version);
        }

        Ok(Box::new(versions.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RedbStore) {
        let tmp = TempDir::new().unwrap();
        let store = RedbStore::open(&tmp.path().join("world.redb")).unwrap();
        (tmp, store)
    }

    #[test]
    fn set_get_delete() {
        let (_tmp, store) = open_temp();
        store.set("b-1", b"one").unwrap();
        assert_eq!(store.get("b-1").unwrap(), Some(b"one".to_vec()));
        store.delete("b-1").unwrap();
        assert_eq!(store.get("b-1").unwrap(), None);
    }

    #[test]
    fn history_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("world.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.set("b-1", b"v1").unwrap();
            store.set("b-10", b"other").unwrap();
            store.set("b-1", b"v2").unwrap();
            store.delete("b-1").unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        let versions: Vec<Version> = store
            .history("b-1")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[0].value, b"v1");
        assert_eq!(versions[1].value, b"v2");
        assert!(versions[2].is_delete);
        assert_ne!(versions[0].tx_id, versions[1].tx_id);
    }

    #[test]
    fn commit_skips_absent_deletes() {
        let (_tmp, store) = open_temp();
        store
            .apply(&[Mutation::put("b-1", b"a".to_vec()), Mutation::delete("b-2")])
            .unwrap();
        assert_eq!(store.get("b-1").unwrap(), Some(b"a".to_vec()));
        let tombstones: Vec<Version> = store
            .history("b-2")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(tombstones.is_empty());
    }

    #[test]
    fn query_and_scan() {
        let (_tmp, store) = open_temp();
        store.set("b-1", br#"{"docType":"b","batchInternalID":"x"}"#).unwrap();
        store.set("b-2", br#"{"docType":"b","batchInternalID":"y"}"#).unwrap();
        store.set("p-1", br#"{"docType":"p"}"#).unwrap();

        let hits: Vec<(String, Vec<u8>)> = store
            .query(&Selector::new().eq("batchInternalID", "y"))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "b-2");

        assert_eq!(store.scan("b-").unwrap().len(), 2);
    }
}
