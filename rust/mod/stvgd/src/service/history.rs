use stvgd_kv::Version;
use tracing::debug;

use crate::error::TraceError;
use crate::model::{Batch, HistoryRecord};

use super::StvgdService;

impl StvgdService {
    // ── History reconstruction ──

    /// Every recorded version of a batch key, oldest first.
    ///
    /// A key that was never written has an empty history. A version without
    /// a value (a tombstone) is reported with [`Batch::placeholder`].
    /// The store cursor is released before returning, on success and on
    /// every error path.
    pub fn batch_history(&self, id: &str) -> Result<Vec<HistoryRecord>, TraceError> {
        let cursor = self
            .kv
            .history(id)
            .map_err(TraceError::store(format!("could not get history for [{id}]")))?;

        let mut records = Vec::new();
        for version in cursor {
            let version = version.map_err(TraceError::store(format!(
                "could not iterate history for [{id}]"
            )))?;
            records.push(to_history_record(id, version)?);
        }

        debug!("history of [{}]: {} versions", id, records.len());
        Ok(records)
    }

    /// The batch as it was at its latest non-delete version, if it was ever
    /// written. Used to resolve batches whose live record is gone.
    pub fn last_snapshot(&self, id: &str) -> Result<Option<Batch>, TraceError> {
        Ok(self
            .batch_history(id)?
            .into_iter()
            .rev()
            .find(|r| !r.is_delete)
            .map(|r| r.record))
    }
}

fn to_history_record(id: &str, version: Version) -> Result<HistoryRecord, TraceError> {
    let record = if version.value.is_empty() {
        Batch::placeholder(id)
    } else {
        serde_json::from_slice(&version.value).map_err(TraceError::deserialization(format!(
            "could not unmarshal version {} of [{id}]",
            version.tx_id
        )))?
    };

    Ok(HistoryRecord {
        record,
        tx_id: version.tx_id,
        timestamp: version.timestamp,
        is_delete: version.is_delete,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stvgd_kv::{KVStore, MemoryStore};

    use super::*;
    use crate::testing::{sample_input, FaultyStore};

    #[test]
    fn never_written_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let svc = StvgdService::new(store.clone());
        assert!(svc.batch_history("b-404").unwrap().is_empty());
        assert_eq!(svc.last_snapshot("b-404").unwrap(), None);
        assert_eq!(store.open_cursors(), 0);
    }

    #[test]
    fn delete_leaves_tombstone() {
        let store = Arc::new(MemoryStore::new());
        let svc = StvgdService::new(store.clone());
        let created = svc.create_batch(sample_input("b-100")).unwrap();
        svc.delete_batch("b-100").unwrap();
        assert!(matches!(svc.read_batch("b-100"), Err(TraceError::NotFound(_))));

        let history = svc.batch_history("b-100").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record, created);
        assert!(!history[0].is_delete);

        let last = history.last().unwrap();
        assert!(last.is_delete);
        assert_eq!(last.record, Batch::placeholder("b-100"));
        assert_ne!(history[0].tx_id, last.tx_id);
        assert!(history[0].timestamp <= last.timestamp);
        assert_eq!(store.open_cursors(), 0);
    }

    #[test]
    fn last_snapshot_skips_tombstone() {
        let svc = StvgdService::new(Arc::new(MemoryStore::new()));
        let created = svc.create_batch(sample_input("b-1")).unwrap();
        svc.delete_batch("b-1").unwrap();
        assert_eq!(svc.last_snapshot("b-1").unwrap(), Some(created));
    }

    #[test]
    fn iteration_error_releases_cursor() {
        let store = Arc::new(FaultyStore::new().failing_history_after(1));
        let svc = StvgdService::new(store.clone());
        svc.create_batch(sample_input("b-1")).unwrap();
        svc.delete_batch("b-1").unwrap();

        let err = svc.batch_history("b-1").unwrap_err();
        assert!(matches!(err, TraceError::Store { .. }));
        assert_eq!(store.inner().open_cursors(), 0);
    }

    #[test]
    fn corrupt_version_releases_cursor() {
        let store = Arc::new(MemoryStore::new());
        let svc = StvgdService::new(store.clone());
        svc.create_batch(sample_input("b-1")).unwrap();
        store.set("b-1", b"{garbage").unwrap();

        let err = svc.batch_history("b-1").unwrap_err();
        assert!(matches!(err, TraceError::Deserialization { .. }));
        assert_eq!(store.open_cursors(), 0);
    }
}
