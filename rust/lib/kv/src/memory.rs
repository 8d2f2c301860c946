use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::debug;

use crate::error::KVError;
use crate::selector::Selector;
use crate::traits::{Cursor, KVStore, Mutation, Version};

#[derive(Default)]
struct State {
    live: BTreeMap<String, Vec<u8>>,
    log: BTreeMap<String, Vec<Version>>,
    seq: u64,
}

/// MemoryStore is an in-process KVStore: a sorted map of live values plus an
/// append-only version log per key.
///
/// Transaction ids come from a monotonic counter, so runs are reproducible.
/// Open cursors are counted, letting callers check that every history or
/// query cursor was released.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    cursors: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cursors handed out and not yet dropped.
    pub fn open_cursors(&self) -> usize {
        self.cursors.load(Ordering::SeqCst)
    }

    /// Number of log entries recorded for a key, including tombstones.
    pub fn version_count(&self, key: &str) -> usize {
        self.read()
            .map(|state| state.log.get(key).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, KVError> {
        self.state
            .read()
            .map_err(|_| KVError::Storage("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, KVError> {
        self.state
            .write()
            .map_err(|_| KVError::Storage("memory store lock poisoned".into()))
    }

    fn cursor<T: 'static>(&self, items: Vec<T>) -> Cursor<'static, T> {
        Box::new(TrackedCursor {
            items: items.into_iter(),
            _guard: CursorGuard::open(&self.cursors),
        })
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        Ok(self.read()?.live.get(key).cloned())
    }

    fn apply(&self, mutations: &[Mutation]) -> Result<(), KVError> {
        let mut state = self.write()?;
        state.seq += 1;
        let tx_id = format!("tx{:016x}", state.seq);
        let timestamp = Utc::now();

        for mutation in mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    state.live.insert(key.clone(), value.clone());
                    state.log.entry(key.clone()).or_default().push(Version {
                        tx_id: tx_id.clone(),
                        timestamp,
                        value: value.clone(),
                        is_delete: false,
                    });
                }
                Mutation::Delete { key } => {
                    if state.live.remove(key).is_none() {
                        continue;
                    }
                    state.log.entry(key.clone()).or_default().push(Version {
                        tx_id: tx_id.clone(),
                        timestamp,
                        value: Vec::new(),
                        is_delete: true,
                    });
                }
            }
        }

        debug!("MemoryStore: committed {} ({} mutations)", tx_id, mutations.len());
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        let state = self.read()?;
        Ok(state
            .live
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn query(&self, selector: &Selector) -> Result<Cursor<'_, (String, Vec<u8>)>, KVError> {
        let matched: Vec<(String, Vec<u8>)> = {
            let state = self.read()?;
            state
                .live
                .iter()
                .filter(|(_, value)| selector.matches_bytes(value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        };
        Ok(self.cursor(matched))
    }

    fn history(&self, key: &str) -> Result<Cursor<'_, Version>, KVError> {
        let versions = self.read()?.log.get(key).cloned().unwrap_or_default();
        Ok(self.cursor(versions))
    }
}

struct CursorGuard(Arc<AtomicUsize>);

impl CursorGuard {
    fn open(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct TrackedCursor<T> {
    items: std::vec::IntoIter<T>,
    _guard: CursorGuard,
}

impl<T> Iterator for TrackedCursor<T> {
    type Item = Result<T, KVError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next().map(Ok)
    }
}
