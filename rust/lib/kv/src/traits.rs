use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KVError;
use crate::selector::Selector;

/// A lazily consumed result stream. Dropping the cursor releases whatever
/// the backend holds open for it.
pub type Cursor<'a, T> = Box<dyn Iterator<Item = Result<T, KVError>> + 'a>;

/// One write inside an atomic commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl Mutation {
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        Mutation::Put { key: key.into(), value }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Mutation::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key } => key,
        }
    }
}

/// A single entry in a key's modification log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    /// Identifier of the commit that produced this version.
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    /// Value written by the commit. Empty for deletions.
    #[serde(default)]
    pub value: Vec<u8>,
    #[serde(default)]
    pub is_delete: bool,
}

/// KVStore is the versioned world state the traceability core runs against.
///
/// Every commit is atomic and stamped with a transaction id; the store keeps
/// an append-only log of every put and delete per key, so history survives
/// deletion of the live value.
pub trait KVStore: Send + Sync {
    /// Get the live value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Commit all mutations under one transaction id, or none of them.
    /// Deleting a key that has no live value is a no-op.
    fn apply(&self, mutations: &[Mutation]) -> Result<(), KVError>;

    /// Set a key-value pair in its own commit.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        self.apply(&[Mutation::put(key, value.to_vec())])
    }

    /// Delete a key in its own commit. The key's history is retained.
    fn delete(&self, key: &str) -> Result<(), KVError> {
        self.apply(&[Mutation::delete(key)])
    }

    /// Scan all live keys matching a prefix. Returns sorted (key, value) pairs.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError>;

    /// Stream live JSON documents whose top-level fields match the selector.
    ///
    /// Result order is backend-defined and must not be relied upon.
    fn query(&self, selector: &Selector) -> Result<Cursor<'_, (String, Vec<u8>)>, KVError>;

    /// Stream the modification log of a key, oldest first. A key that was
    /// never written yields an empty cursor.
    fn history(&self, key: &str) -> Result<Cursor<'_, Version>, KVError>;
}
