pub mod activity;
pub mod history;
pub mod provenance;
pub mod query;
pub mod registry;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use stvgd_kv::{KVStore, Mutation};

use crate::config::{StvgdConfig, ValidationPolicy};
use crate::error::TraceError;

pub use activity::{ProductionInput, ReceptionInput, RegistrationInput, TransportInput};

/// Traceability service: the batch registry, the activity workflows and
/// the read paths, all over one world state.
///
/// Every public operation runs synchronously and commits at most once, so
/// each one is a single atomic unit against the store.
pub struct StvgdService {
    pub(crate) kv: Arc<dyn KVStore>,
    pub(crate) policy: ValidationPolicy,
}

impl StvgdService {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self::with_policy(kv, ValidationPolicy::default())
    }

    pub fn with_policy(kv: Arc<dyn KVStore>, policy: ValidationPolicy) -> Self {
        Self { kv, policy }
    }

    /// Open the configured store and apply the configured policy.
    pub fn from_config(config: &StvgdConfig) -> Result<Self, TraceError> {
        let store = config.open_store()?;
        Ok(Self::with_policy(Arc::new(store), config.validation.clone()))
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    // ── Typed record helpers ──

    /// Read and decode the live record under `key`, if any.
    pub(crate) fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, TraceError> {
        let bytes = self
            .kv
            .get(key)
            .map_err(TraceError::store(format!("could not read [{key}] from world state")))?;
        bytes
            .map(|b| {
                serde_json::from_slice(&b).map_err(TraceError::deserialization(format!(
                    "could not unmarshal world state data at [{key}]"
                )))
            })
            .transpose()
    }

    pub(crate) fn encode<T: Serialize>(key: &str, record: &T) -> Result<Mutation, TraceError> {
        let bytes = serde_json::to_vec(record)
            .map_err(TraceError::serialization(format!("could not marshal [{key}]")))?;
        Ok(Mutation::put(key, bytes))
    }

    pub(crate) fn commit(&self, context: &str, mutations: &[Mutation]) -> Result<(), TraceError> {
        self.kv.apply(mutations).map_err(TraceError::store(context))
    }
}
