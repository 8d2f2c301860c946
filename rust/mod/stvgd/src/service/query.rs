//! Query router: field-selector lookups over the world state.
//!
//! Results come back in store-iteration order. That order is a property of
//! the backend, not of this API, and callers must not depend on it.

use serde::de::DeserializeOwned;
use stvgd_kv::Selector;
use tracing::debug;

use crate::error::TraceError;
use crate::model::{
    field, ActivityKind, Batch, Production, Reception, Registration, TraceabilityRecord, Transport,
    BATCH_DOC_TYPE,
};

use super::StvgdService;

/// Selector matching every document of one `docType`.
pub fn doc_type(doc_type: &str) -> Selector {
    Selector::new().eq(field::DOC_TYPE, doc_type)
}

/// Selector matching batches with the given producer-side reference.
///
/// Constrained to batch documents as well, since activities never carry
/// the field but foreign documents might.
pub fn batch_internal_id(internal_id: &str) -> Selector {
    doc_type(BATCH_DOC_TYPE).eq(field::BATCH_INTERNAL_ID, internal_id)
}

impl StvgdService {
    /// Run a selector and decode every hit as `T`.
    ///
    /// The first result that fails to decode aborts the query; no partial
    /// result is returned. The cursor is dropped before returning on
    /// every path.
    pub fn query_records<T: DeserializeOwned>(
        &self,
        selector: &Selector,
    ) -> Result<Vec<T>, TraceError> {
        let query = selector.to_query_string();
        debug!("running query {}", query);

        let cursor = self
            .kv
            .query(selector)
            .map_err(TraceError::store(format!("could not run query {query}")))?;

        let mut records = Vec::new();
        for item in cursor {
            let (key, bytes) =
                item.map_err(TraceError::store(format!("could not iterate query {query}")))?;
            let record = serde_json::from_slice(&bytes).map_err(TraceError::deserialization(
                format!("could not unmarshal query result at [{key}]"),
            ))?;
            records.push(record);
        }

        debug!("query {} returned {} records", query, records.len());
        Ok(records)
    }

    /// Same as [`query_records`](Self::query_records), from a rich query
    /// string such as `{"selector":{"docType":"b"}}`.
    pub fn query_string<T: DeserializeOwned>(&self, query: &str) -> Result<Vec<T>, TraceError> {
        let selector = Selector::parse(query)
            .map_err(TraceError::store(format!("could not parse query {query}")))?;
        self.query_records(&selector)
    }

    /// Every live batch.
    pub fn list_available_batches(&self) -> Result<Vec<Batch>, TraceError> {
        self.query_records(&doc_type(BATCH_DOC_TYPE))
    }

    /// Batches sharing a producer-side reference. Internal IDs are not
    /// unique, so several batches may come back.
    pub fn trace_batch_by_internal_id(&self, internal_id: &str) -> Result<Vec<Batch>, TraceError> {
        self.query_records(&batch_internal_id(internal_id))
    }

    /// Every stored activity of one kind, in ID order, found by its ID
    /// prefix rather than by selector.
    pub fn list_activities(&self, kind: ActivityKind) -> Result<Vec<TraceabilityRecord>, TraceError> {
        let prefix = kind.id_prefix();
        let entries = self
            .kv
            .scan(prefix)
            .map_err(TraceError::store(format!("could not scan [{prefix}*]")))?;

        let mut records = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            let record: TraceabilityRecord = serde_json::from_slice(&bytes).map_err(
                TraceError::deserialization(format!("could not unmarshal world state data at [{key}]")),
            )?;
            if record.kind() == kind {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn list_registrations(&self) -> Result<Vec<Registration>, TraceError> {
        self.query_records(&doc_type(ActivityKind::Registration.doc_type()))
    }

    pub fn list_productions(&self) -> Result<Vec<Production>, TraceError> {
        self.query_records(&doc_type(ActivityKind::Production.doc_type()))
    }

    pub fn list_transports(&self) -> Result<Vec<Transport>, TraceError> {
        self.query_records(&doc_type(ActivityKind::Transport.doc_type()))
    }

    pub fn list_receptions(&self) -> Result<Vec<Reception>, TraceError> {
        self.query_records(&doc_type(ActivityKind::Reception.doc_type()))
    }
}
