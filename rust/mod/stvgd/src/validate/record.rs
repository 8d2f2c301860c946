use serde::{Deserialize, Serialize};
use stvgd_kv::KVStore;

use crate::config::ValidationPolicy;
use crate::error::{TraceError, ValidationError};
use crate::model::{Batch, BatchType, Composition, Unit, BATCH_DOC_TYPE, BATCH_ID_PREFIX};
use crate::validate::composition::validate_composition;

/// Parameters for creating a new batch.
///
/// `batch_type` stays a raw string until validation so that an unknown
/// type is reported as a rule violation rather than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchInput {
    #[serde(rename = "ID")]
    pub id: String,
    pub batch_type: String,
    #[serde(rename = "productionUnitID")]
    pub production_unit_id: String,
    #[serde(rename = "batchInternalID")]
    pub batch_internal_id: String,
    #[serde(rename = "supplierID")]
    pub supplier_id: String,
    #[serde(default)]
    pub is_in_transit: bool,
    pub quantity: f64,
    pub unit: Unit,
    pub ecs: f64,
    pub ses: f64,
    pub batch_composition: Composition,
}

impl CreateBatchInput {
    /// Build the stored form once validation has produced the parsed type.
    pub fn into_batch(self, batch_type: BatchType) -> Batch {
        Batch {
            doc_type: BATCH_DOC_TYPE.to_string(),
            id: self.id,
            batch_type,
            production_unit_id: self.production_unit_id,
            batch_internal_id: self.batch_internal_id,
            supplier_id: self.supplier_id,
            is_in_transit: self.is_in_transit,
            quantity: self.quantity,
            unit: self.unit,
            ecs: self.ecs,
            ses: self.ses,
            batch_composition: self.batch_composition,
            traceability: Vec::new(),
        }
    }
}

/// True iff a live value sits under `key`.
pub fn key_exists(store: &dyn KVStore, key: &str) -> Result<bool, TraceError> {
    let value = store
        .get(key)
        .map_err(TraceError::store(format!("could not read [{key}] from world state")))?;
    Ok(value.is_some())
}

pub fn validate_batch_id(id: &str) -> Result<(), ValidationError> {
    if id.len() <= BATCH_ID_PREFIX.len() || !id.starts_with(BATCH_ID_PREFIX) {
        return Err(ValidationError::BadIdFormat {
            id: id.to_string(),
            expected: BATCH_ID_PREFIX,
        });
    }
    Ok(())
}

pub fn validate_quantity(quantity: f64) -> Result<(), ValidationError> {
    if !(quantity >= 0.0) || !quantity.is_finite() {
        return Err(ValidationError::InvalidQuantity(quantity));
    }
    Ok(())
}

pub fn validate_score(
    field: &'static str,
    value: f64,
    policy: &ValidationPolicy,
) -> Result<(), ValidationError> {
    if !(policy.score_min..=policy.score_max).contains(&value) {
        return Err(ValidationError::ScoreOutOfRange {
            field,
            value,
            min: policy.score_min,
            max: policy.score_max,
        });
    }
    Ok(())
}

pub fn validate_scores(ecs: f64, ses: f64, policy: &ValidationPolicy) -> Result<(), ValidationError> {
    validate_score("ecs", ecs, policy)?;
    validate_score("ses", ses, policy)
}

/// Run every creation rule against a candidate batch, stopping at the first
/// violation. Rules are checked in a fixed order: ID prefix, ID unused,
/// internal ID, supplier ID, not in transit, batch type, composition,
/// quantity, scores.
///
/// Reads the store to check that the ID is unused but never writes.
/// Returns the parsed batch type on success.
pub fn validate_new_batch(
    store: &dyn KVStore,
    input: &CreateBatchInput,
    policy: &ValidationPolicy,
) -> Result<BatchType, TraceError> {
    validate_batch_id(&input.id)?;

    if key_exists(store, &input.id)? {
        return Err(TraceError::AlreadyExists(input.id.clone()));
    }

    if input.batch_internal_id.is_empty() {
        return Err(ValidationError::EmptyField("batchInternalID").into());
    }
    if input.supplier_id.is_empty() {
        return Err(ValidationError::EmptyField("supplierID").into());
    }
    if input.is_in_transit {
        return Err(ValidationError::InvalidState(format!(
            "batch [{}] must not be in transit",
            input.id
        ))
        .into());
    }

    let batch_type: BatchType = input.batch_type.parse()?;

    validate_composition(&input.batch_composition, policy)?;
    validate_quantity(input.quantity)?;
    validate_scores(input.ecs, input.ses, policy)?;

    Ok(batch_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_input;
    use stvgd_kv::MemoryStore;

    fn rule(store: &MemoryStore, input: &CreateBatchInput) -> &'static str {
        match validate_new_batch(store, input, &ValidationPolicy::default()) {
            Err(TraceError::Validation(v)) => v.rule(),
            Err(TraceError::AlreadyExists(_)) => "ALREADY_EXISTS",
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => "OK",
        }
    }

    #[test]
    fn valid_input_passes() {
        let store = MemoryStore::new();
        let input = sample_input("b-001");
        let t = validate_new_batch(&store, &input, &ValidationPolicy::default()).unwrap();
        assert_eq!(t, BatchType::Fabric);
    }

    #[test]
    fn id_prefix() {
        let store = MemoryStore::new();
        assert_eq!(rule(&store, &sample_input("b-001")), "OK");
        assert_eq!(rule(&store, &sample_input("x-001")), "BAD_ID_FORMAT");
        assert_eq!(rule(&store, &sample_input("")), "BAD_ID_FORMAT");
        assert_eq!(rule(&store, &sample_input("b-")), "BAD_ID_FORMAT");
    }

    #[test]
    fn existing_id_rejected() {
        let store = MemoryStore::new();
        store.set("b-001", b"{}").unwrap();
        assert_eq!(rule(&store, &sample_input("b-001")), "ALREADY_EXISTS");
    }

    #[test]
    fn required_fields_and_state() {
        let store = MemoryStore::new();

        let mut input = sample_input("b-1");
        input.batch_internal_id.clear();
        assert_eq!(rule(&store, &input), "EMPTY_FIELD");

        let mut input = sample_input("b-1");
        input.supplier_id.clear();
        assert_eq!(rule(&store, &input), "EMPTY_FIELD");

        let mut input = sample_input("b-1");
        input.is_in_transit = true;
        assert_eq!(rule(&store, &input), "INVALID_STATE");

        let mut input = sample_input("b-1");
        input.batch_type = "CARPET".into();
        assert_eq!(rule(&store, &input), "UNKNOWN_TYPE");

        let mut input = sample_input("b-1");
        input.quantity = -0.5;
        assert_eq!(rule(&store, &input), "INVALID_QUANTITY");

        let mut input = sample_input("b-1");
        input.quantity = 0.0;
        assert_eq!(rule(&store, &input), "OK");
    }

    #[test]
    fn composition_errors_propagate() {
        let store = MemoryStore::new();
        let mut input = sample_input("b-1");
        input.batch_composition = Composition::from([("m1".into(), 60.0), ("m2".into(), 50.0)]);
        assert_eq!(rule(&store, &input), "COMPOSITION_OVERFLOW");

        input.batch_composition = Composition::from([("m1".into(), 60.0), ("m2".into(), 30.0)]);
        assert_eq!(rule(&store, &input), "COMPOSITION_MISMATCH");
    }

    #[test]
    fn score_boundaries() {
        let store = MemoryStore::new();
        for (value, expected) in [
            (10.0, "OK"),
            (10.0001, "SCORE_OUT_OF_RANGE"),
            (-10.0, "OK"),
            (-10.0001, "SCORE_OUT_OF_RANGE"),
            (f64::NAN, "SCORE_OUT_OF_RANGE"),
        ] {
            let mut input = sample_input("b-1");
            input.ecs = value;
            assert_eq!(rule(&store, &input), expected, "ecs = {value}");

            let mut input = sample_input("b-1");
            input.ses = value;
            assert_eq!(rule(&store, &input), expected, "ses = {value}");
        }
    }

    #[test]
    fn first_violation_wins() {
        let store = MemoryStore::new();
        let mut input = sample_input("b-1");
        input.supplier_id.clear();
        input.batch_type = "CARPET".into();
        input.ecs = 99.0;
        let err = validate_new_batch(&store, &input, &ValidationPolicy::default()).unwrap_err();
        assert_eq!(
            err.validation(),
            Some(&ValidationError::EmptyField("supplierID"))
        );
    }
}
