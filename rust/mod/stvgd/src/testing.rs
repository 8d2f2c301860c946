//! Fixtures shared by the unit tests.

use std::collections::BTreeSet;
use std::iter;

use chrono::{TimeZone, Utc};
use stvgd_kv::{Cursor, KVError, KVStore, MemoryStore, Mutation, Selector, Version};

use crate::model::{Composition, Unit};
use crate::service::{ProductionInput, RegistrationInput};
use crate::validate::CreateBatchInput;

/// A batch that passes every creation rule.
pub fn sample_input(id: &str) -> CreateBatchInput {
    CreateBatchInput {
        id: id.to_string(),
        batch_type: "FABRIC".to_string(),
        production_unit_id: "pu-1".to_string(),
        batch_internal_id: "lot-1".to_string(),
        supplier_id: "sup-1".to_string(),
        is_in_transit: false,
        quantity: 100.0,
        unit: Unit::Kilograms,
        ecs: 2.5,
        ses: -1.25,
        batch_composition: Composition::from([("cotton".into(), 60.0), ("pes".into(), 40.0)]),
    }
}

pub fn batch_input(id: &str, quantity: f64, composition: &[(&str, f64)]) -> CreateBatchInput {
    CreateBatchInput {
        quantity,
        batch_composition: composition.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        ..sample_input(id)
    }
}

pub fn registration_input(id: &str, unit: &str, batch: CreateBatchInput) -> RegistrationInput {
    RegistrationInput {
        id: id.to_string(),
        production_unit_id: unit.to_string(),
        activity_date: Utc.with_ymd_and_hms(2023, 3, 1, 9, 0, 0).unwrap(),
        ecs: 1.0,
        ses: 1.0,
        batch,
    }
}

pub fn production_input(
    id: &str,
    unit: &str,
    inputs: &[(&str, f64)],
    output: CreateBatchInput,
) -> ProductionInput {
    ProductionInput {
        id: id.to_string(),
        production_unit_id: unit.to_string(),
        production_type: "SPINNING".to_string(),
        input_batches: inputs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        output_batch: output,
        activity_start_date: Utc.with_ymd_and_hms(2023, 3, 2, 9, 0, 0).unwrap(),
        activity_end_date: None,
        ecs: 0.0,
        ses: 0.0,
    }
}

/// A [`MemoryStore`] that fails on demand.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_reads: bool,
    fail_deletes: BTreeSet<String>,
    history_fails_after: Option<usize>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `get` fails.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Any commit that deletes `key` fails without applying.
    pub fn failing_delete_of(mut self, key: &str) -> Self {
        self.fail_deletes.insert(key.to_string());
        self
    }

    /// History cursors yield `n` versions, then an error.
    pub fn failing_history_after(mut self, n: usize) -> Self {
        self.history_fails_after = Some(n);
        self
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

fn injected(what: &str) -> KVError {
    KVError::Storage(format!("injected {what} failure"))
}

impl KVStore for FaultyStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        if self.fail_reads {
            return Err(injected("read"));
        }
        self.inner.get(key)
    }

    fn apply(&self, mutations: &[Mutation]) -> Result<(), KVError> {
        let blocked = mutations.iter().any(|m| {
            matches!(m, Mutation::Delete { key } if self.fail_deletes.contains(key))
        });
        if blocked {
            return Err(injected("delete"));
        }
        self.inner.apply(mutations)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        self.inner.scan(prefix)
    }

    fn query(&self, selector: &Selector) -> Result<Cursor<'_, (String, Vec<u8>)>, KVError> {
        self.inner.query(selector)
    }

    fn history(&self, key: &str) -> Result<Cursor<'_, Version>, KVError> {
        let cursor = self.inner.history(key)?;
        match self.history_fails_after {
            Some(n) => Ok(Box::new(
                cursor.take(n).chain(iter::once(Err(injected("history")))),
            )),
            None => Ok(cursor),
        }
    }
}
