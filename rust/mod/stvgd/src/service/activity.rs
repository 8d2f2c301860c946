use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stvgd_kv::Mutation;
use tracing::{debug, info};

use crate::error::{TraceError, ValidationError};
use crate::lineage::{
    check_derived_composition, derive_composition, resolve_inputs, validate_lineage,
};
use crate::model::{
    ActivityKind, Batch, Production, ProductionType, Reception, Registration, TraceabilityRecord,
    Transport, TransportType,
};
use crate::validate::activity::require;
use crate::validate::{validate_new_activity, validate_new_batch, validate_period, CreateBatchInput};

use super::StvgdService;

/// A unit registering a supplier's batch into the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInput {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "productionUnitID")]
    pub production_unit_id: String,
    pub activity_date: DateTime<Utc>,
    pub ecs: f64,
    pub ses: f64,
    /// The registered batch. Its custodian is overridden with the
    /// registering unit.
    pub batch: CreateBatchInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionInput {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "productionUnitID")]
    pub production_unit_id: String,
    pub production_type: String,
    /// Input batch ID → quantity consumed.
    pub input_batches: BTreeMap<String, f64>,
    /// The batch produced. Its custodian is overridden with the producing unit.
    pub output_batch: CreateBatchInput,
    pub activity_start_date: DateTime<Utc>,
    #[serde(default)]
    pub activity_end_date: Option<DateTime<Utc>>,
    pub ecs: f64,
    pub ses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportInput {
    #[serde(rename = "ID")]
    pub id: String,
    pub transport_type: String,
    #[serde(rename = "originProductionUnitID")]
    pub origin_production_unit_id: String,
    #[serde(rename = "destinationProductionUnitID")]
    pub destination_production_unit_id: String,
    #[serde(rename = "batchID")]
    pub batch_id: String,
    pub distance: f64,
    pub activity_start_date: DateTime<Utc>,
    pub ecs: f64,
    pub ses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceptionInput {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "productionUnitID")]
    pub production_unit_id: String,
    #[serde(rename = "transportID")]
    pub transport_id: String,
    #[serde(rename = "batchID")]
    pub batch_id: String,
    pub activity_date: DateTime<Utc>,
    pub ecs: f64,
    pub ses: f64,
}

impl StvgdService {
    // ── Activity workflows ──
    //
    // Each workflow validates everything first, then writes the activity
    // and every batch it touched in one commit.

    /// Register a new batch at a production unit.
    pub fn register(&self, input: RegistrationInput) -> Result<Registration, TraceError> {
        self.check_activity(ActivityKind::Registration, &input.id, input.ecs, input.ses)?;
        require("productionUnitID", &input.production_unit_id)?;

        let mut batch_input = input.batch;
        batch_input.production_unit_id = input.production_unit_id.clone();
        let batch_type = validate_new_batch(self.kv.as_ref(), &batch_input, &self.policy)?;

        let registration = Registration {
            id: input.id,
            production_unit_id: input.production_unit_id,
            batch_id: batch_input.id.clone(),
            activity_date: input.activity_date,
            ecs: input.ecs,
            ses: input.ses,
        };

        let mut batch = batch_input.into_batch(batch_type);
        batch.traceability.push(registration.clone().into());

        self.commit_activity(registration.clone().into(), &[batch])?;
        info!(
            "registration [{}]: batch [{}] registered at [{}]",
            registration.id, registration.batch_id, registration.production_unit_id
        );
        Ok(registration)
    }

    /// Turn input batches into a new output batch.
    ///
    /// Inputs must be held by the producing unit. Each input is decremented
    /// by the quantity consumed, and the production is appended to every
    /// input and to the output.
    pub fn produce(&self, input: ProductionInput) -> Result<Production, TraceError> {
        self.check_activity(ActivityKind::Production, &input.id, input.ecs, input.ses)?;
        require("productionUnitID", &input.production_unit_id)?;
        let production_type: ProductionType = input.production_type.parse()?;
        validate_period(input.activity_start_date, input.activity_end_date)?;

        let edges = resolve_inputs(&input.input_batches, |id| self.read_batch(id))?;
        for edge in &edges {
            if edge.batch.production_unit_id != input.production_unit_id {
                return Err(ValidationError::InvalidState(format!(
                    "input batch [{}] is held by [{}], not [{}]",
                    edge.batch.id, edge.batch.production_unit_id, input.production_unit_id
                ))
                .into());
            }
        }

        let mut output_input = input.output_batch;
        output_input.production_unit_id = input.production_unit_id.clone();
        validate_lineage(&output_input.id, &edges)?;
        self.check_ancestry(&output_input.id, &edges)?;
        let batch_type = validate_new_batch(self.kv.as_ref(), &output_input, &self.policy)?;

        if self.policy.verify_derived_composition {
            let derived = derive_composition(&edges);
            debug!("derived composition for [{}]: {:?}", output_input.id, derived);
            check_derived_composition(
                &output_input.batch_composition,
                &derived,
                self.policy.composition_tolerance,
            )?;
        }

        let production = Production {
            id: input.id,
            production_unit_id: input.production_unit_id,
            production_type,
            input_batches: input.input_batches,
            output_batch_id: output_input.id.clone(),
            activity_start_date: input.activity_start_date,
            activity_end_date: input.activity_end_date,
            ecs: input.ecs,
            ses: input.ses,
        };
        let record = TraceabilityRecord::from(production.clone());

        let mut touched: Vec<Batch> = edges
            .into_iter()
            .map(|edge| {
                let mut batch = edge.batch;
                batch.quantity -= edge.quantity;
                batch.traceability.push(record.clone());
                batch
            })
            .collect();
        let mut output = output_input.into_batch(batch_type);
        output.traceability.push(record.clone());
        touched.push(output);

        self.commit_activity(record, &touched)?;
        info!(
            "production [{}]: [{}] produced from {} inputs",
            production.id,
            production.output_batch_id,
            production.input_batches.len()
        );
        Ok(production)
    }

    /// Send a stationary batch from its custodian to another unit.
    pub fn dispatch(&self, input: TransportInput) -> Result<Transport, TraceError> {
        self.check_activity(ActivityKind::Transport, &input.id, input.ecs, input.ses)?;
        let transport_type: TransportType = input.transport_type.parse()?;
        require("originProductionUnitID", &input.origin_production_unit_id)?;
        require("destinationProductionUnitID", &input.destination_production_unit_id)?;
        require("batchID", &input.batch_id)?;
        if !(input.distance >= 0.0) || !input.distance.is_finite() {
            return Err(ValidationError::InvalidQuantity(input.distance).into());
        }
        if input.origin_production_unit_id == input.destination_production_unit_id {
            return Err(ValidationError::InvalidState(format!(
                "transport origin and destination are both [{}]",
                input.origin_production_unit_id
            ))
            .into());
        }

        let mut batch = self.read_batch(&input.batch_id)?;
        if batch.is_in_transit {
            return Err(ValidationError::InvalidState(format!(
                "batch [{}] is already in transit",
                batch.id
            ))
            .into());
        }
        if batch.production_unit_id != input.origin_production_unit_id {
            return Err(ValidationError::InvalidState(format!(
                "batch [{}] is held by [{}], not [{}]",
                batch.id, batch.production_unit_id, input.origin_production_unit_id
            ))
            .into());
        }

        let transport = Transport {
            id: input.id,
            transport_type,
            origin_production_unit_id: input.origin_production_unit_id,
            destination_production_unit_id: input.destination_production_unit_id,
            batch_id: input.batch_id,
            distance: input.distance,
            activity_start_date: input.activity_start_date,
            ecs: input.ecs,
            ses: input.ses,
        };

        batch.is_in_transit = true;
        batch.traceability.push(transport.clone().into());

        self.commit_activity(transport.clone().into(), &[batch])?;
        info!(
            "transport [{}]: batch [{}] dispatched [{}] -> [{}]",
            transport.id,
            transport.batch_id,
            transport.origin_production_unit_id,
            transport.destination_production_unit_id
        );
        Ok(transport)
    }

    /// Take custody of a batch at the destination of its current transport.
    pub fn receive(&self, input: ReceptionInput) -> Result<Reception, TraceError> {
        self.check_activity(ActivityKind::Reception, &input.id, input.ecs, input.ses)?;
        require("productionUnitID", &input.production_unit_id)?;
        require("transportID", &input.transport_id)?;
        require("batchID", &input.batch_id)?;

        let transport = match self.read_activity(&input.transport_id)? {
            TraceabilityRecord::Transport(t) => t,
            other => {
                return Err(ValidationError::InvalidState(format!(
                    "[{}] is a {}, not a transport",
                    input.transport_id,
                    other.kind()
                ))
                .into())
            }
        };
        if transport.batch_id != input.batch_id {
            return Err(ValidationError::InvalidState(format!(
                "transport [{}] carries [{}], not [{}]",
                transport.id, transport.batch_id, input.batch_id
            ))
            .into());
        }

        let mut batch = self.read_batch(&input.batch_id)?;
        let current = batch.traceability.iter().rev().find_map(|r| match r {
            TraceabilityRecord::Transport(t) => Some(t.id.as_str()),
            _ => None,
        });
        if !batch.is_in_transit || current != Some(transport.id.as_str()) {
            return Err(ValidationError::InvalidState(format!(
                "batch [{}] is not in transit under [{}]",
                batch.id, transport.id
            ))
            .into());
        }
        if transport.destination_production_unit_id != input.production_unit_id {
            return Err(ValidationError::InvalidState(format!(
                "transport [{}] is bound for [{}], not [{}]",
                transport.id, transport.destination_production_unit_id, input.production_unit_id
            ))
            .into());
        }

        let reception = Reception {
            id: input.id,
            production_unit_id: input.production_unit_id,
            transport_id: input.transport_id,
            batch_id: input.batch_id,
            activity_date: input.activity_date,
            ecs: input.ecs,
            ses: input.ses,
        };

        batch.is_in_transit = false;
        batch.production_unit_id = reception.production_unit_id.clone();
        batch.traceability.push(reception.clone().into());

        self.commit_activity(reception.clone().into(), &[batch])?;
        info!(
            "reception [{}]: batch [{}] now held by [{}]",
            reception.id, reception.batch_id, reception.production_unit_id
        );
        Ok(reception)
    }

    /// Read a stored activity. Its kind is taken from the ID prefix.
    pub fn read_activity(&self, id: &str) -> Result<TraceabilityRecord, TraceError> {
        let kind = ActivityKind::from_id(id)?;
        let record: TraceabilityRecord = self
            .load(id)?
            .ok_or_else(|| TraceError::NotFound(id.to_string()))?;

        if record.kind() != kind {
            return Err(ValidationError::InvalidState(format!(
                "[{id}] is stored as a {}, not a {kind}",
                record.kind()
            ))
            .into());
        }
        Ok(record)
    }

    fn check_activity(
        &self,
        kind: ActivityKind,
        id: &str,
        ecs: f64,
        ses: f64,
    ) -> Result<(), TraceError> {
        validate_new_activity(self.kv.as_ref(), kind, id, ecs, ses, &self.policy)
    }

    /// Store the activity under its own ID together with every batch it
    /// touched, in a single commit.
    fn commit_activity(
        &self,
        record: TraceabilityRecord,
        batches: &[Batch],
    ) -> Result<(), TraceError> {
        let mut mutations: Vec<Mutation> = Vec::with_capacity(batches.len() + 1);
        mutations.push(Self::encode(record.id(), &record)?);
        for batch in batches {
            mutations.push(Self::encode(&batch.id, batch)?);
        }

        self.commit(
            &format!("could not write {} [{}] to world state", record.kind(), record.id()),
            &mutations,
        )
    }
}
