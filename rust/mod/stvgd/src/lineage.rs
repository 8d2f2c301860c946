//! Lineage model: which batches were consumed to produce which.
//!
//! A production consumes a set of [`InputBatch`] edges and yields one output
//! batch. Across the store these edges form a directed acyclic graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, ValidationError};
use crate::model::{Batch, Composition, TraceabilityRecord};

/// A batch plus the quantity of it a production consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBatch {
    pub batch: Batch,
    pub quantity: f64,
}

/// Resolve requested `(batch ID, quantity)` pairs into edges, looking each
/// batch up through `lookup`. A missing batch fails the whole resolution.
pub fn resolve_inputs<F>(
    requested: &BTreeMap<String, f64>,
    mut lookup: F,
) -> Result<Vec<InputBatch>, TraceError>
where
    F: FnMut(&str) -> Result<Batch, TraceError>,
{
    requested
        .iter()
        .map(|(id, &quantity)| {
            Ok(InputBatch {
                batch: lookup(id)?,
                quantity,
            })
        })
        .collect()
}

/// Check the edges of a production producing `output_id`.
///
/// Every edge must consume a positive, finite quantity no larger than what
/// its batch holds, from a stationary batch listed once. The output may not
/// appear among its own inputs, neither directly nor through their
/// compositions or recorded productions.
pub fn validate_lineage(output_id: &str, edges: &[InputBatch]) -> Result<(), ValidationError> {
    if edges.is_empty() {
        return Err(ValidationError::EmptyLineage);
    }

    let mut seen = BTreeSet::new();
    for edge in edges {
        let batch = &edge.batch;

        if !seen.insert(batch.id.as_str()) {
            return Err(ValidationError::DuplicateInput(batch.id.clone()));
        }
        if batch.id == output_id || refers_to(batch, output_id) {
            return Err(ValidationError::LineageCycle(output_id.to_string()));
        }
        if batch.is_in_transit {
            return Err(ValidationError::InvalidState(format!(
                "input batch [{}] is in transit",
                batch.id
            )));
        }
        if !(edge.quantity > 0.0) || !edge.quantity.is_finite() {
            return Err(ValidationError::InvalidQuantity(edge.quantity));
        }
        if edge.quantity > batch.quantity {
            return Err(ValidationError::InsufficientQuantity {
                batch: batch.id.clone(),
                requested: edge.quantity,
                available: batch.quantity,
            });
        }
    }
    Ok(())
}

fn refers_to(batch: &Batch, id: &str) -> bool {
    batch.batch_composition.contains_key(id)
        || batch.traceability.iter().any(|record| match record {
            TraceabilityRecord::Production(p) => {
                p.output_batch_id == batch.id && p.input_batches.contains_key(id)
            }
            _ => false,
        })
}

/// Composition of an output batch implied by its inputs: each input's
/// composition weighted by its share of the total consumed quantity.
///
/// An input with an empty composition contributes under its own ID.
/// Returns an empty composition when nothing is consumed.
pub fn derive_composition(edges: &[InputBatch]) -> Composition {
    let total: f64 = edges.iter().map(|e| e.quantity).sum();
    let mut derived = Composition::new();
    if !(total > 0.0) {
        return derived;
    }

    for edge in edges {
        let weight = edge.quantity / total;
        if edge.batch.batch_composition.is_empty() {
            *derived.entry(edge.batch.id.clone()).or_insert(0.0) += 100.0 * weight;
            continue;
        }
        for (contributor, share) in &edge.batch.batch_composition {
            *derived.entry(contributor.clone()).or_insert(0.0) += share * weight;
        }
    }
    derived
}

/// Compare a declared composition with a derived one, contributor by
/// contributor. A contributor missing on one side counts as 0.
pub fn check_derived_composition(
    declared: &Composition,
    derived: &Composition,
    tolerance: f64,
) -> Result<(), ValidationError> {
    let contributors: BTreeSet<&String> = declared.keys().chain(derived.keys()).collect();
    for contributor in contributors {
        let d = declared.get(contributor).copied().unwrap_or(0.0);
        let x = derived.get(contributor).copied().unwrap_or(0.0);
        if (d - x).abs() > tolerance {
            return Err(ValidationError::DerivedCompositionMismatch {
                contributor: contributor.clone(),
                declared: d,
                derived: x,
            });
        }
    }
    Ok(())
}

/// Production edge in a reconstructed lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageEdge {
    #[serde(rename = "productionID")]
    pub production_id: String,
    pub input: String,
    pub output: String,
    pub quantity: f64,
}

/// A batch reached while walking lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageNode {
    pub batch: Batch,
    /// Production steps between this batch and the root.
    pub depth: usize,
    /// Resolved from history because the live record is gone.
    pub deleted: bool,
}

/// Everything a batch was made from, back to its registered sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub root: String,
    pub batches: BTreeMap<String, LineageNode>,
    pub edges: Vec<LineageEdge>,
}

impl Provenance {
    /// Direct inputs of a batch within this lineage.
    pub fn inputs_of(&self, id: &str) -> Vec<&LineageEdge> {
        self.edges.iter().filter(|e| e.output == id).collect()
    }

    /// Batches that were not produced from anything: the registered origins.
    pub fn sources(&self) -> Vec<&Batch> {
        self.batches
            .iter()
            .filter(|(id, _)| !self.edges.iter().any(|e| &e.output == *id))
            .map(|(_, node)| &node.batch)
            .collect()
    }
}
