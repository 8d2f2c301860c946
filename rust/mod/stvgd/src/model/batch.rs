use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::TraceabilityRecord;

/// `docType` discriminator of batch documents.
pub const BATCH_DOC_TYPE: &str = "b";

/// Every batch ID starts with this.
pub const BATCH_ID_PREFIX: &str = "b-";

/// Serialized field names that double as query-selector keys.
/// They must track the serde renames on [`Batch`].
pub mod field {
    pub const DOC_TYPE: &str = "docType";
    pub const ID: &str = "ID";
    pub const BATCH_INTERNAL_ID: &str = "batchInternalID";
    pub const SUPPLIER_ID: &str = "supplierID";
    pub const PRODUCTION_UNIT_ID: &str = "productionUnitID";
}

/// Contributor (raw material or source batch) → percentage of the batch.
pub type Composition = BTreeMap<String, f64>;

/// Material or processing stage of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchType {
    Fiber,
    Yarn,
    Mesh,
    Fabric,
    DyedMesh,
    FinishedMesh,
    DyedFabric,
    FinishedFabric,
    Cut,
    FinishedPiece,
    Other,
}

impl BatchType {
    pub const ALL: [BatchType; 11] = [
        BatchType::Fiber,
        BatchType::Yarn,
        BatchType::Mesh,
        BatchType::Fabric,
        BatchType::DyedMesh,
        BatchType::FinishedMesh,
        BatchType::DyedFabric,
        BatchType::FinishedFabric,
        BatchType::Cut,
        BatchType::FinishedPiece,
        BatchType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchType::Fiber => "FIBER",
            BatchType::Yarn => "YARN",
            BatchType::Mesh => "MESH",
            BatchType::Fabric => "FABRIC",
            BatchType::DyedMesh => "DYED_MESH",
            BatchType::FinishedMesh => "FINISHED_MESH",
            BatchType::DyedFabric => "DYED_FABRIC",
            BatchType::FinishedFabric => "FINISHED_FABRIC",
            BatchType::Cut => "CUT",
            BatchType::FinishedPiece => "FINISHED_PIECE",
            BatchType::Other => "OTHER",
        }
    }
}

impl Default for BatchType {
    fn default() -> Self {
        Self::Other
    }
}

impl fmt::Display for BatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownType {
                kind: "batch type",
                value: s.to_string(),
            })
    }
}

/// Unit the batch quantity is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "KG")]
    Kilograms,
    #[serde(rename = "L")]
    Liters,
    #[serde(rename = "M")]
    Meters,
    #[serde(rename = "M2")]
    SquaredMeters,
}

impl Default for Unit {
    fn default() -> Self {
        Self::Kilograms
    }
}

/// Batch stores a quantity of material moving through the supply chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Always [`BATCH_DOC_TYPE`] for stored batches.
    pub doc_type: String,

    #[serde(rename = "ID")]
    pub id: String,

    pub batch_type: BatchType,

    /// Current custodian.
    #[serde(rename = "productionUnitID")]
    pub production_unit_id: String,

    /// Producer-side reference; not unique across the store.
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

    /// Append-only provenance log.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traceability: Vec<TraceabilityRecord>,
}

impl Batch {
    /// Stand-in for a history version that carries no value.
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_batch_document(&self) -> bool {
        self.doc_type == BATCH_DOC_TYPE
    }
}
