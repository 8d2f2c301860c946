//! Traceability activities: the events recorded against batches.
//!
//! Each activity is stored on its own under its ID and also appended to the
//! `traceability` log of every batch it touched. Both copies serialize
//! through [`TraceabilityRecord`], whose `docType` tag tells the kinds apart.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Kind of activity, derived from its ID prefix or its `docType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Registration,
    Production,
    Transport,
    Reception,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        ActivityKind::Registration,
        ActivityKind::Production,
        ActivityKind::Transport,
        ActivityKind::Reception,
    ];

    pub fn doc_type(&self) -> &'static str {
        match self {
            ActivityKind::Registration => "rg",
            ActivityKind::Production => "p",
            ActivityKind::Transport => "t",
            ActivityKind::Reception => "rc",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            ActivityKind::Registration => "rg-",
            ActivityKind::Production => "p-",
            ActivityKind::Transport => "t-",
            ActivityKind::Reception => "rc-",
        }
    }

    /// Classify an activity ID by its prefix.
    pub fn from_id(id: &str) -> Result<Self, ValidationError> {
        ActivityKind::ALL
            .into_iter()
            .find(|k| id.starts_with(k.id_prefix()) && id.len() > k.id_prefix().len())
            .ok_or_else(|| ValidationError::BadIdFormat {
                id: id.to_string(),
                expected: "rg-|p-|t-|rc-",
            })
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityKind::Registration => "registration",
            ActivityKind::Production => "production",
            ActivityKind::Transport => "transport",
            ActivityKind::Reception => "reception",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionType {
    Spinning,
    Weaving,
    Knitting,
    DyeingFinishing,
    Confection,
}

impl FromStr for ProductionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SPINNING" => Ok(ProductionType::Spinning),
            "WEAVING" => Ok(ProductionType::Weaving),
            "KNITTING" => Ok(ProductionType::Knitting),
            "DYEING_FINISHING" => Ok(ProductionType::DyeingFinishing),
            "CONFECTION" => Ok(ProductionType::Confection),
            other => Err(ValidationError::UnknownType {
                kind: "production type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportType {
    TerrestrialSmall,
    TerrestrialBig,
    Maritime,
    Aerial,
    Railroader,
}

impl FromStr for TransportType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TERRESTRIAL_SMALL" => Ok(TransportType::TerrestrialSmall),
            "TERRESTRIAL_BIG" => Ok(TransportType::TerrestrialBig),
            "MARITIME" => Ok(TransportType::Maritime),
            "AERIAL" => Ok(TransportType::Aerial),
            "RAILROADER" => Ok(TransportType::Railroader),
            other => Err(ValidationError::UnknownType {
                kind: "transport type",
                value: other.to_string(),
            }),
        }
    }
}

/// First entry into the chain: a supplier's batch registered by a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "productionUnitID")]
    pub production_unit_id: String,
    #[serde(rename = "batchID")]
    pub batch_id: String,
    pub activity_date: DateTime<Utc>,
    pub ecs: f64,
    pub ses: f64,
}

/// A unit turning input batches into a new output batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Production {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "productionUnitID")]
    pub production_unit_id: String,
    pub production_type: ProductionType,
    /// Input batch ID → quantity consumed.
    pub input_batches: BTreeMap<String, f64>,
    #[serde(rename = "outputBatchID")]
    pub output_batch_id: String,
    pub activity_start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_end_date: Option<DateTime<Utc>>,
    pub ecs: f64,
    pub ses: f64,
}

/// A batch leaving one unit for another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transport {
    #[serde(rename = "ID")]
    pub id: String,
    pub transport_type: TransportType,
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

/// A unit taking custody of a transported batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reception {
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

/// One entry of a batch's traceability log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "docType")]
pub enum TraceabilityRecord {
    #[serde(rename = "rg")]
    Registration(Registration),
    #[serde(rename = "p")]
    Production(Production),
    #[serde(rename = "t")]
    Transport(Transport),
    #[serde(rename = "rc")]
    Reception(Reception),
}

impl TraceabilityRecord {
    pub fn id(&self) -> &str {
        match self {
            TraceabilityRecord::Registration(r) => &r.id,
            TraceabilityRecord::Production(p) => &p.id,
            TraceabilityRecord::Transport(t) => &t.id,
            TraceabilityRecord::Reception(r) => &r.id,
        }
    }

    pub fn kind(&self) -> ActivityKind {
        match self {
            TraceabilityRecord::Registration(_) => ActivityKind::Registration,
            TraceabilityRecord::Production(_) => ActivityKind::Production,
            TraceabilityRecord::Transport(_) => ActivityKind::Transport,
            TraceabilityRecord::Reception(_) => ActivityKind::Reception,
        }
    }
}

impl From<Registration> for TraceabilityRecord {
    fn from(r: Registration) -> Self {
        TraceabilityRecord::Registration(r)
    }
}

impl From<Production> for TraceabilityRecord {
    fn from(p: Production) -> Self {
        TraceabilityRecord::Production(p)
    }
}

impl From<Transport> for TraceabilityRecord {
    fn from(t: Transport) -> Self {
        TraceabilityRecord::Transport(t)
    }
}

impl From<Reception> for TraceabilityRecord {
    fn from(r: Reception) -> Self {
        TraceabilityRecord::Reception(r)
    }
}
