use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Batch;

/// One version of a batch key, as rebuilt from the world-state log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Snapshot at this version; [`Batch::placeholder`] when the version
    /// carried no value.
    pub record: Batch,
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
}
