use serde::de::Error as _;
use tracing::{debug, info, warn};

use crate::error::TraceError;
use crate::model::{field, Batch, BATCH_DOC_TYPE};
use crate::validate::{key_exists, validate_new_batch, CreateBatchInput};

use super::StvgdService;

impl StvgdService {
    // ── Batch registry ──

    /// True when a live batch record exists under `id`.
    pub fn batch_exists(&self, id: &str) -> Result<bool, TraceError> {
        key_exists(self.kv.as_ref(), id)
    }

    /// Validate and store a new batch. Nothing is written when any rule fails.
    pub fn create_batch(&self, input: CreateBatchInput) -> Result<Batch, TraceError> {
        let batch_type = validate_new_batch(self.kv.as_ref(), &input, &self.policy)?;
        let batch = input.into_batch(batch_type);

        let mutation = Self::encode(&batch.id, &batch)?;
        self.commit(
            &format!("could not write batch [{}] to world state", batch.id),
            &[mutation],
        )?;

        info!("batch [{}] created ({})", batch.id, batch.batch_type);
        Ok(batch)
    }

    /// Read the live record of a batch.
    pub fn read_batch(&self, id: &str) -> Result<Batch, TraceError> {
        let batch: Batch = self
            .load(id)?
            .ok_or_else(|| TraceError::NotFound(id.to_string()))?;

        if !batch.is_batch_document() {
            return Err(TraceError::Deserialization {
                context: format!("could not unmarshal world state data at [{id}]"),
                source: serde_json::Error::custom(format!(
                    "expected docType \"b\", found {:?}",
                    batch.doc_type
                )),
            });
        }
        Ok(batch)
    }

    /// Remove the live record of a batch. Its history stays in the store.
    ///
    /// Only batch documents can be deleted here; any other document under
    /// `id` is reported as `NotFound` and left in place.
    pub fn delete_batch(&self, id: &str) -> Result<String, TraceError> {
        if !self.holds_batch(id)? {
            return Err(TraceError::NotFound(id.to_string()));
        }

        self.kv.delete(id).map_err(TraceError::store(format!(
            "could not delete batch [{id}] from world state"
        )))?;

        info!("batch [{}] deleted", id);
        Ok(format!("[{id}] deleted successfully"))
    }

    /// True when the live document under `id` is tagged as a batch.
    fn holds_batch(&self, id: &str) -> Result<bool, TraceError> {
        let doc: Option<serde_json::Value> = self.load(id)?;
        Ok(doc
            .as_ref()
            .and_then(|d| d.get(field::DOC_TYPE))
            .and_then(serde_json::Value::as_str)
            == Some(BATCH_DOC_TYPE))
    }

    /// Delete every available batch, one commit per batch.
    ///
    /// Deletes are not linked: if one fails, the ones before it stay
    /// applied and the error reports how far the sweep got.
    pub fn delete_all_batches(&self) -> Result<String, TraceError> {
        let batches = self.list_available_batches()?;
        if batches.is_empty() {
            return Err(TraceError::NothingToDelete);
        }

        let total = batches.len();
        for (deleted, batch) in batches.iter().enumerate() {
            debug!("deleting batch [{}] ({}/{})", batch.id, deleted + 1, total);
            if let Err(source) = self.kv.delete(&batch.id) {
                warn!(
                    "delete of all batches stopped at [{}] after {} of {}",
                    batch.id, deleted, total
                );
                return Err(TraceError::Store {
                    context: format!(
                        "could not delete batch [{}] from world state ({} of {} already deleted)",
                        batch.id, deleted, total
                    ),
                    source,
                });
            }
        }

        info!("deleted all {} batches", total);
        Ok("all batches deleted successfully".to_string())
    }
}
