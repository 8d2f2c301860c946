//! Rules a record must satisfy before it is written to the world state.

pub mod activity;
pub mod composition;
pub mod record;

pub use activity::{validate_new_activity, validate_period};
pub use composition::{validate_composition, PERCENT_TOTAL};
pub use record::{
    key_exists, validate_batch_id, validate_new_batch, validate_quantity, validate_score,
    validate_scores, CreateBatchInput,
};
