//! Batch provenance for a textile supply chain.
//!
//! Batches enter the world state through registration or production, move
//! between units by transport and reception, and keep an append-only
//! traceability log. [`StvgdService`] validates every record before it is
//! written and reconstructs history and lineage from the versioned store.

pub mod config;
pub mod error;
pub mod lineage;
pub mod model;
pub mod service;
pub mod validate;

#[cfg(test)]
mod testing;

pub use config::{StvgdConfig, ValidationPolicy};
pub use error::{error_code, TraceError, ValidationError};
pub use lineage::{InputBatch, LineageEdge, LineageNode, Provenance};
pub use service::{
    ProductionInput, ReceptionInput, RegistrationInput, StvgdService, TransportInput,
};
pub use validate::CreateBatchInput;
