use stvgd_kv::KVError;
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these,
// never on the human-readable message string.

/// Stable error code constants.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const DESERIALIZATION_ERROR: &str = "DESERIALIZATION_ERROR";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    pub const NOTHING_TO_DELETE: &str = "NOTHING_TO_DELETE";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
}

// ── ValidationError ─────────────────────────────────────────────────

/// A rule a record broke before it could enter the world state.
///
/// Validation never has side effects: when one of these is returned,
/// nothing was written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("incorrect id prefix for [{id}] (should be [{expected}...])")]
    BadIdFormat { id: String, expected: &'static str },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unknown {kind}: {value}")]
    UnknownType { kind: &'static str, value: String },

    #[error("composition percentage sum exceeds 100 (reached {sum})")]
    CompositionOverflow { sum: f64 },

    #[error("composition percentage sum should be equal to 100 (got {sum})")]
    CompositionMismatch { sum: f64 },

    #[error("invalid percentage {value} for [{contributor}]")]
    InvalidPercentage { contributor: String, value: f64 },

    #[error("quantity should be 0+ (got {0})")]
    InvalidQuantity(f64),

    #[error("{field} score {value} is outside [{min}, {max}]")]
    ScoreOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("[{batch}] has {available} available, {requested} requested")]
    InsufficientQuantity {
        batch: String,
        requested: f64,
        available: f64,
    },

    #[error("[{0}] would become its own ancestor")]
    LineageCycle(String),

    #[error("[{0}] is listed more than once as an input")]
    DuplicateInput(String),

    #[error("production must consume at least one input batch")]
    EmptyLineage,

    #[error("declared share {declared} for [{contributor}] differs from derived {derived}")]
    DerivedCompositionMismatch {
        contributor: String,
        declared: f64,
        derived: f64,
    },
}

impl ValidationError {
    /// Fine-grained code of the violated rule.
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::BadIdFormat { .. } => "BAD_ID_FORMAT",
            ValidationError::EmptyField(_) => "EMPTY_FIELD",
            ValidationError::InvalidState(_) => "INVALID_STATE",
            ValidationError::UnknownType { .. } => "UNKNOWN_TYPE",
            ValidationError::CompositionOverflow { .. } => "COMPOSITION_OVERFLOW",
            ValidationError::CompositionMismatch { .. } => "COMPOSITION_MISMATCH",
            ValidationError::InvalidPercentage { .. } => "INVALID_PERCENTAGE",
            ValidationError::InvalidQuantity(_) => "INVALID_QUANTITY",
            ValidationError::ScoreOutOfRange { .. } => "SCORE_OUT_OF_RANGE",
            ValidationError::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            ValidationError::LineageCycle(_) => "LINEAGE_CYCLE",
            ValidationError::DuplicateInput(_) => "DUPLICATE_INPUT",
            ValidationError::EmptyLineage => "EMPTY_LINEAGE",
            ValidationError::DerivedCompositionMismatch { .. } => "DERIVED_COMPOSITION_MISMATCH",
        }
    }
}

// ── TraceError ──────────────────────────────────────────────────────

/// Error type returned by every traceability operation.
///
/// Each variant maps to a stable error code (see [`error_code`]).
#[derive(Error, Debug)]
pub enum TraceError {
    /// No live record under the key.
    #[error("[{0}] does not exist")]
    NotFound(String),

    /// Creation targeted a key that already holds a record.
    #[error("[{0}] already exists")]
    AlreadyExists(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The world state failed. Never retried here.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: KVError,
    },

    /// Stored bytes did not parse as the expected record.
    #[error("{context}: {source}")]
    Deserialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("there are no batches in world state to delete")]
    NothingToDelete,

    #[error("config error: {0}")]
    Config(String),
}

impl TraceError {
    /// Wrap a store failure with the operation it interrupted.
    pub fn store(context: impl Into<String>) -> impl FnOnce(KVError) -> TraceError {
        let context = context.into();
        move |source| TraceError::Store { context, source }
    }

    pub fn deserialization(context: impl Into<String>) -> impl FnOnce(serde_json::Error) -> TraceError {
        let context = context.into();
        move |source| TraceError::Deserialization { context, source }
    }

    pub fn serialization(context: impl Into<String>) -> impl FnOnce(serde_json::Error) -> TraceError {
        let context = context.into();
        move |source| TraceError::Serialization { context, source }
    }

    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            TraceError::NotFound(_) => error_code::NOT_FOUND,
            TraceError::AlreadyExists(_) => error_code::ALREADY_EXISTS,
            TraceError::Validation(_) => error_code::VALIDATION_FAILED,
            TraceError::Store { .. } => error_code::STORAGE_ERROR,
            TraceError::Deserialization { .. } => error_code::DESERIALIZATION_ERROR,
            TraceError::Serialization { .. } => error_code::SERIALIZATION_ERROR,
            TraceError::NothingToDelete => error_code::NOTHING_TO_DELETE,
            TraceError::Config(_) => error_code::CONFIG_ERROR,
        }
    }

    /// The violated rule, if this is a validation failure.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            TraceError::Validation(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_mapping() {
        assert_eq!(TraceError::NotFound("b-1".into()).error_code(), "NOT_FOUND");
        assert_eq!(TraceError::AlreadyExists("b-1".into()).error_code(), "ALREADY_EXISTS");
        assert_eq!(
            TraceError::from(ValidationError::EmptyLineage).error_code(),
            "VALIDATION_FAILED"
        );
        assert_eq!(TraceError::NothingToDelete.error_code(), "NOTHING_TO_DELETE");
        let store = TraceError::store("read batch b-1")(KVError::Storage("disk".into()));
        assert_eq!(store.error_code(), "STORAGE_ERROR");
    }

    #[test]
    fn store_error_carries_context() {
        let err = TraceError::store("delete batch b-9")(KVError::Storage("io".into()));
        assert_eq!(err.to_string(), "delete batch b-9: storage error: io");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn validation_display_is_transparent() {
        let err = TraceError::from(ValidationError::EmptyField("supplierID"));
        assert_eq!(err.to_string(), "supplierID must not be empty");
        assert_eq!(err.validation().map(ValidationError::rule), Some("EMPTY_FIELD"));
    }
}
