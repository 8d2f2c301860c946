use chrono::{DateTime, Utc};
use stvgd_kv::KVStore;

use crate::config::ValidationPolicy;
use crate::error::{TraceError, ValidationError};
use crate::model::ActivityKind;
use crate::validate::record::{key_exists, validate_scores};

/// Checks shared by every activity: the ID has the prefix of `kind`, the ID
/// is unused, both scores are in range.
pub fn validate_new_activity(
    store: &dyn KVStore,
    kind: ActivityKind,
    id: &str,
    ecs: f64,
    ses: f64,
    policy: &ValidationPolicy,
) -> Result<(), TraceError> {
    if ActivityKind::from_id(id).ok() != Some(kind) {
        return Err(ValidationError::BadIdFormat {
            id: id.to_string(),
            expected: kind.id_prefix(),
        }
        .into());
    }

    if key_exists(store, id)? {
        return Err(TraceError::AlreadyExists(id.to_string()));
    }

    validate_scores(ecs, ses, policy)?;
    Ok(())
}

pub fn validate_period(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match end {
        Some(end) if end < start => Err(ValidationError::InvalidState(format!(
            "activity ends ({end}) before it starts ({start})"
        ))),
        _ => Ok(()),
    }
}

pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stvgd_kv::MemoryStore;

    #[test]
    fn prefix_must_match_kind() {
        let store = MemoryStore::new();
        let policy = ValidationPolicy::default();

        assert!(validate_new_activity(&store, ActivityKind::Production, "p-1", 0.0, 0.0, &policy).is_ok());

        let err = validate_new_activity(&store, ActivityKind::Production, "t-1", 0.0, 0.0, &policy)
            .unwrap_err();
        assert_eq!(err.validation().map(ValidationError::rule), Some("BAD_ID_FORMAT"));

        // "rc-" must not be mistaken for a registration.
        let err =
            validate_new_activity(&store, ActivityKind::Registration, "rc-1", 0.0, 0.0, &policy)
                .unwrap_err();
        assert_eq!(err.validation().map(ValidationError::rule), Some("BAD_ID_FORMAT"));
    }

    #[test]
    fn used_id_and_scores() {
        let store = MemoryStore::new();
        store.set("t-1", b"{}").unwrap();
        let policy = ValidationPolicy::default();

        let err = validate_new_activity(&store, ActivityKind::Transport, "t-1", 0.0, 0.0, &policy)
            .unwrap_err();
        assert!(matches!(err, TraceError::AlreadyExists(_)));

        let err = validate_new_activity(&store, ActivityKind::Transport, "t-2", 0.0, 11.0, &policy)
            .unwrap_err();
        assert_eq!(err.validation().map(ValidationError::rule), Some("SCORE_OUT_OF_RANGE"));
    }

    #[test]
    fn period_order() {
        let start = Utc::now();
        assert!(validate_period(start, None).is_ok());
        assert!(validate_period(start, Some(start)).is_ok());
        assert!(validate_period(start, Some(start - Duration::hours(1))).is_err());
    }
}
