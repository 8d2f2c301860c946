use crate::config::ValidationPolicy;
use crate::error::ValidationError;
use crate::model::Composition;

/// Total every composition must reach.
pub const PERCENT_TOTAL: f64 = 100.0;

/// Check that a composition's percentages add up to 100.
///
/// Shares are accumulated in map order and the walk stops as soon as the
/// running total passes 100, so an overflowing composition is rejected
/// without a second pass. Both comparisons allow
/// `policy.composition_tolerance` of slack so that inputs such as
/// 33.33 + 33.33 + 33.34 are not rejected for float rounding.
///
/// Non-finite shares are always rejected; negative shares only when
/// `policy.allow_negative_shares` is off.
pub fn validate_composition(
    composition: &Composition,
    policy: &ValidationPolicy,
) -> Result<(), ValidationError> {
    let tolerance = policy.composition_tolerance;
    let mut sum = 0.0_f64;

    for (contributor, &share) in composition {
        if !share.is_finite() || (share < 0.0 && !policy.allow_negative_shares) {
            return Err(ValidationError::InvalidPercentage {
                contributor: contributor.clone(),
                value: share,
            });
        }
        sum += share;
        if sum > PERCENT_TOTAL + tolerance {
            return Err(ValidationError::CompositionOverflow { sum });
        }
    }

    if (sum - PERCENT_TOTAL).abs() > tolerance {
        return Err(ValidationError::CompositionMismatch { sum });
    }
    Ok(())
}
