//! Declared parameter fields: user-facing names, defaults and ranges.
//!
//! Parameter structs take their defaults from here and validation checks
//! values against the same ranges, so a form built from
//! [`crate::SegmentationAlgorithm::fields`] and the engines agree on what
//! is accepted.

use serde::Serialize;

use crate::types::SegmentationError;

/// One numeric parameter of an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldDescription {
    /// Field name in the serialized parameters.
    pub name: &'static str,
    /// Label shown to users.
    pub user_name: &'static str,
    pub default: f64,
    /// Inclusive `(min, max)`.
    pub range: (f64, f64),
}

impl FieldDescription {
    const fn new(
        name: &'static str,
        user_name: &'static str,
        default: f64,
        range: (f64, f64),
    ) -> Self {
        Self {
            name,
            user_name,
            default,
            range,
        }
    }

    /// Check `value` against the declared range.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidParameter`] naming the field if
    /// `value` is outside the range or not a number.
    pub fn check(&self, value: f64) -> Result<(), SegmentationError> {
        let (min, max) = self.range;
        if value >= min && value <= max {
            Ok(())
        } else {
            Err(SegmentationError::InvalidParameter(format!(
                "{} must be in [{min}, {max}], got {value}",
                self.name
            )))
        }
    }

    /// Check an integer-valued field.
    ///
    /// # Errors
    ///
    /// Same as [`Self::check`].
    #[allow(clippy::cast_precision_loss)]
    pub fn check_count(&self, value: usize) -> Result<(), SegmentationError> {
        self.check(value as f64)
    }
}

const MILLION: f64 = 1_000_000.0;

pub const CHANNEL: FieldDescription =
    FieldDescription::new("channel", "Channel", 0.0, (0.0, MILLION));
pub const THRESHOLD: FieldDescription =
    FieldDescription::new("threshold", "Threshold", 10_000.0, (0.0, MILLION));
pub const PREVIEW_THRESHOLD: FieldDescription =
    FieldDescription::new("threshold", "Threshold", 1_000.0, (0.0, MILLION));
pub const CORE_THRESHOLD: FieldDescription =
    FieldDescription::new("core_threshold", "Core threshold", 20_000.0, (0.0, MILLION));
pub const BASE_THRESHOLD: FieldDescription =
    FieldDescription::new("base_threshold", "Base threshold", 10_000.0, (0.0, MILLION));
pub const SUGGESTED_SIZE: FieldDescription =
    FieldDescription::new("suggested_size", "Suggested size", 200_000.0, (0.0, MILLION));
pub const MINIMUM_SIZE: FieldDescription =
    FieldDescription::new("minimum_size", "Minimum size", 8_000.0, (20.0, MILLION));
pub const CLOSE_HOLES_SIZE: FieldDescription =
    FieldDescription::new("close_holes_size", "Small holes size", 200.0, (0.0, 1_000.0));
pub const SMOOTH_BORDER_RADIUS: FieldDescription =
    FieldDescription::new("smooth_border_radius", "Smooth borders radius", 2.0, (0.0, 20.0));
pub const SUPPORT_LEVEL: FieldDescription =
    FieldDescription::new("support_level", "Support level", 1.0, (1.0, f64::INFINITY));
pub const MAX_STEPS: FieldDescription =
    FieldDescription::new("max_steps", "Max steps", 1.0, (1.0, f64::INFINITY));
pub const GAUSS_RADIUS: FieldDescription =
    FieldDescription::new("gauss_radius", "Gauss radius", 1.0, (0.0, 10.0));

/// Fields of the threshold preview.
pub const PREVIEW_FIELDS: &[FieldDescription] = &[CHANNEL, PREVIEW_THRESHOLD];

/// Fields of the single and range threshold engines.
pub const THRESHOLD_FIELDS: &[FieldDescription] =
    &[CHANNEL, THRESHOLD, MINIMUM_SIZE, CLOSE_HOLES_SIZE, SMOOTH_BORDER_RADIUS];

/// Fields of the auto threshold engine.
pub const AUTO_THRESHOLD_FIELDS: &[FieldDescription] = &[
    CHANNEL,
    SUGGESTED_SIZE,
    THRESHOLD,
    MINIMUM_SIZE,
    CLOSE_HOLES_SIZE,
    SMOOTH_BORDER_RADIUS,
];

/// Fields of the flow engine.
pub const FLOW_FIELDS: &[FieldDescription] = &[
    CHANNEL,
    CORE_THRESHOLD,
    BASE_THRESHOLD,
    MINIMUM_SIZE,
    CLOSE_HOLES_SIZE,
    SMOOTH_BORDER_RADIUS,
];

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        for field in [
            CHANNEL,
            THRESHOLD,
            PREVIEW_THRESHOLD,
            CORE_THRESHOLD,
            BASE_THRESHOLD,
            SUGGESTED_SIZE,
            MINIMUM_SIZE,
            CLOSE_HOLES_SIZE,
            SMOOTH_BORDER_RADIUS,
            SUPPORT_LEVEL,
            MAX_STEPS,
            GAUSS_RADIUS,
        ] {
            assert!(field.check(field.default).is_ok(), "{}", field.name);
        }
    }

    #[test]
    fn range_is_inclusive() {
        assert!(MINIMUM_SIZE.check(20.0).is_ok());
        assert!(MINIMUM_SIZE.check(19.0).is_err());
        assert!(THRESHOLD.check(1_000_000.0).is_ok());
    }

    #[test]
    fn vote_counts_have_no_upper_bound() {
        assert!(SUPPORT_LEVEL.check_count(27).is_ok());
        assert!(MAX_STEPS.check_count(101).is_ok());
        assert!(SUPPORT_LEVEL.check_count(0).is_err());
        assert!(MAX_STEPS.check_count(0).is_err());
    }

    #[test]
    fn nan_is_rejected() {
        let err = THRESHOLD.check(f64::NAN).unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn serializes_for_forms() {
        let json = serde_json::to_value(MINIMUM_SIZE).unwrap();
        assert_eq!(json["user_name"], "Minimum size");
        assert_eq!(json["range"][0], 20.0);
    }
}
