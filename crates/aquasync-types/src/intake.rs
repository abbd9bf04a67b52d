//! Intake classification for successive bottle readings.
//!
//! A sync cycle produces a remaining-volume reading in millilitres. Comparing
//! it against the previous baseline tells us whether the user drank, refilled
//! the bottle, or nothing meaningful happened. Classification is a pure
//! function of `(thresholds, baseline, reading)`; committing the resulting
//! state change (new baseline, logged ounces) is the caller's job, so running
//! the classifier twice can never double-count.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Millilitres to US fluid ounces.
pub const ML_TO_FL_OZ: f64 = 0.033814;

/// Default noise floor: level changes of at most this many mL are ignored.
pub const DEFAULT_NOISE_FLOOR_ML: f64 = 5.0;

/// Default refill threshold: level increases beyond this many mL reset the
/// baseline instead of being treated as sensor noise.
pub const DEFAULT_REFILL_THRESHOLD_ML: f64 = 50.0;

/// Invalid threshold configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("noise floor must be non-negative")]
    NegativeNoiseFloor,
    #[error("refill threshold must be positive")]
    NonPositiveRefillThreshold,
}

/// Tunable limits for the intake classifier.
///
/// The defaults were chosen empirically against the bottle sensor; they are
/// kept configurable rather than baked in.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntakeThresholds {
    /// Level changes of at most this many mL are ignored.
    pub noise_floor_ml: f64,
    /// Level increases beyond this many mL are treated as a refill.
    pub refill_threshold_ml: f64,
}

impl Default for IntakeThresholds {
    fn default() -> Self {
        Self {
            noise_floor_ml: DEFAULT_NOISE_FLOOR_ML,
            refill_threshold_ml: DEFAULT_REFILL_THRESHOLD_ML,
        }
    }
}

impl IntakeThresholds {
    /// Create thresholds with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the noise floor in millilitres.
    #[must_use]
    pub fn noise_floor_ml(mut self, ml: f64) -> Self {
        self.noise_floor_ml = ml;
        self
    }

    /// Set the refill threshold in millilitres.
    #[must_use]
    pub fn refill_threshold_ml(mut self, ml: f64) -> Self {
        self.refill_threshold_ml = ml;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.noise_floor_ml.is_nan() || self.noise_floor_ml < 0.0 {
            return Err(ThresholdError::NegativeNoiseFloor);
        }
        if self.refill_threshold_ml.is_nan() || self.refill_threshold_ml <= 0.0 {
            return Err(ThresholdError::NonPositiveRefillThreshold);
        }
        Ok(())
    }
}

/// Outcome of comparing a new reading against the stored baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntakeEvent {
    /// First-ever reading: adopt it as the baseline, log nothing.
    BaselineEstablished {
        /// The adopted baseline in mL.
        ml: f64,
    },
    /// Water was drawn down since the last reading.
    Consumed {
        /// Millilitres consumed (baseline minus reading).
        ml: f64,
        /// The same amount in fluid ounces, rounded to two decimals.
        fl_oz: f64,
        /// Millilitres remaining in the bottle; the new baseline.
        remaining_ml: f64,
    },
    /// The level rose past the refill threshold; reset the baseline.
    Refilled {
        /// Millilitres now in the bottle; the new baseline.
        ml: f64,
    },
    /// Change within the noise floor; keep the previous baseline.
    NoChange,
}

impl IntakeEvent {
    /// The baseline the caller should commit, if any.
    ///
    /// `None` means the previous baseline stays in place.
    pub fn new_baseline(&self) -> Option<f64> {
        match self {
            IntakeEvent::BaselineEstablished { ml } => Some(*ml),
            IntakeEvent::Consumed { remaining_ml, .. } => Some(*remaining_ml),
            IntakeEvent::Refilled { ml } => Some(*ml),
            IntakeEvent::NoChange => None,
        }
    }

    /// Fluid ounces to add to the day's total, if any.
    pub fn logged_fl_oz(&self) -> Option<f64> {
        match self {
            IntakeEvent::Consumed { fl_oz, .. } => Some(*fl_oz),
            _ => None,
        }
    }
}

/// Convert millilitres to fluid ounces, rounded to two decimals.
pub fn ml_to_fl_oz(ml: f64) -> f64 {
    (ml * ML_TO_FL_OZ * 100.0).round() / 100.0
}

/// Classify a new remaining-volume reading against the previous baseline.
///
/// Pure and deterministic: the same inputs always produce the same event and
/// nothing is mutated here.
///
/// # Examples
///
/// ```
/// use aquasync_types::intake::{IntakeThresholds, IntakeEvent, classify};
///
/// let thresholds = IntakeThresholds::default();
/// let event = classify(&thresholds, Some(500.0), 400.0);
/// assert_eq!(
///     event,
///     IntakeEvent::Consumed { ml: 100.0, fl_oz: 3.38, remaining_ml: 400.0 }
/// );
/// ```
pub fn classify(
    thresholds: &IntakeThresholds,
    baseline_ml: Option<f64>,
    reading_ml: f64,
) -> IntakeEvent {
    let Some(baseline) = baseline_ml else {
        return IntakeEvent::BaselineEstablished { ml: reading_ml };
    };

    let consumed = baseline - reading_ml;
    if consumed > thresholds.noise_floor_ml {
        return IntakeEvent::Consumed {
            ml: consumed,
            fl_oz: ml_to_fl_oz(consumed),
            remaining_ml: reading_ml,
        };
    }

    let increase = reading_ml - baseline;
    if increase > thresholds.refill_threshold_ml {
        return IntakeEvent::Refilled { ml: reading_ml };
    }

    IntakeEvent::NoChange
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_reading_establishes_baseline() {
        let thresholds = IntakeThresholds::default();
        for reading in [0.0, 3.0, 750.0, 10_000.0] {
            let event = classify(&thresholds, None, reading);
            assert_eq!(event, IntakeEvent::BaselineEstablished { ml: reading });
            assert_eq!(event.new_baseline(), Some(reading));
            assert_eq!(event.logged_fl_oz(), None);
        }
    }

    #[test]
    fn test_consumption_converts_to_ounces() {
        let event = classify(&IntakeThresholds::default(), Some(500.0), 400.0);
        assert_eq!(
            event,
            IntakeEvent::Consumed {
                ml: 100.0,
                fl_oz: 3.38,
                remaining_ml: 400.0
            }
        );
        assert_eq!(event.new_baseline(), Some(400.0));
        assert_eq!(event.logged_fl_oz(), Some(3.38));
    }

    #[test]
    fn test_refill_resets_baseline_without_intake() {
        let event = classify(&IntakeThresholds::default(), Some(100.0), 300.0);
        assert_eq!(event, IntakeEvent::Refilled { ml: 300.0 });
        assert_eq!(event.new_baseline(), Some(300.0));
        assert_eq!(event.logged_fl_oz(), None);
    }

    #[test]
    fn test_noise_floor_boundary() {
        let thresholds = IntakeThresholds::default();
        // delta = 3 is within the 5 mL floor
        assert_eq!(classify(&thresholds, Some(500.0), 497.0), IntakeEvent::NoChange);
        // delta = 5 is still not "more than" the floor
        assert_eq!(classify(&thresholds, Some(500.0), 495.0), IntakeEvent::NoChange);
        // delta = 6 crosses it
        assert!(matches!(
            classify(&thresholds, Some(500.0), 494.0),
            IntakeEvent::Consumed { .. }
        ));
    }

    #[test]
    fn test_refill_threshold_boundary() {
        let thresholds = IntakeThresholds::default();
        assert_eq!(classify(&thresholds, Some(100.0), 150.0), IntakeEvent::NoChange);
        assert_eq!(
            classify(&thresholds, Some(100.0), 151.0),
            IntakeEvent::Refilled { ml: 151.0 }
        );
    }

    #[test]
    fn test_unchanged_reading_is_idempotent() {
        let thresholds = IntakeThresholds::default();
        let first = classify(&thresholds, Some(500.0), 500.0);
        let second = classify(&thresholds, Some(500.0), 500.0);
        assert_eq!(first, IntakeEvent::NoChange);
        assert_eq!(first, second);
        assert_eq!(first.new_baseline(), None);
    }

    #[test]
    fn test_custom_thresholds() {
        let strict = IntakeThresholds::new()
            .noise_floor_ml(0.0)
            .refill_threshold_ml(10.0);
        assert!(matches!(
            classify(&strict, Some(500.0), 499.0),
            IntakeEvent::Consumed { .. }
        ));
        assert_eq!(
            classify(&strict, Some(100.0), 111.0),
            IntakeEvent::Refilled { ml: 111.0 }
        );
    }

    #[test]
    fn test_threshold_validation() {
        assert!(IntakeThresholds::default().validate().is_ok());
        assert_eq!(
            IntakeThresholds::new().noise_floor_ml(-1.0).validate(),
            Err(ThresholdError::NegativeNoiseFloor)
        );
        assert_eq!(
            IntakeThresholds::new().refill_threshold_ml(0.0).validate(),
            Err(ThresholdError::NonPositiveRefillThreshold)
        );
    }

    #[test]
    fn test_ml_to_fl_oz_rounding() {
        assert_eq!(ml_to_fl_oz(100.0), 3.38);
        assert_eq!(ml_to_fl_oz(500.0), 16.91);
        assert_eq!(ml_to_fl_oz(0.0), 0.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_event_serialization_round_trip() {
        let event = IntakeEvent::Consumed {
            ml: 100.0,
            fl_oz: 3.38,
            remaining_ml: 400.0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Consumed"));
        let back: IntakeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    proptest! {
        #[test]
        fn prop_classification_is_deterministic(
            baseline in proptest::option::of(0.0f64..5_000.0),
            reading in 0.0f64..5_000.0,
        ) {
            let thresholds = IntakeThresholds::default();
            prop_assert_eq!(
                classify(&thresholds, baseline, reading),
                classify(&thresholds, baseline, reading)
            );
        }

        #[test]
        fn prop_events_respect_thresholds(
            baseline in 0.0f64..5_000.0,
            reading in 0.0f64..5_000.0,
        ) {
            let thresholds = IntakeThresholds::default();
            match classify(&thresholds, Some(baseline), reading) {
                IntakeEvent::Consumed { ml, remaining_ml, .. } => {
                    prop_assert!(ml > thresholds.noise_floor_ml);
                    prop_assert_eq!(remaining_ml, reading);
                }
                IntakeEvent::Refilled { ml } => {
                    prop_assert!(ml - baseline > thresholds.refill_threshold_ml);
                }
                IntakeEvent::NoChange => {
                    prop_assert!(baseline - reading <= thresholds.noise_floor_ml);
                    prop_assert!(reading - baseline <= thresholds.refill_threshold_ml);
                }
                IntakeEvent::BaselineEstablished { .. } => {
                    prop_assert!(false, "baseline was provided");
                }
            }
        }
    }
}
