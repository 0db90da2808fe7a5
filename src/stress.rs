//! Stress scoring
//!
//! A reading is scored by how far each signal sits from the patient's
//! baseline. Heart rate and EDA above baseline push the score up; HRV below
//! baseline pushes it up. The weighted deviation sum is centered on the
//! midpoint of the 0-100 scale; a reading exactly at baseline lands a hair
//! under 50 so that resting readings classify as calm.

use crate::models::{BaselineMetrics, SensorReading, StressState, MAX_STRESS, MIN_STRESS};
use serde::{Deserialize, Serialize};

/// Denominator floor for baseline components of zero
pub const BASELINE_EPSILON: f64 = 1e-6;

/// Score of a reading that matches baseline exactly. Rounds to 50.0 at
/// report precision and stays inside the calm band.
pub const BASELINE_SCORE: f64 = 49.99;

/// Weights for combining signal deviations into a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of heart-rate elevation
    pub hr_weight: f64,

    /// Weight of HRV suppression
    pub hrv_weight: f64,

    /// Weight of EDA elevation
    pub eda_weight: f64,

    /// Score points per unit of weighted fractional deviation
    pub scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            hr_weight: 0.4,
            hrv_weight: 0.3,
            eda_weight: 0.3,
            scale: 50.0,
        }
    }
}

impl ScoringConfig {
    /// Negative weights would invert the monotonic relationship of a signal
    pub fn is_valid(&self) -> bool {
        [self.hr_weight, self.hrv_weight, self.eda_weight, self.scale]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Per-signal fractional deviations, kept for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalDeviations {
    pub heart_rate: f64,
    pub hrv: f64,
    pub eda: f64,
}

pub struct StressScorer {
    config: ScoringConfig,
}

impl StressScorer {
    pub fn new() -> Self {
        StressScorer {
            config: ScoringConfig::default(),
        }
    }

    /// Custom weights; invalid configurations fall back to the defaults.
    pub fn with_config(config: ScoringConfig) -> Self {
        if config.is_valid() {
            StressScorer { config }
        } else {
            tracing::warn!(?config, "Invalid scoring weights, using defaults");
            Self::new()
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Fractional deviation of each signal in its stress-increasing direction
    pub fn deviations(
        heart_rate: f64,
        hrv: f64,
        eda: f64,
        baseline: &BaselineMetrics,
    ) -> SignalDeviations {
        SignalDeviations {
            heart_rate: (heart_rate - baseline.baseline_hr) / baseline.baseline_hr.max(BASELINE_EPSILON),
            hrv: (baseline.baseline_hrv - hrv) / baseline.baseline_hrv.max(BASELINE_EPSILON),
            eda: (eda - baseline.baseline_eda) / baseline.baseline_eda.max(BASELINE_EPSILON),
        }
    }

    /// Score raw signal values against a baseline. Always in [0, 100].
    pub fn score_values(&self, heart_rate: f64, hrv: f64, eda: f64, baseline: &BaselineMetrics) -> f64 {
        let dev = Self::deviations(heart_rate, hrv, eda, baseline);
        let weighted = self.config.hr_weight * dev.heart_rate
            + self.config.hrv_weight * dev.hrv
            + self.config.eda_weight * dev.eda;

        let raw = BASELINE_SCORE + self.config.scale * weighted;
        if raw.is_nan() {
            return BASELINE_SCORE;
        }
        raw.clamp(MIN_STRESS, MAX_STRESS)
    }

    pub fn score(&self, reading: &SensorReading, baseline: &BaselineMetrics) -> f64 {
        self.score_values(reading.heart_rate, reading.hrv, reading.eda, baseline)
    }

    /// Score and classify in one step
    pub fn assess(&self, reading: &SensorReading, baseline: &BaselineMetrics) -> (f64, StressState) {
        let score = self.score(reading, baseline);
        (score, StressState::from_score(score))
    }
}

impl Default for StressScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_baseline() -> BaselineMetrics {
        BaselineMetrics::default()
    }

    #[test]
    fn test_baseline_reading_scores_midpoint() {
        let scorer = StressScorer::new();
        let score = scorer.score_values(70.0, 50.0, 10.0, &default_baseline());
        assert!((score - 50.0).abs() < 0.05);
        assert_eq!(crate::models::round1(score), 50.0);
        assert_eq!(StressState::from_score(score), StressState::Calm);
    }

    #[test]
    fn test_moderate_reading() {
        let scorer = StressScorer::new();
        let score = scorer.score_values(100.0, 30.0, 20.0, &default_baseline());
        assert!(score > 65.0, "score was {}", score);
        assert!(matches!(
            StressState::from_score(score),
            StressState::Rising | StressState::Overload
        ));
    }

    #[test]
    fn test_severe_reading_is_overload() {
        let scorer = StressScorer::new();
        let score = scorer.score_values(150.0, 10.0, 50.0, &default_baseline());
        assert!(score > 85.0);
        assert_eq!(StressState::from_score(score), StressState::Overload);
    }

    #[test]
    fn test_relaxed_reading_is_calm() {
        let scorer = StressScorer::new();
        let score = scorer.score_values(60.0, 70.0, 6.0, &default_baseline());
        assert!(score < 50.0);
        assert_eq!(StressState::from_score(score), StressState::Calm);
    }

    #[test]
    fn test_zero_baseline_does_not_divide_by_zero() {
        let scorer = StressScorer::new();
        let baseline = BaselineMetrics::new(0.0, 0.0, 0.0);
        let score = scorer.score_values(300.0, 0.0, 100.0, &baseline);
        assert!(score.is_finite());
        assert_eq!(score, 100.0);

        let score = scorer.score_values(0.0, 0.0, 0.0, &baseline);
        assert_eq!(score, BASELINE_SCORE);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let scorer = StressScorer::with_config(ScoringConfig {
            hr_weight: -1.0,
            ..ScoringConfig::default()
        });
        assert_eq!(scorer.config(), &ScoringConfig::default());
    }

    #[test]
    fn test_deviations_direction() {
        let dev = StressScorer::deviations(77.0, 40.0, 12.0, &default_baseline());
        assert!((dev.heart_rate - 0.1).abs() < 1e-9);
        assert!((dev.hrv - 0.2).abs() < 1e-9);
        assert!((dev.eda - 0.2).abs() < 1e-9);
    }

    use proptest::prelude::*;

    fn baseline_strategy() -> impl Strategy<Value = BaselineMetrics> {
        (0.0f64..200.0, 0.0f64..300.0, 0.0f64..60.0)
            .prop_map(|(hr, hrv, eda)| BaselineMetrics::new(hr, hrv, eda))
    }

    proptest! {
        #[test]
        fn test_score_is_bounded(
            hr in 0.0f64..=300.0,
            hrv in 0.0f64..=500.0,
            eda in 0.0f64..=100.0,
            baseline in baseline_strategy()
        ) {
            let score = StressScorer::new().score_values(hr, hrv, eda, &baseline);
            prop_assert!(score.is_finite());
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn test_score_monotonic_in_heart_rate(
            hr in 0.0f64..=300.0,
            delta in 0.0f64..50.0,
            hrv in 0.0f64..=500.0,
            eda in 0.0f64..=100.0,
            baseline in baseline_strategy()
        ) {
            let scorer = StressScorer::new();
            let lower = scorer.score_values(hr, hrv, eda, &baseline);
            let higher = scorer.score_values((hr + delta).min(300.0), hrv, eda, &baseline);
            prop_assert!(higher >= lower);
        }

        #[test]
        fn test_score_inverse_in_hrv(
            hr in 0.0f64..=300.0,
            hrv in 0.0f64..=500.0,
            delta in 0.0f64..100.0,
            eda in 0.0f64..=100.0,
            baseline in baseline_strategy()
        ) {
            let scorer = StressScorer::new();
            let lower_hrv = scorer.score_values(hr, hrv, eda, &baseline);
            let higher_hrv = scorer.score_values(hr, (hrv + delta).min(500.0), eda, &baseline);
            prop_assert!(higher_hrv <= lower_hrv);
        }

        #[test]
        fn test_score_monotonic_in_eda(
            hr in 0.0f64..=300.0,
            hrv in 0.0f64..=500.0,
            eda in 0.0f64..=100.0,
            delta in 0.0f64..20.0,
            baseline in baseline_strategy()
        ) {
            let scorer = StressScorer::new();
            let lower = scorer.score_values(hr, hrv, eda, &baseline);
            let higher = scorer.score_values(hr, hrv, (eda + delta).min(100.0), &baseline);
            prop_assert!(higher >= lower);
        }

        #[test]
        fn test_baseline_inputs_score_midpoint(baseline in baseline_strategy()) {
            let score = StressScorer::new().score_values(
                baseline.baseline_hr,
                baseline.baseline_hrv,
                baseline.baseline_eda,
                &baseline,
            );
            prop_assert!((score - 50.0).abs() < 0.05);
        }
    }
}
