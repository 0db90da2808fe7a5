//! Baseline normalization
//!
//! Resolves the resting HR/HRV/EDA values a reading is scored against. A
//! patient profile may carry an explicit baseline; missing or unusable values
//! fall back to the population defaults in [`BaselineMetrics::default`].

use crate::models::{BaselineMetrics, SensorReading};
use tracing::debug;

/// Default number of recent calm readings used to derive a personal baseline
pub const DEFAULT_BASELINE_WINDOW: usize = 14;

pub struct BaselineNormalizer;

impl BaselineNormalizer {
    /// Resolve the baseline for a patient, component by component.
    pub fn resolve(profile_baseline: Option<BaselineMetrics>) -> BaselineMetrics {
        let defaults = BaselineMetrics::default();
        match profile_baseline {
            None => defaults,
            Some(profile) => BaselineMetrics {
                baseline_hr: Self::usable_or(profile.baseline_hr, defaults.baseline_hr),
                baseline_hrv: Self::usable_or(profile.baseline_hrv, defaults.baseline_hrv),
                baseline_eda: Self::usable_or(profile.baseline_eda, defaults.baseline_eda),
            },
        }
    }

    fn usable_or(value: f64, fallback: f64) -> f64 {
        if value.is_finite() && value >= 0.0 {
            value
        } else {
            fallback
        }
    }

    /// Derive a personal baseline from the most recent `window` readings.
    ///
    /// Callers are expected to pass readings taken at rest. Returns `None`
    /// when there is nothing to average.
    pub fn from_calm_history(readings: &[SensorReading], window: usize) -> Option<BaselineMetrics> {
        if readings.is_empty() || window == 0 {
            return None;
        }

        let mut sorted: Vec<&SensorReading> = readings.iter().collect();
        sorted.sort_by_key(|r| r.timestamp);
        let recent = &sorted[sorted.len().saturating_sub(window)..];

        let n = recent.len() as f64;
        let baseline = BaselineMetrics {
            baseline_hr: recent.iter().map(|r| r.heart_rate).sum::<f64>() / n,
            baseline_hrv: recent.iter().map(|r| r.hrv).sum::<f64>() / n,
            baseline_eda: recent.iter().map(|r| r.eda).sum::<f64>() / n,
        };

        debug!(
            readings = recent.len(),
            hr = baseline.baseline_hr,
            hrv = baseline.baseline_hrv,
            eda = baseline.baseline_eda,
            "Derived baseline from history"
        );

        Some(baseline)
    }

    /// Signed percentage deviation of `current` from `baseline`
    pub fn deviation_pct(current: f64, baseline: f64) -> Option<f64> {
        if baseline == 0.0 || !baseline.is_finite() || !current.is_finite() {
            return None;
        }
        Some((current - baseline) / baseline * 100.0)
    }
}
