//! Medication adherence vs. stress correlation
//!
//! Each dose is paired with the mean stress of the readings that follow it
//! within the association window. The Pearson coefficient between the dose
//! indicator (1 taken, 0 missed) and that mean tells whether taking the
//! medication goes along with lower stress.

use crate::models::{DoseLog, ScorePoint};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Minimum |coefficient| considered a meaningful association
pub const IMPACT_THRESHOLD: f64 = 0.3;

/// Observed effect of adherence on stress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    /// Taking the medication goes with lower stress
    Positive,
    /// Taking the medication goes with higher stress
    Negative,
    Neutral,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Positive => write!(f, "positive"),
            Impact::Negative => write!(f, "negative"),
            Impact::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// Pearson coefficient in [-1, 1]
    pub coefficient: f64,
    pub overall_adherence_rate: f64,
    pub stress_with_adherence: f64,
    pub stress_without_adherence: f64,
    pub impact: Impact,
    /// Doses that had at least one associated reading
    pub doses_analyzed: usize,
}

impl CorrelationResult {
    fn neutral(overall_adherence_rate: f64) -> Self {
        CorrelationResult {
            coefficient: 0.0,
            overall_adherence_rate,
            stress_with_adherence: 0.0,
            stress_without_adherence: 0.0,
            impact: Impact::Neutral,
            doses_analyzed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Hours after a dose whose readings are attributed to it
    pub association_window_hours: i64,
}

impl CorrelationConfig {
    /// Longest association window accepted from configuration (one week)
    pub const MAX_WINDOW_HOURS: i64 = 168;

    pub fn is_valid(&self) -> bool {
        (1..=Self::MAX_WINDOW_HOURS).contains(&self.association_window_hours)
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        CorrelationConfig {
            association_window_hours: 12,
        }
    }
}

pub struct CorrelationAnalyzer {
    config: CorrelationConfig,
}

impl CorrelationAnalyzer {
    pub fn new() -> Self {
        CorrelationAnalyzer {
            config: CorrelationConfig::default(),
        }
    }

    pub fn with_config(config: CorrelationConfig) -> Self {
        CorrelationAnalyzer { config }
    }

    /// Correlate all doses, regardless of medication
    pub fn analyze(&self, doses: &[DoseLog], scores: &[ScorePoint]) -> CorrelationResult {
        let adherence = adherence_rate(doses);
        let pairs = self.pair_doses(doses, scores);

        if pairs.is_empty() {
            debug!(doses = doses.len(), "No doses with associated readings");
            return CorrelationResult::neutral(adherence);
        }

        let indicators: Vec<f64> = pairs.iter().map(|(taken, _)| if *taken { 1.0 } else { 0.0 }).collect();
        let stress: Vec<f64> = pairs.iter().map(|(_, mean)| *mean).collect();
        let coefficient = pearson(&indicators, &stress);

        let with = mean_where(&pairs, true);
        let without = mean_where(&pairs, false);
        let impact = classify_impact(coefficient, with, without);

        info!(
            doses = doses.len(),
            analyzed = pairs.len(),
            coefficient,
            %impact,
            "Adherence correlation computed"
        );

        CorrelationResult {
            coefficient,
            overall_adherence_rate: adherence,
            stress_with_adherence: with,
            stress_without_adherence: without,
            impact,
            doses_analyzed: pairs.len(),
        }
    }

    /// One result per medication name, ordered by name
    pub fn analyze_by_medication(
        &self,
        doses: &[DoseLog],
        scores: &[ScorePoint],
    ) -> BTreeMap<String, CorrelationResult> {
        let mut grouped: BTreeMap<String, Vec<DoseLog>> = BTreeMap::new();
        for dose in doses {
            grouped
                .entry(dose.medication.trim().to_string())
                .or_default()
                .push(dose.clone());
        }

        grouped
            .into_iter()
            .map(|(name, logs)| {
                let result = self.analyze(&logs, scores);
                (name, result)
            })
            .collect()
    }

    /// (taken, mean stress) for every dose with readings in its window
    fn pair_doses(&self, doses: &[DoseLog], scores: &[ScorePoint]) -> Vec<(bool, f64)> {
        let window = match TimeDelta::try_hours(self.config.association_window_hours.max(0)) {
            Some(window) => window,
            None => {
                warn!(
                    hours = self.config.association_window_hours,
                    "Association window out of range, no doses paired"
                );
                return Vec::new();
            }
        };

        doses
            .iter()
            .filter_map(|dose| {
                let end = dose.timestamp.checked_add_signed(window)?;
                let associated: Vec<f64> = scores
                    .iter()
                    .filter(|p| p.timestamp >= dose.timestamp && p.timestamp < end)
                    .map(|p| p.score)
                    .filter(|s| s.is_finite())
                    .collect();

                if associated.is_empty() {
                    None
                } else {
                    let mean = associated.iter().sum::<f64>() / associated.len() as f64;
                    Some((dose.is_taken(), mean))
                }
            })
            .collect()
    }
}

impl Default for CorrelationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fraction of doses taken; 0 when there are none
pub fn adherence_rate(doses: &[DoseLog]) -> f64 {
    if doses.is_empty() {
        return 0.0;
    }
    doses.iter().filter(|d| d.is_taken()).count() as f64 / doses.len() as f64
}

fn mean_where(pairs: &[(bool, f64)], taken: bool) -> f64 {
    let values: Vec<f64> = pairs.iter().filter(|(t, _)| *t == taken).map(|(_, s)| *s).collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn classify_impact(coefficient: f64, with: f64, without: f64) -> Impact {
    if coefficient <= -IMPACT_THRESHOLD && with < without {
        Impact::Positive
    } else if coefficient >= IMPACT_THRESHOLD && with > without {
        Impact::Negative
    } else {
        Impact::Neutral
    }
}

/// Pearson correlation of two equally long series.
///
/// Fewer than two pairs, zero variance in either series, or non-finite input
/// give 0. The result is clamped to [-1, 1].
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }

    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if !denom.is_finite() || denom < 1e-12 {
        return 0.0;
    }

    let r = cov / denom;
    if r.is_finite() {
        r.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DoseStatus;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 8, 0, 0).unwrap()
    }

    fn dose(d: u32, medication: &str, status: DoseStatus) -> DoseLog {
        DoseLog {
            timestamp: day(d),
            medication: medication.to_string(),
            status,
        }
    }

    fn points_after(d: u32, scores: &[f64]) -> Vec<ScorePoint> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| ScorePoint::new(day(d) + Duration::hours(i as i64 + 1), *s))
            .collect()
    }

    #[test]
    fn test_pearson_perfect() {
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-9);
        assert!((pearson(&[1.0, 2.0, 3.0], &[6.0, 4.0, 2.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_degenerate() {
        assert_eq!(pearson(&[], &[]), 0.0);
        assert_eq!(pearson(&[1.0], &[5.0]), 0.0);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[3.0, 4.0, 5.0]), 0.0);
        assert_eq!(pearson(&[1.0, 0.0], &[f64::NAN, 3.0]), 0.0);
    }

    #[test]
    fn test_no_doses() {
        let result = CorrelationAnalyzer::new().analyze(&[], &points_after(1, &[40.0]));
        assert_eq!(result.coefficient, 0.0);
        assert_eq!(result.overall_adherence_rate, 0.0);
        assert_eq!(result.impact, Impact::Neutral);
        assert_eq!(result.doses_analyzed, 0);
    }

    #[test]
    fn test_taken_doses_with_lower_stress_are_positive() {
        let doses = vec![
            dose(1, "sertraline", DoseStatus::Taken),
            dose(2, "sertraline", DoseStatus::Missed),
            dose(3, "sertraline", DoseStatus::Taken),
            dose(4, "sertraline", DoseStatus::Missed),
        ];
        let mut scores = points_after(1, &[30.0, 35.0]);
        scores.extend(points_after(2, &[70.0, 75.0]));
        scores.extend(points_after(3, &[32.0]));
        scores.extend(points_after(4, &[68.0]));

        let result = CorrelationAnalyzer::new().analyze(&doses, &scores);
        assert_eq!(result.overall_adherence_rate, 0.5);
        assert_eq!(result.doses_analyzed, 4);
        assert!(result.coefficient < -0.9);
        assert!(result.stress_with_adherence < result.stress_without_adherence);
        assert_eq!(result.impact, Impact::Positive);
    }

    #[test]
    fn test_taken_doses_with_higher_stress_are_negative() {
        let doses = vec![
            dose(1, "med", DoseStatus::Taken),
            dose(2, "med", DoseStatus::Missed),
            dose(3, "med", DoseStatus::Taken),
        ];
        let mut scores = points_after(1, &[80.0]);
        scores.extend(points_after(2, &[30.0]));
        scores.extend(points_after(3, &[78.0]));

        let result = CorrelationAnalyzer::new().analyze(&doses, &scores);
        assert!(result.coefficient > 0.9);
        assert_eq!(result.impact, Impact::Negative);
    }

    #[test]
    fn test_doses_without_readings_are_excluded() {
        let doses = vec![
            dose(1, "med", DoseStatus::Taken),
            dose(2, "med", DoseStatus::Missed),
            dose(10, "med", DoseStatus::Missed),
        ];
        let mut scores = points_after(1, &[40.0]);
        scores.extend(points_after(2, &[60.0]));

        let result = CorrelationAnalyzer::new().analyze(&doses, &scores);
        assert_eq!(result.doses_analyzed, 2);
        assert!((result.overall_adherence_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.stress_without_adherence, 60.0);
    }

    #[test]
    fn test_readings_outside_window_are_not_associated() {
        let doses = vec![dose(1, "med", DoseStatus::Taken)];
        let scores = vec![
            ScorePoint::new(day(1) - Duration::minutes(1), 90.0),
            ScorePoint::new(day(1) + Duration::hours(12), 90.0),
        ];
        let result = CorrelationAnalyzer::new().analyze(&doses, &scores);
        assert_eq!(result.doses_analyzed, 0);
        assert_eq!(result.impact, Impact::Neutral);
    }

    #[test]
    fn test_oversized_window_pairs_nothing() {
        let config = CorrelationConfig {
            association_window_hours: i64::MAX,
        };
        assert!(!config.is_valid());

        let doses = vec![dose(1, "med", DoseStatus::Taken), dose(2, "med", DoseStatus::Missed)];
        let mut scores = points_after(1, &[40.0]);
        scores.extend(points_after(2, &[60.0]));

        let result = CorrelationAnalyzer::with_config(config).analyze(&doses, &scores);
        assert_eq!(result.doses_analyzed, 0);
        assert_eq!(result.coefficient, 0.0);
        assert_eq!(result.overall_adherence_rate, 0.5);
    }

    #[test]
    fn test_window_validity() {
        assert!(CorrelationConfig::default().is_valid());
        for hours in [0, -4, CorrelationConfig::MAX_WINDOW_HOURS + 1] {
            assert!(!CorrelationConfig {
                association_window_hours: hours
            }
            .is_valid());
        }
    }

    #[test]
    fn test_all_taken_is_neutral() {
        let doses = vec![dose(1, "med", DoseStatus::Taken), dose(2, "med", DoseStatus::Taken)];
        let mut scores = points_after(1, &[20.0]);
        scores.extend(points_after(2, &[80.0]));

        let result = CorrelationAnalyzer::new().analyze(&doses, &scores);
        assert_eq!(result.coefficient, 0.0);
        assert_eq!(result.overall_adherence_rate, 1.0);
        assert_eq!(result.stress_without_adherence, 0.0);
        assert_eq!(result.impact, Impact::Neutral);
    }

    #[test]
    fn test_analyze_by_medication() {
        let doses = vec![
            dose(1, "alpha", DoseStatus::Taken),
            dose(2, "beta", DoseStatus::Missed),
            dose(3, "alpha", DoseStatus::Missed),
        ];
        let mut scores = points_after(1, &[30.0]);
        scores.extend(points_after(2, &[50.0]));
        scores.extend(points_after(3, &[70.0]));

        let results = CorrelationAnalyzer::new().analyze_by_medication(&doses, &scores);
        let names: Vec<&String> = results.keys().collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(results["alpha"].doses_analyzed, 2);
        assert_eq!(results["beta"].overall_adherence_rate, 0.0);
    }

    #[test]
    fn test_custom_window() {
        let analyzer = CorrelationAnalyzer::with_config(CorrelationConfig {
            association_window_hours: 1,
        });
        let doses = vec![dose(1, "med", DoseStatus::Taken)];
        let scores = vec![ScorePoint::new(day(1) + Duration::hours(2), 50.0)];
        assert_eq!(analyzer.analyze(&doses, &scores).doses_analyzed, 0);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_pearson_is_bounded(
            pairs in prop::collection::vec((0.0f64..=1.0, 0.0f64..=100.0), 0..40)
        ) {
            let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let r = pearson(&x, &y);
            prop_assert!(r.is_finite());
            prop_assert!((-1.0..=1.0).contains(&r));
        }

        #[test]
        fn test_coefficient_is_bounded(
            statuses in prop::collection::vec(any::<bool>(), 0..20),
            stress in prop::collection::vec(0.0f64..=100.0, 20)
        ) {
            let doses: Vec<DoseLog> = statuses
                .iter()
                .enumerate()
                .map(|(i, taken)| DoseLog {
                    timestamp: day(1) + Duration::days(i as i64),
                    medication: "med".to_string(),
                    status: if *taken { DoseStatus::Taken } else { DoseStatus::Missed },
                })
                .collect();
            let scores: Vec<ScorePoint> = stress
                .iter()
                .enumerate()
                .map(|(i, s)| ScorePoint::new(day(1) + Duration::days(i as i64) + Duration::hours(1), *s))
                .collect();

            let result = CorrelationAnalyzer::new().analyze(&doses, &scores);
            prop_assert!((-1.0..=1.0).contains(&result.coefficient));
            prop_assert!((0.0..=1.0).contains(&result.overall_adherence_rate));
        }
    }
}
