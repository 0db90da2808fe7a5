//! Short-horizon overload prediction
//!
//! Fits a line through the most recent stress scores and extrapolates it to
//! the overload threshold. A crossing within the horizon yields a
//! [`Prediction`]; anything else, including degenerate windows and
//! non-finite arithmetic, yields no prediction.
//!
//! An optional [`AdvisorySource`] (for example a remote model) can refine the
//! confidence. It is consulted under a timeout and its failure never blocks
//! the reading path: the local fit stands on its own.

use crate::error::AdvisoryError;
use crate::models::{Prediction, ScorePoint, OVERLOAD_THRESHOLD};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Predictor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Number of recent scores kept in the fitting window (current excluded)
    pub window_size: usize,

    /// Minimum points (current included) required to fit a trend
    pub min_points: usize,

    /// Score that counts as overload
    pub overload_threshold: f64,

    /// Earliest ETA reported, in minutes
    pub min_horizon_minutes: u8,

    /// Latest crossing that still produces a prediction, in minutes
    pub max_horizon_minutes: u8,

    /// Minimum confidence for a prediction to be shown
    pub display_threshold: f64,

    /// Advisory call budget in milliseconds
    pub advisory_timeout_ms: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        PredictionConfig {
            window_size: 10,
            min_points: 3,
            overload_threshold: OVERLOAD_THRESHOLD,
            min_horizon_minutes: 5,
            max_horizon_minutes: 10,
            display_threshold: 0.5,
            advisory_timeout_ms: 2000,
        }
    }
}

impl PredictionConfig {
    /// An inverted horizon or a threshold off the stress scale cannot predict
    pub fn is_valid(&self) -> bool {
        self.min_horizon_minutes <= self.max_horizon_minutes
            && self.overload_threshold.is_finite()
            && (0.0..=1.0).contains(&self.display_threshold)
    }
}

/// Least-squares line through (minutes, score) pairs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    /// Score points per minute
    pub slope: f64,
    pub intercept: f64,
    /// Root-mean-square residual in score points
    pub rms_residual: f64,
}

impl LinearFit {
    /// Fit `y = slope * x + intercept`. `None` for fewer than two points or
    /// when all x values coincide.
    pub fn fit(points: &[(f64, f64)]) -> Option<LinearFit> {
        if points.len() < 2 {
            return None;
        }

        let n = points.len() as f64;
        let x_mean = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (x, y) in points {
            let x_diff = x - x_mean;
            numerator += x_diff * (y - y_mean);
            denominator += x_diff * x_diff;
        }

        if denominator.abs() < f64::EPSILON {
            return None;
        }

        let slope = numerator / denominator;
        let intercept = y_mean - slope * x_mean;
        let sum_sq: f64 = points
            .iter()
            .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
            .sum();
        let rms_residual = (sum_sq / n).sqrt();

        if !(slope.is_finite() && intercept.is_finite() && rms_residual.is_finite()) {
            return None;
        }

        Some(LinearFit {
            slope,
            intercept,
            rms_residual,
        })
    }
}

/// Overload probability reported by an advisory source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvisorySignal {
    /// Probability in [0, 1] that overload occurs within the horizon
    pub overload_probability: f64,
}

/// External second opinion on an imminent overload
#[async_trait]
pub trait AdvisorySource: Send + Sync {
    async fn assess(&self, window: &[ScorePoint]) -> Result<AdvisorySignal, AdvisoryError>;
}

/// Advisory signal published as a JSON file (`{"overload_probability": 0.4}`)
/// by a companion service. Re-read on every call.
pub struct FileAdvisory {
    path: PathBuf,
}

impl FileAdvisory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileAdvisory { path: path.into() }
    }
}

#[async_trait]
impl AdvisorySource for FileAdvisory {
    async fn assess(&self, _window: &[ScorePoint]) -> Result<AdvisorySignal, AdvisoryError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AdvisoryError::Unavailable {
                reason: format!("{}: {}", self.path.display(), e),
            })?;

        serde_json::from_str(&content).map_err(|e| AdvisoryError::InvalidResponse {
            reason: e.to_string(),
        })
    }
}

pub struct OverloadPredictor {
    config: PredictionConfig,
}

impl OverloadPredictor {
    pub fn new() -> Self {
        OverloadPredictor {
            config: PredictionConfig::default(),
        }
    }

    /// Custom settings; invalid configurations fall back to the defaults.
    pub fn with_config(config: PredictionConfig) -> Self {
        if config.is_valid() {
            OverloadPredictor { config }
        } else {
            warn!(?config, "Invalid prediction settings, using defaults");
            Self::new()
        }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// The last `window_size` points of `recent` followed by `current`
    pub fn window(&self, recent: &[ScorePoint], current: ScorePoint) -> Vec<ScorePoint> {
        let start = recent.len().saturating_sub(self.config.window_size);
        let mut window = recent[start..].to_vec();
        window.push(current);
        window
    }

    /// Predict from the local trend alone
    pub fn predict(&self, recent: &[ScorePoint], current: ScorePoint) -> Option<Prediction> {
        let window = self.window(recent, current);
        self.predict_window(&window)
    }

    fn predict_window(&self, window: &[ScorePoint]) -> Option<Prediction> {
        let current = window.last()?;
        if window.len() < self.config.min_points.max(2) {
            return None;
        }
        if !current.score.is_finite() || current.score >= self.config.overload_threshold {
            return None;
        }

        let origin = window[0].timestamp;
        let points: Vec<(f64, f64)> = window
            .iter()
            .map(|p| {
                let minutes = (p.timestamp - origin).num_milliseconds() as f64 / 60_000.0;
                (minutes, p.score)
            })
            .collect();

        let fit = LinearFit::fit(&points)?;
        if fit.slope <= 0.0 {
            return None;
        }

        let eta = (self.config.overload_threshold - current.score) / fit.slope;
        if !eta.is_finite() || eta > f64::from(self.config.max_horizon_minutes) {
            debug!(eta, slope = fit.slope, "Overload crossing outside horizon");
            return None;
        }

        let eta_minutes = (eta.round() as i64).clamp(
            i64::from(self.config.min_horizon_minutes),
            i64::from(self.config.max_horizon_minutes),
        ) as u8;

        let confidence = self.confidence(eta_minutes, fit.rms_residual);
        debug!(
            eta_minutes,
            confidence,
            slope = fit.slope,
            rms = fit.rms_residual,
            "Overload predicted"
        );

        Some(Prediction {
            will_overload: true,
            eta_minutes,
            confidence,
        })
    }

    /// Closer crossings and tighter fits are more confident
    pub fn confidence(&self, eta_minutes: u8, rms_residual: f64) -> f64 {
        let minutes_past_min =
            f64::from(eta_minutes.saturating_sub(self.config.min_horizon_minutes));
        let horizon_factor = 0.95 - 0.07 * minutes_past_min;
        let fit_factor = 1.0 / (1.0 + rms_residual.max(0.0) / 10.0);
        let confidence = horizon_factor * fit_factor;
        if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Predict, then blend in the advisory probability when it arrives in
    /// time. Advisory failures leave the local prediction unchanged.
    pub async fn predict_with_advisory(
        &self,
        recent: &[ScorePoint],
        current: ScorePoint,
        advisory: &dyn AdvisorySource,
    ) -> Option<Prediction> {
        let window = self.window(recent, current);
        let local = self.predict_window(&window)?;

        match self.consult(advisory, &window).await {
            Ok(signal) => {
                let confidence = ((local.confidence + signal.overload_probability) / 2.0).clamp(0.0, 1.0);
                debug!(
                    local = local.confidence,
                    advisory = signal.overload_probability,
                    confidence,
                    "Advisory signal applied"
                );
                Some(Prediction {
                    confidence,
                    ..local
                })
            }
            Err(e) => {
                warn!(error = %e, "Advisory signal unavailable, using local prediction");
                Some(local)
            }
        }
    }

    async fn consult(
        &self,
        advisory: &dyn AdvisorySource,
        window: &[ScorePoint],
    ) -> Result<AdvisorySignal, AdvisoryError> {
        let timeout_ms = self.config.advisory_timeout_ms;
        let signal = tokio::time::timeout(Duration::from_millis(timeout_ms), advisory.assess(window))
            .await
            .map_err(|_| AdvisoryError::Timeout { timeout_ms })??;

        let p = signal.overload_probability;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(AdvisoryError::InvalidResponse {
                reason: format!("probability {} outside [0, 1]", p),
            });
        }
        Ok(signal)
    }

    pub fn should_display(&self, prediction: Option<&Prediction>, feature_enabled: bool) -> bool {
        should_display_prediction(prediction, feature_enabled, self.config.display_threshold)
    }
}

impl Default for OverloadPredictor {
    fn default() -> Self {
        Self::new()
    }
}

/// Gate a prediction for display. The feature flag comes from the patient's
/// profile; low-confidence predictions are suppressed.
pub fn should_display_prediction(
    prediction: Option<&Prediction>,
    feature_enabled: bool,
    threshold: f64,
) -> bool {
    if !feature_enabled {
        return false;
    }
    match prediction {
        Some(p) => p.will_overload && p.confidence >= threshold,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 14, 0, 0).unwrap()
    }

    fn series(scores: &[f64]) -> Vec<ScorePoint> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| ScorePoint::new(start() + ChronoDuration::minutes(i as i64), *s))
            .collect()
    }

    fn split(points: Vec<ScorePoint>) -> (Vec<ScorePoint>, ScorePoint) {
        let mut points = points;
        let current = points.pop().unwrap();
        (points, current)
    }

    #[test]
    fn test_linear_fit_exact() {
        let fit = LinearFit::fit(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!(fit.rms_residual < 1e-9);
    }

    #[test]
    fn test_linear_fit_degenerate() {
        assert!(LinearFit::fit(&[(0.0, 1.0)]).is_none());
        assert!(LinearFit::fit(&[(1.0, 1.0), (1.0, 5.0)]).is_none());
    }

    #[test]
    fn test_steep_rise_predicts_imminent_overload() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[40.0, 45.0, 50.0, 55.0, 60.0, 65.0]));

        let prediction = predictor.predict(&recent, current).unwrap();
        assert!(prediction.will_overload);
        // Crossing in 2 minutes is reported at the horizon floor
        assert_eq!(prediction.eta_minutes, 5);
        assert!((prediction.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_horizon_falls_back_to_defaults() {
        let config = PredictionConfig {
            min_horizon_minutes: 10,
            max_horizon_minutes: 5,
            ..PredictionConfig::default()
        };
        assert!(!config.is_valid());

        let predictor = OverloadPredictor::with_config(config);
        assert_eq!(predictor.config(), &PredictionConfig::default());

        let (recent, current) = split(series(&[40.0, 45.0, 50.0, 55.0, 60.0, 65.0]));
        let prediction = predictor.predict(&recent, current).unwrap();
        assert_eq!(prediction.eta_minutes, 5);
    }

    #[test]
    fn test_crossing_at_horizon_edge() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[52.5, 54.0, 55.5, 57.0, 58.5, 60.0]));

        let prediction = predictor.predict(&recent, current).unwrap();
        assert_eq!(prediction.eta_minutes, 10);
        assert!((prediction.confidence - 0.60).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_decreases_with_eta() {
        let predictor = OverloadPredictor::new();
        let mut previous = f64::MAX;
        for eta in 5..=10 {
            let c = predictor.confidence(eta, 0.0);
            assert!(c < previous);
            previous = c;
        }
    }

    #[test]
    fn test_confidence_decreases_with_residual() {
        let predictor = OverloadPredictor::new();
        assert!(predictor.confidence(6, 5.0) < predictor.confidence(6, 0.0));
    }

    #[test]
    fn test_slow_rise_beyond_horizon() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[50.0, 50.5, 51.0, 51.5, 52.0]));
        assert!(predictor.predict(&recent, current).is_none());
    }

    #[test]
    fn test_flat_or_falling_scores() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[60.0, 60.0, 60.0, 60.0]));
        assert!(predictor.predict(&recent, current).is_none());

        let (recent, current) = split(series(&[70.0, 66.0, 62.0, 58.0]));
        assert!(predictor.predict(&recent, current).is_none());
    }

    #[test]
    fn test_already_overloaded() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[60.0, 68.0, 76.0]));
        assert!(predictor.predict(&recent, current).is_none());
    }

    #[test]
    fn test_insufficient_window() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[60.0, 70.0]));
        assert!(predictor.predict(&recent, current).is_none());
        assert!(predictor.predict(&[], ScorePoint::new(start(), 70.0)).is_none());
    }

    #[test]
    fn test_identical_timestamps() {
        let predictor = OverloadPredictor::new();
        let recent = vec![ScorePoint::new(start(), 50.0), ScorePoint::new(start(), 60.0)];
        assert!(predictor.predict(&recent, ScorePoint::new(start(), 70.0)).is_none());
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let predictor = OverloadPredictor::with_config(PredictionConfig {
            window_size: 3,
            ..PredictionConfig::default()
        });
        let (recent, current) = split(series(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]));
        let window = predictor.window(&recent, current);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].score, 30.0);
        assert_eq!(window[3].score, 60.0);
    }

    #[test]
    fn test_display_gating() {
        let confident = Prediction {
            will_overload: true,
            eta_minutes: 6,
            confidence: 0.8,
        };
        let unsure = Prediction {
            confidence: 0.3,
            ..confident
        };

        assert!(should_display_prediction(Some(&confident), true, 0.5));
        assert!(!should_display_prediction(Some(&confident), false, 0.5));
        assert!(!should_display_prediction(Some(&unsure), true, 0.5));
        assert!(!should_display_prediction(None, true, 0.5));
    }

    struct FixedAdvisory(f64);

    #[async_trait]
    impl AdvisorySource for FixedAdvisory {
        async fn assess(&self, _window: &[ScorePoint]) -> Result<AdvisorySignal, AdvisoryError> {
            Ok(AdvisorySignal {
                overload_probability: self.0,
            })
        }
    }

    struct FailingAdvisory;

    #[async_trait]
    impl AdvisorySource for FailingAdvisory {
        async fn assess(&self, _window: &[ScorePoint]) -> Result<AdvisorySignal, AdvisoryError> {
            Err(AdvisoryError::Unavailable {
                reason: "model offline".to_string(),
            })
        }
    }

    struct SlowAdvisory;

    #[async_trait]
    impl AdvisorySource for SlowAdvisory {
        async fn assess(&self, _window: &[ScorePoint]) -> Result<AdvisorySignal, AdvisoryError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(AdvisorySignal {
                overload_probability: 1.0,
            })
        }
    }

    #[tokio::test]
    async fn test_advisory_blends_confidence() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[40.0, 45.0, 50.0, 55.0, 60.0, 65.0]));

        let prediction = predictor
            .predict_with_advisory(&recent, current, &FixedAdvisory(0.15))
            .await
            .unwrap();
        assert!((prediction.confidence - 0.55).abs() < 1e-9);
        assert_eq!(prediction.eta_minutes, 5);
    }

    #[tokio::test]
    async fn test_advisory_failure_keeps_local_prediction() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[40.0, 45.0, 50.0, 55.0, 60.0, 65.0]));

        let local = predictor.predict(&recent, current).unwrap();
        let prediction = predictor
            .predict_with_advisory(&recent, current, &FailingAdvisory)
            .await
            .unwrap();
        assert_eq!(prediction, local);
    }

    #[tokio::test]
    async fn test_advisory_timeout_keeps_local_prediction() {
        let predictor = OverloadPredictor::with_config(PredictionConfig {
            advisory_timeout_ms: 20,
            ..PredictionConfig::default()
        });
        let (recent, current) = split(series(&[40.0, 45.0, 50.0, 55.0, 60.0, 65.0]));

        let local = predictor.predict(&recent, current).unwrap();
        let prediction = predictor
            .predict_with_advisory(&recent, current, &SlowAdvisory)
            .await
            .unwrap();
        assert_eq!(prediction, local);
    }

    #[tokio::test]
    async fn test_invalid_advisory_probability_is_ignored() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[40.0, 45.0, 50.0, 55.0, 60.0, 65.0]));

        let local = predictor.predict(&recent, current).unwrap();
        let prediction = predictor
            .predict_with_advisory(&recent, current, &FixedAdvisory(3.0))
            .await
            .unwrap();
        assert_eq!(prediction, local);
    }

    #[tokio::test]
    async fn test_no_local_prediction_skips_advisory() {
        let predictor = OverloadPredictor::new();
        let (recent, current) = split(series(&[60.0, 60.0, 60.0]));
        let prediction = predictor
            .predict_with_advisory(&recent, current, &FixedAdvisory(1.0))
            .await;
        assert!(prediction.is_none());
    }

    #[tokio::test]
    async fn test_file_advisory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("advisory.json");
        std::fs::write(&path, r#"{"overload_probability": 0.4}"#).unwrap();

        let signal = FileAdvisory::new(&path).assess(&[]).await.unwrap();
        assert_eq!(signal.overload_probability, 0.4);

        let missing = FileAdvisory::new(dir.path().join("missing.json")).assess(&[]).await;
        assert!(matches!(missing, Err(AdvisoryError::Unavailable { .. })));

        std::fs::write(&path, "not json").unwrap();
        let invalid = FileAdvisory::new(&path).assess(&[]).await;
        assert!(matches!(invalid, Err(AdvisoryError::InvalidResponse { .. })));
    }
}
