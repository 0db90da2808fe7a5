//! Daily stress smoothing, anomaly detection and short-range forecasting

use crate::models::{DailyValue, MAX_STRESS, MIN_STRESS};
use crate::trends::DailyStress;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

/// A day whose value sits unusually far from the series mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub value: f64,
    /// Signed distance from the series mean
    pub deviation: f64,
    pub z_score: f64,
}

/// One projected day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Width of the centered moving-average window, in days. Even widths
    /// round up to the next odd width so the window stays centered.
    pub smoothing_window: usize,

    /// Standard deviations from the mean beyond which a day is anomalous
    pub anomaly_threshold: f64,

    /// Default number of days to project
    pub horizon_days: u32,

    /// Confidence of the first projected day
    pub initial_confidence: f64,

    /// Confidence lost per additional projected day
    pub confidence_decay: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            smoothing_window: 7,
            anomaly_threshold: 2.0,
            horizon_days: 7,
            initial_confidence: 0.85,
            confidence_decay: 0.05,
        }
    }
}

pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new() -> Self {
        Forecaster {
            config: ForecastConfig::default(),
        }
    }

    pub fn with_config(config: ForecastConfig) -> Self {
        Forecaster { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Centered moving average over `smoothing_window` days, rounded up to
    /// an odd width. The window shrinks at the edges of the series so every
    /// input day yields one output day.
    pub fn moving_average(&self, series: &[DailyValue]) -> Vec<DailyValue> {
        let half = self.config.smoothing_window.max(1) / 2;

        (0..series.len())
            .map(|i| {
                let lo = i.saturating_sub(half);
                let hi = (i + half).min(series.len() - 1);
                let window = &series[lo..=hi];
                let avg = window.iter().map(|d| d.value).sum::<f64>() / window.len() as f64;
                DailyValue::new(series[i].date, avg)
            })
            .collect()
    }

    /// Days more than `anomaly_threshold` population standard deviations
    /// from the mean. A flat series has no anomalies.
    pub fn detect_anomalies(&self, series: &[DailyValue]) -> Vec<Anomaly> {
        if series.len() < 2 {
            return Vec::new();
        }

        let values: Vec<f64> = series.iter().map(|d| d.value).collect();
        let mean = values.iter().mean();
        let std = values.iter().population_std_dev();

        if !std.is_finite() || std < 1e-10 {
            return Vec::new();
        }

        let anomalies: Vec<Anomaly> = series
            .iter()
            .filter_map(|d| {
                let deviation = d.value - mean;
                let z_score = deviation / std;
                (z_score.abs() > self.config.anomaly_threshold).then(|| Anomaly {
                    date: d.date,
                    value: d.value,
                    deviation,
                    z_score,
                })
            })
            .collect();

        debug!(days = series.len(), anomalies = anomalies.len(), mean, std, "Anomaly scan");
        anomalies
    }

    /// Project `days` days past the end of the series.
    ///
    /// The slope is the overall change divided by the number of days. The
    /// interval is one population standard deviation of the history either
    /// side of the prediction, and every value stays on the stress scale.
    pub fn forecast(&self, series: &[DailyValue], days: u32) -> Vec<ForecastPoint> {
        let (first, last) = match (series.first(), series.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Vec::new(),
        };

        let slope = (last.value - first.value) / series.len() as f64;
        let std = if series.len() > 1 {
            series.iter().map(|d| d.value).population_std_dev()
        } else {
            0.0
        };
        let std = if std.is_finite() { std } else { 0.0 };

        (1..=days)
            .filter_map(|k| {
                let date = last.date.checked_add_days(Days::new(u64::from(k)))?;
                let predicted = last.value + slope * f64::from(k);
                let confidence = (self.config.initial_confidence
                    - self.config.confidence_decay * f64::from(k - 1))
                .max(0.0);

                Some(ForecastPoint {
                    date,
                    predicted: clamp_stress(predicted),
                    lower_bound: clamp_stress(predicted - std),
                    upper_bound: clamp_stress(predicted + std),
                    confidence,
                })
            })
            .collect()
    }

    /// Forecast over the configured horizon
    pub fn forecast_default(&self, series: &[DailyValue]) -> Vec<ForecastPoint> {
        self.forecast(series, self.config.horizon_days)
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_stress(value: f64) -> f64 {
    value.clamp(MIN_STRESS, MAX_STRESS)
}

/// Daily averages of a trend report as a forecaster series
pub fn series_from_trend(trend: &[DailyStress]) -> Vec<DailyValue> {
    trend
        .iter()
        .map(|d| DailyValue::new(d.date, d.average_stress))
        .collect()
}
