use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Score at or above which a patient is considered to be in overload
pub const OVERLOAD_THRESHOLD: f64 = 75.0;

/// Score at or above which stress is considered to be rising
pub const RISING_THRESHOLD: f64 = 50.0;

/// Lower bound of the stress scale
pub const MIN_STRESS: f64 = 0.0;

/// Upper bound of the stress scale
pub const MAX_STRESS: f64 = 100.0;

/// A single physiological sample from a wearable sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,

    /// Heart rate in beats per minute (0-300)
    pub heart_rate: f64,

    /// Heart rate variability (RMSSD) in milliseconds (0-500)
    pub hrv: f64,

    /// Electrodermal activity in microsiemens (0-100)
    pub eda: f64,

    /// Where the patient was, as reported by the device or caregiver
    #[serde(default)]
    pub location: Option<String>,

    /// What the patient was doing; used as the trigger label in reports
    #[serde(default)]
    pub activity: Option<String>,
}

impl SensorReading {
    pub fn new(timestamp: DateTime<Utc>, heart_rate: f64, hrv: f64, eda: f64) -> Self {
        Self {
            timestamp,
            heart_rate,
            hrv,
            eda,
            location: None,
            activity: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }
}

/// A patient's resting physiological values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    /// Resting heart rate in bpm
    pub baseline_hr: f64,

    /// Resting HRV in milliseconds
    pub baseline_hrv: f64,

    /// Resting EDA in microsiemens
    pub baseline_eda: f64,
}

impl BaselineMetrics {
    pub const DEFAULT_HR: f64 = 70.0;
    pub const DEFAULT_HRV: f64 = 50.0;
    pub const DEFAULT_EDA: f64 = 10.0;

    pub fn new(baseline_hr: f64, baseline_hrv: f64, baseline_eda: f64) -> Self {
        Self {
            baseline_hr,
            baseline_hrv,
            baseline_eda,
        }
    }
}

impl Default for BaselineMetrics {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HR, Self::DEFAULT_HRV, Self::DEFAULT_EDA)
    }
}

/// Classified stress state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressState {
    /// Score below 50
    Calm,
    /// Score in [50, 75)
    Rising,
    /// Score at or above 75
    Overload,
}

impl StressState {
    /// Classify a stress score. Each call is independent; no hysteresis.
    pub fn from_score(score: f64) -> Self {
        if score >= OVERLOAD_THRESHOLD {
            StressState::Overload
        } else if score >= RISING_THRESHOLD {
            StressState::Rising
        } else {
            StressState::Calm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StressState::Calm => "calm",
            StressState::Rising => "rising",
            StressState::Overload => "overload",
        }
    }
}

impl fmt::Display for StressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stress score positioned in time, used as predictor input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
}

impl ScorePoint {
    pub fn new(timestamp: DateTime<Utc>, score: f64) -> Self {
        Self { timestamp, score }
    }
}

/// A reading paired with its derived stress score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredReading {
    pub reading: SensorReading,
    pub stress_score: f64,
    pub state: StressState,
}

impl ScoredReading {
    pub fn new(reading: SensorReading, stress_score: f64) -> Self {
        Self {
            reading,
            state: StressState::from_score(stress_score),
            stress_score,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.reading.timestamp
    }

    pub fn score_point(&self) -> ScorePoint {
        ScorePoint::new(self.reading.timestamp, self.stress_score)
    }
}

/// Predicted overload within the short horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub will_overload: bool,

    /// Minutes until the overload threshold is crossed, clamped to [5, 10]
    pub eta_minutes: u8,

    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Dose outcome recorded by the patient or caregiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoseStatus {
    Taken,
    Missed,
}

impl std::str::FromStr for DoseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "taken" | "yes" | "true" | "1" => Ok(DoseStatus::Taken),
            "missed" | "skipped" | "no" | "false" | "0" => Ok(DoseStatus::Missed),
            other => Err(format!("Invalid dose status: {}", other)),
        }
    }
}

/// One scheduled medication dose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseLog {
    /// Scheduled (or actual) dose time
    pub timestamp: DateTime<Utc>,

    /// Medication name
    pub medication: String,

    pub status: DoseStatus,
}

impl DoseLog {
    pub fn is_taken(&self) -> bool {
        self.status == DoseStatus::Taken
    }
}

/// A value attached to a calendar date, used by the forecaster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyValue {
    pub date: NaiveDate,
    pub value: f64,
}

impl DailyValue {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Round to one decimal place for reporting
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
