use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::correlation::CorrelationConfig;
use crate::error::CalmSignalError;
use crate::forecast::ForecastConfig;
use crate::logging::{LogFormat, LogLevel};
use crate::models::BaselineMetrics;
use crate::prediction::PredictionConfig;
use crate::stress::ScoringConfig;
use crate::trends::TrendConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default patient ID (currently active)
    pub default_patient_id: Option<String>,

    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    pub settings: AppSettings,

    /// Stress score weights
    pub scoring: ScoringConfig,

    /// Overload prediction settings
    pub prediction: PredictionConfig,

    /// Trend report settings
    pub trends: TrendConfig,

    /// Adherence correlation settings
    pub correlation: CorrelationConfig,

    /// Forecast settings
    pub forecast: ForecastConfig,

    /// Patients configuration
    pub patients: HashMap<String, PatientConfig>,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// IANA time zone used to bucket readings into days and times of day
    pub time_zone: String,

    /// Directory holding patient reading files
    pub data_dir: PathBuf,

    pub log_level: LogLevel,

    pub log_format: LogFormat,

    /// Optional log file; rotated daily
    pub log_file: Option<PathBuf>,
}

/// Patient-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientConfig {
    /// Unique patient identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Resting values; population defaults apply when absent
    #[serde(default)]
    pub baseline: Option<BaselineMetrics>,

    /// Whether overload predictions are shown to this patient
    #[serde(default = "default_prediction_enabled")]
    pub prediction_enabled: bool,

    #[serde(default)]
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

fn default_prediction_enabled() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            default_patient_id: None,
            metadata: ConfigMetadata::default(),
            settings: AppSettings::default(),
            scoring: ScoringConfig::default(),
            prediction: PredictionConfig::default(),
            trends: TrendConfig::default(),
            correlation: CorrelationConfig::default(),
            forecast: ForecastConfig::default(),
            patients: HashMap::new(),
        }
    }
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        let now = Utc::now();
        ConfigMetadata {
            version: "1.0".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            time_zone: "UTC".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: LogLevel::Warn,
            log_format: LogFormat::Pretty,
            log_file: None,
        }
    }
}

impl AppSettings {
    /// Parsed time zone
    pub fn tz(&self) -> crate::error::Result<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| CalmSignalError::Configuration(format!("Invalid time zone: {}", self.time_zone)))
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".calmsignal")
            .join("config.toml")
    }

    /// Load the config at `path` (or the default path), falling back to
    /// defaults when it does not exist or cannot be read.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "Unusable config file, using defaults");
                Self::default()
            }
        }
    }

    /// Reject settings the analytics cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |msg: String| Err(CalmSignalError::Configuration(msg));

        self.settings.tz()?;

        if !self.scoring.is_valid() {
            return invalid("Scoring weights must be finite and non-negative".to_string());
        }
        if self.prediction.min_horizon_minutes > self.prediction.max_horizon_minutes {
            return invalid(format!(
                "Prediction horizon is inverted: {} > {} minutes",
                self.prediction.min_horizon_minutes, self.prediction.max_horizon_minutes
            ));
        }
        if !self.prediction.is_valid() {
            return invalid("Prediction threshold must be finite and display threshold within [0, 1]".to_string());
        }
        if !self.correlation.is_valid() {
            return invalid(format!(
                "Association window must be between 1 and {} hours, got {}",
                CorrelationConfig::MAX_WINDOW_HOURS,
                self.correlation.association_window_hours
            ));
        }
        if self.forecast.smoothing_window == 0 {
            return invalid("Forecast smoothing window must be at least 1 day".to_string());
        }

        Ok(())
    }

    pub fn add_patient(&mut self, patient: PatientConfig) -> Result<()> {
        if self.patients.contains_key(&patient.id) {
            return Err(anyhow::anyhow!("Patient already exists: {}", patient.id));
        }

        let patient_id = patient.id.clone();

        // First patient becomes the default
        if self.patients.is_empty() {
            self.default_patient_id = Some(patient_id.clone());
        }

        self.patients.insert(patient_id, patient);
        self.metadata.updated_at = Utc::now();

        Ok(())
    }

    pub fn remove_patient(&mut self, patient_id: &str) -> Result<()> {
        if self.patients.remove(patient_id).is_none() {
            return Err(anyhow::anyhow!("Patient not found: {}", patient_id));
        }

        if self.default_patient_id.as_deref() == Some(patient_id) {
            let mut remaining: Vec<&String> = self.patients.keys().collect();
            remaining.sort();
            self.default_patient_id = remaining.first().map(|id| id.to_string());
        }

        self.metadata.updated_at = Utc::now();
        Ok(())
    }

    pub fn get_patient(&self, patient_id: &str) -> Option<&PatientConfig> {
        self.patients.get(patient_id)
    }

    pub fn get_patient_mut(&mut self, patient_id: &str) -> Option<&mut PatientConfig> {
        self.patients.get_mut(patient_id)
    }

    pub fn get_default_patient(&self) -> Option<&PatientConfig> {
        self.default_patient_id
            .as_ref()
            .and_then(|id| self.patients.get(id))
    }

    pub fn set_default_patient(&mut self, patient_id: &str) -> Result<()> {
        if !self.patients.contains_key(patient_id) {
            return Err(anyhow::anyhow!("Patient not found: {}", patient_id));
        }

        self.default_patient_id = Some(patient_id.to_string());
        self.metadata.updated_at = Utc::now();
        Ok(())
    }

    /// Patients sorted by ID
    pub fn list_patients(&self) -> Vec<&PatientConfig> {
        let mut patients: Vec<&PatientConfig> = self.patients.values().collect();
        patients.sort_by(|a, b| a.id.cmp(&b.id));
        patients
    }

    /// The named patient, or the default one when `patient_id` is `None`
    pub fn resolve_patient(&self, patient_id: Option<&str>) -> Result<Option<&PatientConfig>> {
        match patient_id {
            Some(id) => self
                .get_patient(id)
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("Patient not found: {}", id)),
            None => Ok(self.get_default_patient()),
        }
    }
}

impl PatientConfig {
    /// New patient; the ID defaults to a slug of the name
    pub fn new(name: String, patient_id: Option<String>) -> Self {
        let id = patient_id.unwrap_or_else(|| slugify(&name));
        let now = Utc::now();

        PatientConfig {
            id,
            name,
            baseline: None,
            prediction_enabled: true,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_baseline(mut self, baseline: BaselineMetrics) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn set_baseline(&mut self, baseline: BaselineMetrics) {
        self.baseline = Some(baseline);
        self.updated_at = Utc::now();
    }
}

fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    let parts: Vec<&str> = slug.split('-').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        "patient".to_string()
    } else {
        parts.join("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let mut config = AppConfig::default();
        config
            .add_patient(PatientConfig::new("Sam".to_string(), None).with_baseline(BaselineMetrics::new(65.0, 60.0, 4.0)))
            .unwrap();

        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.metadata.version, deserialized.metadata.version);
        assert_eq!(deserialized.scoring, ScoringConfig::default());
        assert_eq!(
            deserialized.get_patient("sam").unwrap().baseline,
            Some(BaselineMetrics::new(65.0, 60.0, 4.0))
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let toml_str = r#"
[settings]
time_zone = "Europe/London"

[prediction]
window_size = 6
min_points = 3
overload_threshold = 75.0
min_horizon_minutes = 5
max_horizon_minutes = 10
display_threshold = 0.7
advisory_timeout_ms = 500
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.settings.time_zone, "Europe/London");
        assert_eq!(config.settings.data_dir, PathBuf::from("./data"));
        assert_eq!(config.prediction.window_size, 6);
        assert_eq!(config.trends, TrendConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.settings.tz().unwrap(), chrono_tz::Europe::London);
    }

    #[test]
    fn test_invalid_time_zone() {
        let mut config = AppConfig::default();
        config.settings.time_zone = "Mars/Olympus".to_string();
        assert!(matches!(
            config.validate(),
            Err(CalmSignalError::Configuration(_))
        ));
    }

    #[test]
    fn test_association_window_bounds() {
        let config: AppConfig = toml::from_str(
            "[correlation]\nassociation_window_hours = 9223372036854775807\n",
        )
        .unwrap();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.correlation.association_window_hours = 0;
        assert!(config.validate().is_err());

        config.correlation.association_window_hours = 24;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_inverted_horizon() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[prediction]\nmin_horizon_minutes = 10\nmax_horizon_minutes = 5\n").unwrap();

        let err = AppConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("horizon is inverted"));
    }

    #[test]
    fn test_patient_management() {
        let mut config = AppConfig::default();
        config
            .add_patient(PatientConfig::new("Alex Rivera".to_string(), None))
            .unwrap();
        config
            .add_patient(PatientConfig::new("Jo".to_string(), Some("p-02".to_string())))
            .unwrap();

        assert_eq!(config.patients.len(), 2);
        assert_eq!(config.default_patient_id.as_deref(), Some("alex-rivera"));
        assert!(config.add_patient(PatientConfig::new("Jo".to_string(), Some("p-02".to_string()))).is_err());

        config.set_default_patient("p-02").unwrap();
        assert_eq!(config.get_default_patient().unwrap().name, "Jo");

        config.remove_patient("p-02").unwrap();
        assert_eq!(config.default_patient_id.as_deref(), Some("alex-rivera"));
        assert!(config.remove_patient("p-02").is_err());
        assert!(config.resolve_patient(Some("nobody")).is_err());
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original_config = AppConfig::default();
        original_config
            .add_patient(PatientConfig::new("Test Patient".to_string(), None))
            .unwrap();

        original_config.save_to_file(&config_path).unwrap();
        let loaded_config = AppConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded_config.patients.len(), 1);
        assert!(loaded_config.get_patient("test-patient").unwrap().prediction_enabled);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = tempdir().unwrap();
        let config = AppConfig::load_or_default(Some(&temp_dir.path().join("missing.toml")));
        assert!(config.patients.is_empty());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Alex  Rivera! "), "alex-rivera");
        assert_eq!(slugify("***"), "patient");
    }
}
