use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::ImportError;
use crate::import::{
    validation::{ReadingValidator, ValidationReport},
    ImportFormat,
};
use crate::models::{DoseLog, DoseStatus, SensorReading};

const REQUIRED_READING_COLUMNS: [&str; 4] = ["timestamp", "heart_rate", "hrv", "eda"];
const REQUIRED_DOSE_COLUMNS: [&str; 3] = ["timestamp", "medication", "status"];

/// CSV importer with flexible column mapping
pub struct CsvImporter {
    column_mapping: HashMap<String, String>,
    validator: ReadingValidator,
}

impl CsvImporter {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        // Common column name variations
        Self::add_mapping(
            &mut column_mapping,
            "timestamp",
            &["timestamp", "time", "datetime", "date_time", "recorded_at"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "heart_rate",
            &["heart_rate", "hr", "heartrate", "bpm", "pulse"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "hrv",
            &["hrv", "rmssd", "hrv_ms", "heart_rate_variability"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "eda",
            &["eda", "gsr", "skin_conductance", "eda_us", "electrodermal_activity"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "location",
            &["location", "place", "setting"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "activity",
            &["activity", "trigger", "context"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "medication",
            &["medication", "medicine", "drug", "med"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "status",
            &["status", "taken", "dose_status"],
        );

        Self {
            column_mapping,
            validator: ReadingValidator::new(),
        }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    pub fn parse_datetime(date_str: &str) -> Result<DateTime<Utc>, ImportError> {
        let date_str = date_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
            return Ok(dt.with_timezone(&Utc));
        }

        // Naive timestamps are taken as UTC
        let formats = [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M",
            "%d/%m/%Y %H:%M:%S",
            "%m/%d/%Y %H:%M:%S",
        ];

        for format in &formats {
            if let Ok(naive_dt) = NaiveDateTime::parse_from_str(date_str, format) {
                return Ok(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
            }
        }

        // Seconds since epoch
        if let Ok(timestamp) = date_str.parse::<i64>() {
            if let Some(dt) = DateTime::from_timestamp(timestamp, 0) {
                return Ok(dt);
            }
        }

        Err(ImportError::ParseError {
            row: 0,
            reason: format!("Unable to parse datetime: {}", date_str),
        })
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    /// Map each standard column name to its index, failing on missing ones
    fn column_indices(
        &self,
        headers: &csv::StringRecord,
        required: &[&str],
    ) -> Result<HashMap<String, usize>, ImportError> {
        let mut indices = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            indices.entry(self.normalize_column_name(header)).or_insert(i);
        }

        for column in required {
            if !indices.contains_key(*column) {
                return Err(ImportError::MissingColumn {
                    column: column.to_string(),
                });
            }
        }

        Ok(indices)
    }

    fn field<'r>(record: &'r csv::StringRecord, indices: &HashMap<String, usize>, column: &str) -> Option<&'r str> {
        indices
            .get(column)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn number(
        record: &csv::StringRecord,
        indices: &HashMap<String, usize>,
        column: &str,
        row: usize,
    ) -> Result<f64, ImportError> {
        let raw = Self::field(record, indices, column).ok_or_else(|| ImportError::ParseError {
            row,
            reason: format!("empty {}", column),
        })?;
        raw.parse::<f64>().map_err(|_| ImportError::ParseError {
            row,
            reason: format!("invalid {} value '{}'", column, raw),
        })
    }

    fn parse_reading(
        record: &csv::StringRecord,
        indices: &HashMap<String, usize>,
        row: usize,
    ) -> Result<SensorReading, ImportError> {
        let timestamp = Self::field(record, indices, "timestamp")
            .ok_or_else(|| ImportError::ParseError {
                row,
                reason: "empty timestamp".to_string(),
            })
            .and_then(|v| {
                Self::parse_datetime(v).map_err(|_| ImportError::ParseError {
                    row,
                    reason: format!("invalid timestamp '{}'", v),
                })
            })?;

        Ok(SensorReading {
            timestamp,
            heart_rate: Self::number(record, indices, "heart_rate", row)?,
            hrv: Self::number(record, indices, "hrv", row)?,
            eda: Self::number(record, indices, "eda", row)?,
            location: Self::field(record, indices, "location").map(str::to_string),
            activity: Self::field(record, indices, "activity").map(str::to_string),
        })
    }

    /// Read readings from any CSV source. Unparseable and out-of-range rows
    /// are skipped with a warning; a missing required column is an error.
    pub fn read_readings<R: Read>(&self, source: R) -> Result<Vec<SensorReading>> {
        Ok(self.read_report(source)?.valid)
    }

    /// Parse and validate, keeping the CSV line of every rejected reading
    pub fn read_report<R: Read>(&self, source: R) -> Result<ValidationReport> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers = reader.headers()?.clone();
        let indices = self.column_indices(&headers, &REQUIRED_READING_COLUMNS)?;

        let mut readings = Vec::new();
        for (i, result) in reader.records().enumerate() {
            // Header is row 1
            let row = i + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(row, error = %e, "Skipping malformed CSV row");
                    continue;
                }
            };

            match Self::parse_reading(&record, &indices, row) {
                Ok(reading) => readings.push((row, reading)),
                Err(e) => warn!(row, error = %e, "Skipping unparseable reading"),
            }
        }

        let report = self.validator.clean_rows(readings);
        debug!(
            valid = report.valid.len(),
            rejected = report.rejected.len(),
            duplicates = report.duplicates_removed,
            "CSV readings parsed"
        );

        Ok(report)
    }

    /// Read dose logs (`timestamp,medication,status`) from any CSV source
    pub fn read_doses<R: Read>(&self, source: R) -> Result<Vec<DoseLog>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers = reader.headers()?.clone();
        let indices = self.column_indices(&headers, &REQUIRED_DOSE_COLUMNS)?;

        let mut doses = Vec::new();
        for (i, result) in reader.records().enumerate() {
            let row = i + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(row, error = %e, "Skipping malformed CSV row");
                    continue;
                }
            };

            let timestamp = Self::field(&record, &indices, "timestamp").map(Self::parse_datetime);
            let medication = Self::field(&record, &indices, "medication");
            let status = Self::field(&record, &indices, "status").map(str::parse::<DoseStatus>);

            match (timestamp, medication, status) {
                (Some(Ok(timestamp)), Some(medication), Some(Ok(status))) => doses.push(DoseLog {
                    timestamp,
                    medication: medication.to_string(),
                    status,
                }),
                _ => warn!(row, "Skipping unparseable dose log row"),
            }
        }

        doses.sort_by_key(|d| d.timestamp);
        Ok(doses)
    }

    pub fn import_doses(&self, file_path: &Path) -> Result<Vec<DoseLog>> {
        let file = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open dose log {}", file_path.display()))?;
        self.read_doses(file)
    }
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for CsvImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase() == "csv")
            .unwrap_or(false)
    }

    fn import_file(&self, file_path: &Path) -> Result<Vec<SensorReading>> {
        let file = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        self.read_readings(file)
    }

    fn get_format_name(&self) -> &'static str {
        "CSV"
    }
}
