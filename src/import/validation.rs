use crate::error::ImportError;
use crate::models::SensorReading;
use std::ops::RangeInclusive;
use tracing::warn;

/// Physical ranges accepted for each sensor signal
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRanges {
    pub heart_rate: RangeInclusive<f64>,
    pub hrv: RangeInclusive<f64>,
    pub eda: RangeInclusive<f64>,
}

impl Default for ValidationRanges {
    fn default() -> Self {
        ValidationRanges {
            heart_rate: 0.0..=300.0,
            hrv: 0.0..=500.0,
            eda: 0.0..=100.0,
        }
    }
}

/// Outcome of validating a batch of readings
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub valid: Vec<SensorReading>,
    /// Source row (CSV line or 1-based array position) of each rejected reading
    pub rejected: Vec<(usize, ImportError)>,
    pub duplicates_removed: usize,
}

/// Rejects readings the scorer should never see
pub struct ReadingValidator {
    ranges: ValidationRanges,
}

impl ReadingValidator {
    pub fn new() -> Self {
        ReadingValidator {
            ranges: ValidationRanges::default(),
        }
    }

    pub fn with_ranges(ranges: ValidationRanges) -> Self {
        ReadingValidator { ranges }
    }

    /// Check a single reading against the configured ranges
    pub fn validate(&self, reading: &SensorReading) -> Result<(), ImportError> {
        Self::check("heart_rate", reading.heart_rate, &self.ranges.heart_rate)?;
        Self::check("hrv", reading.hrv, &self.ranges.hrv)?;
        Self::check("eda", reading.eda, &self.ranges.eda)?;
        Ok(())
    }

    fn check(field: &str, value: f64, range: &RangeInclusive<f64>) -> Result<(), ImportError> {
        if value.is_finite() && range.contains(&value) {
            Ok(())
        } else {
            Err(ImportError::OutOfRange {
                field: field.to_string(),
                value,
            })
        }
    }

    /// Drop invalid readings, sort by time and remove exact-timestamp
    /// duplicates (the first occurrence wins). Rows are numbered by position.
    pub fn clean(&self, readings: Vec<SensorReading>) -> ValidationReport {
        self.clean_rows(readings.into_iter().enumerate().map(|(i, r)| (i + 1, r)))
    }

    /// Like [`clean`](Self::clean), with each reading tagged by its source row
    pub fn clean_rows<I>(&self, rows: I) -> ValidationReport
    where
        I: IntoIterator<Item = (usize, SensorReading)>,
    {
        let mut report = ValidationReport::default();

        for (row, reading) in rows {
            match self.validate(&reading) {
                Ok(()) => report.valid.push(reading),
                Err(e) => {
                    warn!(row, error = %e, "Skipping invalid reading");
                    report.rejected.push((row, e));
                }
            }
        }

        report.valid.sort_by_key(|r| r.timestamp);
        let before = report.valid.len();
        report.valid.dedup_by_key(|r| r.timestamp);
        report.duplicates_removed = before - report.valid.len();

        report
    }
}

impl Default for ReadingValidator {
    fn default() -> Self {
        Self::new()
    }
}
