use crate::models::ScoredReading;
use crate::trends::TrendReport;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::info;

pub use crate::error::ExportError;

pub mod csv;
pub mod json;
pub mod text;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Csv,
    Json,
    Text,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl ExportFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

/// Export data type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportType {
    TrendReport,
    ScoredReadings,
}

pub struct ExportManager;

impl ExportManager {
    pub fn new() -> Self {
        ExportManager
    }

    /// Render a trend report to any writer
    pub fn write_report<W: Write>(
        &self,
        report: &TrendReport,
        format: ExportFormat,
        writer: W,
    ) -> Result<(), ExportError> {
        match format {
            ExportFormat::Csv => csv::write_trend_report(report, writer),
            ExportFormat::Json => json::write_json(report, writer),
            ExportFormat::Text => text::write_trend_report(report, writer),
        }
    }

    pub fn export_report<P: AsRef<Path>>(
        &self,
        report: &TrendReport,
        format: ExportFormat,
        output_path: P,
    ) -> Result<(), ExportError> {
        let path = output_path.as_ref();
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write_report(report, format, &mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), ?format, "Trend report exported");
        Ok(())
    }

    pub fn export_readings<P: AsRef<Path>>(
        &self,
        readings: &[ScoredReading],
        format: ExportFormat,
        output_path: P,
    ) -> Result<(), ExportError> {
        match format {
            ExportFormat::Csv => csv::export_scored_readings(readings, output_path),
            ExportFormat::Json => json::export_json(&readings, output_path),
            ExportFormat::Text => Err(ExportError::UnsupportedFormat(format!(
                "{:?} format for {:?} export type not yet implemented",
                format,
                ExportType::ScoredReadings
            ))),
        }
    }
}

impl Default for ExportManager {
    fn default() -> Self {
        Self::new()
    }
}
