use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::import::{validation::ReadingValidator, ImportFormat};
use crate::models::SensorReading;

/// Accepts either a bare array or an object wrapping one
#[derive(Deserialize)]
#[serde(untagged)]
enum ReadingsDocument {
    List(Vec<SensorReading>),
    Wrapped { readings: Vec<SensorReading> },
}

/// JSON importer for reading exports
pub struct JsonImporter {
    validator: ReadingValidator,
}

impl JsonImporter {
    pub fn new() -> Self {
        Self {
            validator: ReadingValidator::new(),
        }
    }

    pub fn read_readings<R: Read>(&self, source: R) -> Result<Vec<SensorReading>> {
        let document: ReadingsDocument =
            serde_json::from_reader(source).context("Invalid readings JSON")?;

        let readings = match document {
            ReadingsDocument::List(readings) => readings,
            ReadingsDocument::Wrapped { readings } => readings,
        };

        let report = self.validator.clean(readings);
        debug!(
            valid = report.valid.len(),
            rejected = report.rejected.len(),
            "JSON readings parsed"
        );
        Ok(report.valid)
    }
}

impl Default for JsonImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for JsonImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase() == "json")
            .unwrap_or(false)
    }

    fn import_file(&self, file_path: &Path) -> Result<Vec<SensorReading>> {
        let file = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        self.read_readings(std::io::BufReader::new(file))
    }

    fn get_format_name(&self) -> &'static str {
        "JSON"
    }
}
