use crate::error::ImportError;
use crate::models::{DoseLog, SensorReading};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod csv;
pub mod json;
pub mod validation;

/// Trait for importing sensor readings from different file formats
pub trait ImportFormat {
    /// Check if this importer can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Import readings from the file, validated and in time order
    fn import_file(&self, file_path: &Path) -> Result<Vec<SensorReading>>;

    /// Get the format name for this importer
    fn get_format_name(&self) -> &'static str;
}

/// Manager for coordinating different import formats
pub struct ImportManager {
    importers: Vec<Box<dyn ImportFormat>>,
}

impl ImportManager {
    /// Create a new import manager with all available importers
    pub fn new() -> Self {
        let importers: Vec<Box<dyn ImportFormat>> = vec![
            Box::new(csv::CsvImporter::new()),
            Box::new(json::JsonImporter::new()),
        ];

        Self { importers }
    }

    /// Import a single file, auto-detecting the format
    pub fn import_file(&self, file_path: &Path) -> Result<Vec<SensorReading>> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound {
                path: file_path.to_path_buf(),
            }
            .into());
        }

        let importer = self
            .importers
            .iter()
            .find(|importer| importer.can_import(file_path))
            .ok_or_else(|| ImportError::UnsupportedFormat {
                format: file_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            })?;

        let readings = importer.import_file(file_path)?;
        info!(
            file = %file_path.display(),
            format = importer.get_format_name(),
            readings = readings.len(),
            "Imported readings"
        );
        Ok(readings)
    }

    /// Import every supported file in a directory, merged in time order.
    /// Files that fail to import are skipped with a warning.
    pub fn import_directory(&self, dir_path: &Path) -> Result<Vec<SensorReading>> {
        let mut all = Vec::new();

        for file_path in self.collect_importable_files(dir_path)? {
            match self.import_file(&file_path) {
                Ok(mut readings) => all.append(&mut readings),
                Err(e) => warn!(file = %file_path.display(), error = %e, "Failed to import file"),
            }
        }

        all.sort_by_key(|r| r.timestamp);
        Ok(all)
    }

    /// Import a path that may be a file or a directory
    pub fn import_path(&self, path: &Path) -> Result<Vec<SensorReading>> {
        if path.is_dir() {
            self.import_directory(path)
        } else {
            self.import_file(path)
        }
    }

    /// Import medication dose logs (CSV only)
    pub fn import_doses(&self, file_path: &Path) -> Result<Vec<DoseLog>> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound {
                path: file_path.to_path_buf(),
            }
            .into());
        }
        csv::CsvImporter::new().import_doses(file_path)
    }

    /// Collect all files that can be imported from a directory
    fn collect_importable_files(&self, dir_path: &Path) -> Result<Vec<PathBuf>> {
        if !dir_path.is_dir() {
            anyhow::bail!("Path is not a directory: {}", dir_path.display());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir_path)? {
            let path = entry?.path();
            if path.is_file() && self.can_import_file(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    pub fn can_import_file(&self, file_path: &Path) -> bool {
        self.importers.iter().any(|importer| importer.can_import(file_path))
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CSV_DATA: &str = "timestamp,heart_rate,hrv,eda\n2024-03-01T09:00:00Z,72,48,9\n";
    const JSON_DATA: &str = r#"[{"timestamp": "2024-03-01T08:00:00Z", "heart_rate": 70, "hrv": 50, "eda": 10}]"#;

    #[test]
    fn test_import_directory_merges_formats() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csv"), CSV_DATA).unwrap();
        fs::write(dir.path().join("b.json"), JSON_DATA).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let readings = ImportManager::new().import_path(dir.path()).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].heart_rate, 70.0);
    }

    #[test]
    fn test_missing_file() {
        let err = ImportManager::new()
            .import_file(Path::new("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("readings.xml");
        fs::write(&path, "<readings/>").unwrap();

        let err = ImportManager::new().import_file(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::UnsupportedFormat { format }) if format == "xml"
        ));
    }
}
