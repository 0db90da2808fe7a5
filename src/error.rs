//! Unified error hierarchy for calmsignal
//!
//! The scoring, prediction and aggregation core never returns errors; empty or
//! degenerate input resolves to neutral results. These types cover the
//! boundary: importing records, writing reports, loading configuration and
//! consulting the advisory signal.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for calmsignal operations
#[derive(Debug, Error)]
pub enum CalmSignalError {
    /// Invalid request parameters (unknown report period, bad date range)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reading or dose-log import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Report export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Advisory signal errors
    #[error("Advisory error: {0}")]
    Advisory(#[from] AdvisoryError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Import errors
#[derive(Debug, Error)]
pub enum ImportError {
    /// File not found at specified path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Unsupported file format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Row-level parse failure
    #[error("Parse error at row {row}: {reason}")]
    ParseError { row: usize, reason: String },

    /// Missing required column
    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    /// Sensor value outside its physical range
    #[error("Value out of range for {field}: {value}")]
    OutOfRange { field: String, value: f64 },
}

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Advisory signal errors. Never fatal: the predictor falls back to its own fit.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    /// The advisory call did not complete within the configured timeout
    #[error("Advisory signal timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The advisory source is not reachable or not configured
    #[error("Advisory signal unavailable: {reason}")]
    Unavailable { reason: String },

    /// The advisory source answered with something unusable
    #[error("Invalid advisory response: {reason}")]
    InvalidResponse { reason: String },
}

/// Result type alias for calmsignal operations
pub type Result<T> = std::result::Result<T, CalmSignalError>;

impl CalmSignalError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CalmSignalError::Validation(_) => ErrorSeverity::Warning,
            CalmSignalError::Import(ImportError::OutOfRange { .. }) => ErrorSeverity::Warning,
            CalmSignalError::Import(ImportError::ParseError { .. }) => ErrorSeverity::Warning,
            CalmSignalError::Advisory(_) => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CalmSignalError::Import(ImportError::FileNotFound { path }) => {
                format!("Could not find readings file: {}", path.display())
            }
            CalmSignalError::Import(ImportError::MissingColumn { column }) => {
                format!(
                    "The readings file has no '{}' column. Expected timestamp, heart_rate, hrv and eda.",
                    column
                )
            }
            CalmSignalError::Advisory(_) => {
                "Overload advisory was unavailable; using on-device prediction only.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = CalmSignalError::Import(ImportError::OutOfRange {
            field: "heart_rate".to_string(),
            value: 400.0,
        });
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = CalmSignalError::Advisory(AdvisoryError::Timeout { timeout_ms: 2000 });
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::INFO);

        let err = CalmSignalError::Configuration("bad time zone".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Error);

        let err = CalmSignalError::Validation("Invalid time period: fortnight".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_user_messages() {
        let err = CalmSignalError::Import(ImportError::FileNotFound {
            path: PathBuf::from("readings.csv"),
        });
        assert!(err.user_message().contains("Could not find"));

        let err = CalmSignalError::Advisory(AdvisoryError::Unavailable {
            reason: "offline".to_string(),
        });
        assert!(err.user_message().contains("on-device"));
    }
}
