// Library interface for calmsignal modules
// This allows integration tests and benchmarks to access the core functionality

pub mod baseline;
pub mod config;
pub mod correlation;
pub mod error;
pub mod export;
pub mod forecast;
pub mod import;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod prediction;
pub mod stress;
pub mod trends;

// Re-export commonly used types for convenience
pub use models::*;
pub use baseline::BaselineNormalizer;
pub use stress::{ScoringConfig, StressScorer};
pub use prediction::{AdvisorySignal, AdvisorySource, OverloadPredictor, PredictionConfig};
pub use trends::{HistoricalAggregator, ReportWindow, TimePeriod, TrendDirection, TrendReport};
pub use correlation::{CorrelationAnalyzer, CorrelationResult, Impact};
pub use forecast::{Anomaly, ForecastPoint, Forecaster};
pub use pipeline::{PredictionWindow, ReadingAssessment, StressPipeline};
pub use error::{CalmSignalError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
