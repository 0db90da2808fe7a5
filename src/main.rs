use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use calmsignal::baseline::{BaselineNormalizer, DEFAULT_BASELINE_WINDOW};
use calmsignal::config::{AppConfig, PatientConfig};
use calmsignal::correlation::{CorrelationAnalyzer, CorrelationResult};
use calmsignal::error::{CalmSignalError, ExportError, ImportError};
use calmsignal::export::{json, text, ExportFormat, ExportManager};
use calmsignal::forecast::{series_from_trend, Forecaster};
use calmsignal::import::ImportManager;
use calmsignal::logging::{init_logging, LogConfig};
use calmsignal::models::{BaselineMetrics, ScoredReading, SensorReading, StressState};
use calmsignal::pipeline::{PredictionWindow, StressPipeline};
use calmsignal::prediction::{FileAdvisory, OverloadPredictor};
use calmsignal::stress::StressScorer;
use calmsignal::trends::{HistoricalAggregator, ReportWindow, TimePeriod, TrendReport};
use calmsignal::ScorePoint;

/// calmsignal - Stress analytics for wearable sensor readings
///
/// Scores heart rate, HRV and EDA readings against a personal baseline,
/// predicts imminent overload and summarizes stress history into reports.
#[derive(Parser)]
#[command(name = "calmsignal")]
#[command(author = "calmsignal Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Stress analytics for wearable sensor readings", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score readings and classify their stress state
    Score {
        /// Readings file or directory (CSV, JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Patient ID (default patient if omitted)
        #[arg(short, long)]
        patient: Option<String>,

        /// Write scored readings to this file instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of most recent readings to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Summarize stress history for a period
    Analyze {
        #[command(flatten)]
        source: ReportArgs,

        /// Output format (text, json, csv)
        #[arg(short = 'f', long, default_value = "text")]
        format: String,
    },

    /// Replay readings and show overload predictions
    Predict {
        /// Readings file or directory (CSV, JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Patient ID (default patient if omitted)
        #[arg(short, long)]
        patient: Option<String>,

        /// JSON file holding an advisory overload probability
        #[arg(short, long)]
        advisory: Option<PathBuf>,

        /// Show every reading, not only those with a prediction
        #[arg(long)]
        all: bool,
    },

    /// Export a trend report or scored readings
    Export {
        #[command(flatten)]
        source: ReportArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (csv, json, text); guessed from the extension if omitted
        #[arg(short = 'f', long)]
        format: Option<String>,

        /// Export scored readings instead of the trend report
        #[arg(long)]
        readings: bool,
    },

    /// Correlate medication adherence with stress
    Correlate {
        /// Readings file or directory (CSV, JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Dose log CSV (timestamp, medication, status)
        #[arg(short, long)]
        doses: PathBuf,

        /// Patient ID (default patient if omitted)
        #[arg(short, long)]
        patient: Option<String>,

        /// Break results down per medication
        #[arg(long)]
        by_medication: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Smooth daily stress, flag anomalies and project the coming days
    Forecast {
        #[command(flatten)]
        source: ReportArgs,

        /// Number of days to project (configured horizon if omitted)
        #[arg(long)]
        days: Option<u32>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration and patients
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct ReportArgs {
    /// Readings file or directory (CSV, JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Patient ID (default patient if omitted)
    #[arg(short, long)]
    patient: Option<String>,

    /// Report period (day, week, month)
    #[arg(long, default_value = "week")]
    period: String,

    /// Last day of the period (YYYY-MM-DD); defaults to the latest reading
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Explicit range start (YYYY-MM-DD); overrides --period
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Explicit range end (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    #[command(name = "path")]
    ShowPath,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Register a patient
    AddPatient {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Patient ID (derived from the name if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Resting heart rate (bpm)
        #[arg(long, requires_all = ["hrv", "eda"])]
        hr: Option<f64>,

        /// Resting HRV (ms)
        #[arg(long)]
        hrv: Option<f64>,

        /// Resting EDA (microsiemens)
        #[arg(long)]
        eda: Option<f64>,

        /// Hide overload predictions for this patient
        #[arg(long)]
        disable_prediction: bool,
    },

    /// Remove a patient
    RemovePatient { id: String },

    /// Make a patient the default
    SetDefault { id: String },

    /// Derive a patient's baseline from readings taken at rest
    Baseline {
        id: String,

        /// Readings file or directory taken at rest
        #[arg(short, long)]
        input: PathBuf,

        /// Number of most recent readings to average
        #[arg(short, long, default_value_t = DEFAULT_BASELINE_WINDOW)]
        window: usize,
    },
}

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "HR")]
    heart_rate: String,
    #[tabled(rename = "HRV")]
    hrv: String,
    #[tabled(rename = "EDA")]
    eda: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Location")]
    location: String,
}

#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Overload In")]
    eta: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Shown")]
    shown: String,
}

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Predicted")]
    predicted: String,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

/// Loaded configuration plus the patient being analyzed
struct Session {
    config: AppConfig,
    tz: Tz,
    baseline: BaselineMetrics,
    prediction_enabled: bool,
}

impl Session {
    fn load(config_path: Option<&Path>, patient: Option<&str>) -> Result<Self> {
        let config = AppConfig::load_or_default(config_path);
        let tz = config.settings.tz()?;
        let profile = config.resolve_patient(patient)?;

        let baseline = BaselineNormalizer::resolve(profile.and_then(|p| p.baseline));
        let prediction_enabled = profile.map(|p| p.prediction_enabled).unwrap_or(true);

        if let Some(p) = profile {
            tracing::info!(patient = %p.id, "Using patient profile");
        }

        Ok(Session {
            config,
            tz,
            baseline,
            prediction_enabled,
        })
    }

    fn pipeline(&self) -> StressPipeline {
        StressPipeline::with_components(
            StressScorer::with_config(self.config.scoring.clone()),
            OverloadPredictor::with_config(self.config.prediction.clone()),
        )
        .with_prediction_enabled(self.prediction_enabled)
    }

    fn aggregator(&self) -> HistoricalAggregator {
        HistoricalAggregator::with_config(self.config.trends.clone(), self.tz)
    }

    fn readings(&self, input: &Path) -> Result<Vec<SensorReading>> {
        let readings = ImportManager::new().import_path(input)?;
        if readings.is_empty() {
            eprintln!("{}", format!("No valid readings found in {}", input.display()).yellow());
        }
        Ok(readings)
    }

    fn scored(&self, input: &Path) -> Result<Vec<ScoredReading>> {
        let readings = self.readings(input)?;
        Ok(self.pipeline().score_history(&readings, &self.baseline))
    }

    fn report(&self, scored: &[ScoredReading], args: &ReportArgs) -> Result<TrendReport> {
        let window = match (args.from, args.to) {
            (Some(start), Some(end)) => ReportWindow::Range { start, end },
            _ => {
                let period: TimePeriod = args.period.parse().map_err(CalmSignalError::Validation)?;
                let as_of = args.as_of.unwrap_or_else(|| {
                    scored
                        .iter()
                        .map(|r| r.timestamp())
                        .max()
                        .unwrap_or_else(Utc::now)
                        .with_timezone(&self.tz)
                        .date_naive()
                });
                ReportWindow::Period { period, as_of }
            }
        };

        Ok(self.aggregator().aggregate(scored, &window))
    }
}

fn state_label(state: StressState) -> ColoredString {
    match state {
        StressState::Calm => state.as_str().green(),
        StressState::Rising => state.as_str().yellow(),
        StressState::Overload => state.as_str().red().bold(),
    }
}

fn cmd_score(session: &Session, input: &Path, output: Option<&Path>, limit: usize) -> Result<()> {
    let scored = session.scored(input)?;

    if let Some(path) = output {
        let format = ExportFormat::from_path(path).unwrap_or(ExportFormat::Csv);
        ExportManager::new().export_readings(&scored, format, path)?;
        println!(
            "{}",
            format!("✓ Wrote {} scored readings to {}", scored.len(), path.display()).green()
        );
        return Ok(());
    }

    let start = scored.len().saturating_sub(limit);
    let rows: Vec<ReadingRow> = scored[start..]
        .iter()
        .map(|s| ReadingRow {
            time: s.timestamp().with_timezone(&session.tz).format("%Y-%m-%d %H:%M").to_string(),
            heart_rate: format!("{:.0}", s.reading.heart_rate),
            hrv: format!("{:.0}", s.reading.hrv),
            eda: format!("{:.1}", s.reading.eda),
            score: format!("{:.1}", s.stress_score),
            state: s.state.to_string(),
            location: s.reading.location.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));

    let counts = |state: StressState| scored.iter().filter(|s| s.state == state).count();
    println!(
        "{} readings: {} {}, {} {}, {} {}",
        scored.len(),
        counts(StressState::Calm),
        state_label(StressState::Calm),
        counts(StressState::Rising),
        state_label(StressState::Rising),
        counts(StressState::Overload),
        state_label(StressState::Overload),
    );
    Ok(())
}

fn cmd_analyze(session: &Session, args: &ReportArgs, format: &str) -> Result<()> {
    let scored = session.scored(&args.input)?;
    let report = session.report(&scored, args)?;
    let format: ExportFormat = format.parse()?;

    let stdout = std::io::stdout();
    ExportManager::new().write_report(&report, format, stdout.lock())?;
    Ok(())
}

async fn cmd_predict(session: &Session, input: &Path, advisory: Option<&Path>, all: bool) -> Result<()> {
    let mut readings = session.readings(input)?;
    readings.sort_by_key(|r| r.timestamp);

    let pipeline = session.pipeline();
    let advisory = advisory.map(FileAdvisory::new);
    let mut window = PredictionWindow::new(session.config.prediction.window_size);
    let mut rows = Vec::new();
    let mut shown = 0usize;

    for reading in &readings {
        let recent = window.points();
        let assessment = match &advisory {
            Some(source) => {
                pipeline
                    .assess_with_advisory(reading, &session.baseline, &recent, source)
                    .await
            }
            None => pipeline.assess(reading, &session.baseline, &recent),
        };
        window.push(ScorePoint::new(reading.timestamp, assessment.stress_score));

        if assessment.display_prediction {
            shown += 1;
        }
        if !all && assessment.prediction.is_none() {
            continue;
        }

        rows.push(PredictionRow {
            time: reading.timestamp.with_timezone(&session.tz).format("%Y-%m-%d %H:%M").to_string(),
            score: format!("{:.1}", assessment.stress_score),
            state: assessment.state.to_string(),
            eta: assessment
                .prediction
                .map(|p| format!("{} min", p.eta_minutes))
                .unwrap_or_else(|| "-".to_string()),
            confidence: assessment
                .prediction
                .map(|p| format!("{:.0}%", p.confidence * 100.0))
                .unwrap_or_else(|| "-".to_string()),
            shown: if assessment.display_prediction { "yes" } else { "no" }.to_string(),
        });
    }

    if rows.is_empty() {
        println!("{}", "No overload predicted in these readings.".green());
    } else {
        println!("{}", Table::new(rows).with(Style::rounded()));
        println!("{} prediction(s) would be shown to the patient", shown.to_string().bold());
    }
    Ok(())
}

fn cmd_export(
    session: &Session,
    args: &ReportArgs,
    output: &Path,
    format: Option<&str>,
    readings_only: bool,
) -> Result<()> {
    let format = match format {
        Some(f) => f.parse()?,
        None => ExportFormat::from_path(output).ok_or_else(|| {
            ExportError::UnsupportedFormat(format!("cannot infer format of {}", output.display()))
        })?,
    };

    let scored = session.scored(&args.input)?;
    let manager = ExportManager::new();
    if readings_only {
        manager.export_readings(&scored, format, output)?;
    } else {
        let report = session.report(&scored, args)?;
        manager.export_report(&report, format, output)?;
    }

    println!("{}", format!("✓ Exported to {}", output.display()).green());
    Ok(())
}

fn cmd_correlate(session: &Session, input: &Path, doses: &Path, by_medication: bool, as_json: bool) -> Result<()> {
    let scored = session.scored(input)?;
    let doses = ImportManager::new().import_doses(doses)?;
    let points: Vec<ScorePoint> = scored.iter().map(|s| s.score_point()).collect();
    let analyzer = CorrelationAnalyzer::with_config(session.config.correlation.clone());

    let results = if by_medication {
        analyzer.analyze_by_medication(&doses, &points)
    } else {
        let mut all = std::collections::BTreeMap::new();
        all.insert("all medications".to_string(), analyzer.analyze(&doses, &points));
        all
    };

    if as_json {
        json::write_json(&results, std::io::stdout().lock())?;
    } else {
        text::write_correlations(&results, std::io::stdout().lock())?;
        for (name, result) in &results {
            print_impact(name, result);
        }
    }
    Ok(())
}

fn print_impact(name: &str, result: &CorrelationResult) {
    use calmsignal::correlation::Impact;
    let line = match result.impact {
        Impact::Positive => format!("{}: taking it goes with lower stress", name).green(),
        Impact::Negative => format!("{}: taking it goes with higher stress", name).red(),
        Impact::Neutral => format!("{}: no clear association ({} doses analyzed)", name, result.doses_analyzed).dimmed(),
    };
    println!("{}", line);
}

fn cmd_forecast(session: &Session, args: &ReportArgs, days: Option<u32>, as_json: bool) -> Result<()> {
    let scored = session.scored(&args.input)?;
    let report = session.report(&scored, args)?;
    let series = series_from_trend(&report.stress_trend);

    let forecaster = Forecaster::with_config(session.config.forecast.clone());
    let smoothed = forecaster.moving_average(&series);
    let anomalies = forecaster.detect_anomalies(&series);
    let points = forecaster.forecast(&series, days.unwrap_or(forecaster.config().horizon_days));

    if as_json {
        let out = serde_json::json!({
            "smoothed": smoothed,
            "anomalies": anomalies,
            "forecast": points,
        });
        json::write_json(&out, std::io::stdout().lock())?;
        return Ok(());
    }

    if points.is_empty() {
        println!("{}", "Not enough history to forecast.".yellow());
        return Ok(());
    }

    for a in &anomalies {
        println!(
            "{} {} averaged {:.1} (z = {:+.2})",
            "Anomaly:".red().bold(),
            a.date,
            a.value,
            a.z_score
        );
    }

    let rows: Vec<ForecastRow> = points
        .iter()
        .map(|p| ForecastRow {
            date: p.date.to_string(),
            predicted: format!("{:.1}", p.predicted),
            range: format!("{:.1} - {:.1}", p.lower_bound, p.upper_bound),
            confidence: format!("{:.0}%", p.confidence * 100.0),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

fn cmd_config(config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_config_path);

    match action {
        ConfigAction::ShowPath => println!("{}", path.display()),

        ConfigAction::Show => {
            let config = AppConfig::load_or_default(Some(&path));
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }

        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("Config file already exists: {} (use --force to overwrite)", path.display());
            }
            AppConfig::default().save_to_file(&path)?;
            println!("{}", format!("✓ Wrote default configuration to {}", path.display()).green());
        }

        ConfigAction::AddPatient {
            name,
            id,
            hr,
            hrv,
            eda,
            disable_prediction,
        } => {
            let mut config = AppConfig::load_or_default(Some(&path));
            let mut patient = PatientConfig::new(name, id);
            if let (Some(hr), Some(hrv), Some(eda)) = (hr, hrv, eda) {
                patient = patient.with_baseline(BaselineMetrics::new(hr, hrv, eda));
            }
            patient.prediction_enabled = !disable_prediction;
            let patient_id = patient.id.clone();

            config.add_patient(patient)?;
            config.save_to_file(&path)?;
            println!("{}", format!("✓ Added patient {}", patient_id).green());
        }

        ConfigAction::RemovePatient { id } => {
            let mut config = AppConfig::load_or_default(Some(&path));
            config.remove_patient(&id)?;
            config.save_to_file(&path)?;
            println!("{}", format!("✓ Removed patient {}", id).green());
        }

        ConfigAction::SetDefault { id } => {
            let mut config = AppConfig::load_or_default(Some(&path));
            config.set_default_patient(&id)?;
            config.save_to_file(&path)?;
            println!("{}", format!("✓ Default patient is now {}", id).green());
        }

        ConfigAction::Baseline { id, input, window } => {
            let mut config = AppConfig::load_or_default(Some(&path));
            let readings = ImportManager::new().import_path(&input)?;
            let baseline = BaselineNormalizer::from_calm_history(&readings, window)
                .ok_or_else(|| anyhow::anyhow!("No readings to derive a baseline from"))?;

            config
                .get_patient_mut(&id)
                .ok_or_else(|| anyhow::anyhow!("Patient not found: {}", id))?
                .set_baseline(baseline);
            config.save_to_file(&path)?;

            println!(
                "{}",
                format!(
                    "✓ Baseline for {}: HR {:.1} bpm, HRV {:.1} ms, EDA {:.2} µS",
                    id, baseline.baseline_hr, baseline.baseline_hrv, baseline.baseline_eda
                )
                .green()
            );
        }
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config { action } => cmd_config(config_path, action),

        Commands::Score {
            input,
            patient,
            output,
            limit,
        } => {
            let session = Session::load(config_path, patient.as_deref())?;
            cmd_score(&session, &input, output.as_deref(), limit)
        }

        Commands::Analyze { source, format } => {
            let session = Session::load(config_path, source.patient.as_deref())?;
            cmd_analyze(&session, &source, &format)
        }

        Commands::Predict {
            input,
            patient,
            advisory,
            all,
        } => {
            let session = Session::load(config_path, patient.as_deref())?;
            cmd_predict(&session, &input, advisory.as_deref(), all).await
        }

        Commands::Export {
            source,
            output,
            format,
            readings,
        } => {
            let session = Session::load(config_path, source.patient.as_deref())?;
            cmd_export(&session, &source, &output, format.as_deref(), readings)
        }

        Commands::Correlate {
            input,
            doses,
            patient,
            by_medication,
            json,
        } => {
            let session = Session::load(config_path, patient.as_deref())?;
            cmd_correlate(&session, &input, &doses, by_medication, json)
        }

        Commands::Forecast { source, days, json } => {
            let session = Session::load(config_path, source.patient.as_deref())?;
            cmd_forecast(&session, &source, days, json)
        }
    }
}

/// Print a failed command. Import and export failures get the friendlier
/// wording of the library error type.
fn report_failure(error: anyhow::Error) {
    let known = match error.downcast::<CalmSignalError>() {
        Ok(e) => e,
        Err(error) => match error.downcast::<ImportError>() {
            Ok(e) => CalmSignalError::Import(e),
            Err(error) => match error.downcast::<ExportError>() {
                Ok(e) => CalmSignalError::Export(e),
                Err(error) => {
                    eprintln!("{} {:#}", "Error:".red().bold(), error);
                    return;
                }
            },
        },
    };

    tracing::debug!(severity = ?known.severity(), error = %known, "Command failed");
    eprintln!("{} {}", "Error:".red().bold(), known.user_message());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = AppConfig::load_or_default(cli.config.as_deref()).settings;
    let mut log_config = LogConfig::from_verbosity(cli.verbose);
    if cli.verbose == 0 {
        // -v overrides the configured level
        log_config.level = settings.log_level;
    }
    log_config.format = settings.log_format;
    log_config.file_path = settings.log_file;

    if let Err(e) = init_logging(&log_config) {
        eprintln!("{}", format!("Logging unavailable: {}", e).dimmed());
    }

    if let Err(error) = run(cli).await {
        report_failure(error);
        std::process::exit(1);
    }
}
