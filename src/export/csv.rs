use super::ExportError;
use crate::models::ScoredReading;
use crate::trends::{StressBreakdown, TrendReport};
use csv::WriterBuilder;
use std::io::Write;
use std::path::Path;

pub const REPORT_TITLE: &str = "Stress Trend Report";

/// Write a trend report as CSV.
///
/// The layout is fixed: a title block, the metric table, then one table per
/// non-empty breakdown, each preceded by a blank line.
pub fn write_trend_report<W: Write>(report: &TrendReport, mut out: W) -> Result<(), ExportError> {
    let summary = &report.summary;

    {
        let mut wtr = table_writer(&mut out);
        wtr.write_record([REPORT_TITLE])?;
        wtr.write_record(["Period", summary.period.as_str()])?;
        wtr.write_record(["Start Date", &summary.start_date.format("%Y-%m-%d").to_string()])?;
        wtr.write_record(["End Date", &summary.end_date.format("%Y-%m-%d").to_string()])?;
        wtr.flush()?;
    }

    // An empty csv record is written as `""`, so blank lines bypass the writer
    out.write_all(b"\n")?;

    {
        let mut wtr = table_writer(&mut out);
        wtr.write_record(["Metric", "Value"])?;
        wtr.write_record(["Total Data Points", &summary.total_points.to_string()])?;
        wtr.write_record(["Average Stress", &format!("{:.1}", summary.average)])?;
        wtr.write_record(["Peak Stress", &format!("{:.1}", summary.peak)])?;
        wtr.write_record(["Min Stress", &format!("{:.1}", summary.min)])?;
        wtr.write_record(["Trend Direction", &summary.trend_direction.to_string()])?;
        wtr.write_record(["Trend Change (%)", &format!("{:.1}", summary.trend_percentage_change)])?;
        wtr.flush()?;
    }

    write_breakdown(&mut out, "Location", &report.stress_by_location)?;
    write_breakdown(&mut out, "Time of Day", &report.hardest_times)?;
    write_breakdown(&mut out, "Trigger", &report.trigger_frequencies)?;

    out.flush()?;
    Ok(())
}

fn table_writer<W: Write>(out: W) -> csv::Writer<W> {
    WriterBuilder::new().flexible(true).from_writer(out)
}

fn write_breakdown<W: Write>(
    out: &mut W,
    label: &str,
    entries: &[StressBreakdown],
) -> Result<(), ExportError> {
    if entries.is_empty() {
        return Ok(());
    }

    out.write_all(b"\n")?;
    let mut wtr = table_writer(&mut *out);
    wtr.write_record([label, "Average Stress", "Peak Stress", "Frequency", "Percentage"])?;
    for entry in entries {
        wtr.write_record([
            entry.key.as_str(),
            &format!("{:.1}", entry.average_stress),
            &format!("{:.1}", entry.peak_stress),
            &entry.frequency.to_string(),
            &format!("{:.1}", entry.percentage_of_total),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_trend_report<P: AsRef<Path>>(report: &TrendReport, output_path: P) -> Result<(), ExportError> {
    let file = std::fs::File::create(output_path)?;
    write_trend_report(report, file)
}

/// Export scored readings, one row per reading
pub fn export_scored_readings<P: AsRef<Path>>(
    readings: &[ScoredReading],
    output_path: P,
) -> Result<(), ExportError> {
    let mut wtr = WriterBuilder::new().from_path(output_path)?;

    wtr.write_record([
        "timestamp",
        "heart_rate",
        "hrv",
        "eda",
        "location",
        "activity",
        "stress_score",
        "state",
    ])?;

    for scored in readings {
        let r = &scored.reading;
        wtr.write_record([
            r.timestamp.to_rfc3339(),
            r.heart_rate.to_string(),
            r.hrv.to_string(),
            r.eda.to_string(),
            r.location.clone().unwrap_or_default(),
            r.activity.clone().unwrap_or_default(),
            format!("{:.1}", scored.stress_score),
            scored.state.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
