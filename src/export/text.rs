use super::ExportError;
use crate::correlation::CorrelationResult;
use crate::trends::{StressBreakdown, TrendReport};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Write a trend report as aligned plain text
pub fn write_trend_report<W: Write>(report: &TrendReport, mut out: W) -> Result<(), ExportError> {
    let summary = &report.summary;

    writeln!(out, "{:=<60}", "")?;
    writeln!(out, "STRESS TREND REPORT")?;
    writeln!(out, "{:=<60}", "")?;
    writeln!(out)?;

    writeln!(out, "{:<20} {}", "Period:", summary.period)?;
    writeln!(out, "{:<20} {}", "Start Date:", summary.start_date.format("%Y-%m-%d"))?;
    writeln!(out, "{:<20} {}", "End Date:", summary.end_date.format("%Y-%m-%d"))?;
    writeln!(out)?;

    writeln!(out, "SUMMARY")?;
    writeln!(out, "{:-<60}", "")?;
    writeln!(out, "{:<20} {:>10}", "Total Data Points", summary.total_points)?;
    writeln!(out, "{:<20} {:>10.1}", "Average Stress", summary.average)?;
    writeln!(out, "{:<20} {:>10.1}", "Peak Stress", summary.peak)?;
    writeln!(out, "{:<20} {:>10.1}", "Min Stress", summary.min)?;
    writeln!(out, "{:<20} {:>10}", "Trend Direction", summary.trend_direction.to_string())?;
    writeln!(out, "{:<20} {:>10.1}", "Trend Change (%)", summary.trend_percentage_change)?;

    if report.is_empty() {
        writeln!(out)?;
        writeln!(out, "No readings in this period.")?;
        return Ok(());
    }

    write_breakdown(&mut out, "STRESS BY LOCATION", "Location", &report.stress_by_location)?;
    write_breakdown(&mut out, "HARDEST TIMES", "Time of Day", &report.hardest_times)?;
    write_breakdown(&mut out, "TRIGGERS", "Trigger", &report.trigger_frequencies)?;

    if !report.stress_trend.is_empty() {
        writeln!(out)?;
        writeln!(out, "DAILY STRESS")?;
        writeln!(out, "{:-<60}", "")?;
        writeln!(out, "{:<12} {:>10} {:>10} {:>8}", "Date", "Average", "Peak", "Points")?;
        for day in &report.stress_trend {
            writeln!(
                out,
                "{:<12} {:>10.1} {:>10.1} {:>8}",
                day.date.format("%Y-%m-%d"),
                day.average_stress,
                day.peak_stress,
                day.data_points
            )?;
        }
    }

    Ok(())
}

fn write_breakdown<W: Write>(
    out: &mut W,
    title: &str,
    label: &str,
    entries: &[StressBreakdown],
) -> Result<(), ExportError> {
    if entries.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "{}", title)?;
    writeln!(out, "{:-<60}", "")?;
    writeln!(
        out,
        "{:<20} {:>8} {:>8} {:>10} {:>10}",
        label, "Average", "Peak", "Frequency", "Percent"
    )?;
    for entry in entries {
        writeln!(
            out,
            "{:<20} {:>8.1} {:>8.1} {:>10} {:>9.1}%",
            entry.key, entry.average_stress, entry.peak_stress, entry.frequency, entry.percentage_of_total
        )?;
    }
    Ok(())
}

pub fn export_trend_report<P: AsRef<Path>>(report: &TrendReport, output_path: P) -> Result<(), ExportError> {
    let file = std::fs::File::create(output_path)?;
    write_trend_report(report, file)
}

/// Write per-medication adherence correlations
pub fn write_correlations<W: Write>(
    results: &BTreeMap<String, CorrelationResult>,
    mut out: W,
) -> Result<(), ExportError> {
    writeln!(out, "MEDICATION ADHERENCE")?;
    writeln!(out, "{:-<72}", "")?;
    writeln!(
        out,
        "{:<20} {:>9} {:>12} {:>10} {:>10} {:>8}",
        "Medication", "Adherence", "Coefficient", "Taken", "Missed", "Impact"
    )?;
    for (name, r) in results {
        writeln!(
            out,
            "{:<20} {:>8.0}% {:>12.2} {:>10.1} {:>10.1} {:>8}",
            name,
            r.overall_adherence_rate * 100.0,
            r.coefficient,
            r.stress_with_adherence,
            r.stress_without_adherence,
            r.impact.to_string()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::Impact;
    use chrono::NaiveDate;

    #[test]
    fn test_empty_report_text() {
        let day = NaiveDate::from_ymd_opt(2024, 4, 7).unwrap();
        let mut out = Vec::new();
        write_trend_report(&TrendReport::empty("day".to_string(), day, day), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("STRESS TREND REPORT"));
        assert!(text.contains("No readings in this period."));
        assert!(!text.contains("STRESS BY LOCATION"));
    }

    #[test]
    fn test_correlation_table() {
        let mut results = BTreeMap::new();
        results.insert(
            "sertraline".to_string(),
            CorrelationResult {
                coefficient: -0.82,
                overall_adherence_rate: 0.75,
                stress_with_adherence: 38.0,
                stress_without_adherence: 66.5,
                impact: Impact::Positive,
                doses_analyzed: 8,
            },
        );

        let mut out = Vec::new();
        write_correlations(&results, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("sertraline"));
        assert!(text.contains("75%"));
        assert!(text.contains("-0.82"));
        assert!(text.contains("positive"));
    }
}
