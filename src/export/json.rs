use super::ExportError;
use std::io::Write;
use std::path::Path;

/// Write any serializable value as pretty JSON
pub fn write_json<T, W>(data: &T, mut out: W) -> Result<(), ExportError>
where
    T: serde::Serialize,
    W: Write,
{
    let json_data = serde_json::to_string_pretty(data)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    out.write_all(json_data.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Export any serializable data structure to JSON
pub fn export_json<T, P>(data: &T, output_path: P) -> Result<(), ExportError>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let file = std::fs::File::create(output_path)?;
    write_json(data, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trends::TrendReport;
    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    #[test]
    fn test_export_trend_report() {
        let day = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        let report = TrendReport::empty("day".to_string(), day, day);

        let temp_file = NamedTempFile::new().unwrap();
        export_json(&report, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("\"time_period\": \"day\""));
        assert!(content.contains("\"total_data_points\": 0"));
        assert!(content.contains("\"trend_direction\": \"stable\""));

        let parsed: TrendReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_export_json_generic() {
        #[derive(serde::Serialize)]
        struct TestData {
            name: String,
            value: u32,
        }

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        let mut out = Vec::new();
        write_json(&data, &mut out).unwrap();

        let content = String::from_utf8(out).unwrap();
        assert!(content.contains("\"name\": \"test\""));
        assert!(content.contains("\"value\": 42"));
    }
}
