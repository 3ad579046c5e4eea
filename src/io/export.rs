//! CSV export for simulated hour records.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::HourRecord;

/// Column header, one row per simulated hour.
const HEADER: &str = "timestamp,price_dkk_per_kwh,wind_ms,wind_kw,pv_kw,\
                      consumption_kw,net_load_kw,battery_kw,grid_kw,\
                      battery_soc_kwh,action";

/// Exports hour records to a CSV file at the given path.
///
/// Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(records: &[HourRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(records, buf)
}

/// Writes hour records as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[HourRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in records {
        wtr.write_record(&[
            r.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            format!("{:.4}", r.price_dkk_per_kwh),
            format!("{:.2}", r.wind_ms),
            format!("{:.4}", r.wind_kw),
            format!("{:.4}", r.pv_kw),
            format!("{:.4}", r.consumption_kw),
            format!("{:.4}", r.net_load_kw),
            format!("{:.4}", r.battery_kw),
            format!("{:.4}", r.grid_kw),
            format!("{:.4}", r.battery_soc_kwh),
            r.action.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::sim::Action;

    fn record(i: i64) -> HourRecord {
        HourRecord {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i),
            price_dkk_per_kwh: 0.85,
            wind_ms: 6.0,
            wind_kw: 0.375,
            pv_kw: 0.0,
            consumption_kw: 4.0,
            net_load_kw: 3.625,
            battery_kw: -2.0,
            grid_kw: 1.625,
            battery_soc_kwh: 3.0,
            action: Action::Discharge,
        }
    }

    #[test]
    fn header_and_one_row_per_hour() {
        let records: Vec<_> = (0..3).map(record).collect();
        let mut out = Vec::new();
        write_csv(&records, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("timestamp,price_dkk_per_kwh,"));
        assert!(lines[0].ends_with(",battery_soc_kwh,action"));
        assert_eq!(
            lines[1],
            "2025-01-01T00:00:00Z,0.8500,6.00,0.3750,0.0000,4.0000,3.6250,-2.0000,1.6250,3.0000,discharge"
        );
    }

    #[test]
    fn output_is_deterministic() {
        let records: Vec<_> = (0..24).map(record).collect();
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_csv(&records, &mut a).unwrap();
        write_csv(&records, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hours.csv");
        export_csv(&[record(0)], &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
