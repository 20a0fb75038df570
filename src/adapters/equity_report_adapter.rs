//! CSV equity curve writer.
//!
//! One row per date, one column per named curve. A curve with no point on
//! a date (e.g. a run that halted early) leaves that cell empty.

use crate::domain::error::RebalancerError;
use crate::ports::report_port::{NamedCurve, ReportPort};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Write;

pub struct CsvEquityReport;

impl CsvEquityReport {
    /// Write the curves as CSV to any writer.
    pub fn write_to<W: Write>(curves: &[NamedCurve<'_>], out: W) -> Result<(), RebalancerError> {
        let mut rows: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        for (col, curve) in curves.iter().enumerate() {
            for point in curve.points {
                rows.entry(point.date).or_insert_with(|| vec![None; curves.len()])[col] =
                    Some(point.equity);
            }
        }

        let mut wtr = csv::Writer::from_writer(out);
        let header = std::iter::once("date").chain(curves.iter().map(|c| c.name));
        wtr.write_record(header).map_err(csv_error)?;

        for (date, values) in rows {
            let record = std::iter::once(date.format("%Y-%m-%d").to_string()).chain(
                values
                    .into_iter()
                    .map(|v| v.map(|e| format!("{e:.2}")).unwrap_or_default()),
            );
            wtr.write_record(record).map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvEquityReport {
    fn write(&self, curves: &[NamedCurve<'_>], output_path: &str) -> Result<(), RebalancerError> {
        let file = std::fs::File::create(output_path)?;
        Self::write_to(curves, file)
    }
}

fn csv_error(e: csv::Error) -> RebalancerError {
    RebalancerError::Data {
        reason: format!("failed to write equity CSV: {e}"),
    }
}
