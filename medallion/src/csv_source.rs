//! Raw records from CSV exports
//!
//! Archived API dumps are stored as CSV with the raw record columns:
//! `entity_id,metric,timestamp,value,unit,source,ingested_at`. The `unit`
//! column may be empty. A row that cannot be read is reported with its line
//! number and the remaining rows are still imported.

use crate::error::{PipelineError, Result, ValidationIssue, ValidationReason};
use crate::model::{RawRecord, RawValue};
use csv::StringRecord;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

const REQUIRED_COLUMNS: [&str; 6] = ["entity_id", "metric", "timestamp", "value", "source", "ingested_at"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    entity_id: String,
    metric: String,
    timestamp: String,
    value: String,
    #[serde(default)]
    unit: Option<String>,
    source: String,
    ingested_at: String,
}

impl From<CsvRow> for RawRecord {
    fn from(row: CsvRow) -> Self {
        // numeric text becomes a number; anything else is left for validation
        let value = match row.value.trim().parse::<f64>() {
            Ok(v) => RawValue::Number(v),
            Err(_) => RawValue::Text(row.value),
        };
        RawRecord {
            entity_id: row.entity_id,
            metric: row.metric,
            timestamp: row.timestamp,
            value,
            unit: row.unit.filter(|u| !u.trim().is_empty()),
            source: row.source,
            ingested_at: row.ingested_at,
        }
    }
}

/// Records read from one CSV export, and the rows that had to be skipped
#[derive(Debug, Clone, Default)]
pub struct CsvImport {
    pub records: Vec<RawRecord>,
    pub rejected: Vec<ValidationIssue>,
}

/// Load raw records from a CSV file
pub fn read_raw_csv(path: impl AsRef<Path>) -> Result<CsvImport> {
    let file = std::fs::File::open(path)?;
    read_raw_records(file)
}

/// Load raw records from any CSV reader
///
/// Fails only when the header lacks a required column or the reader itself
/// fails; single bad rows end up in [`CsvImport::rejected`].
pub fn read_raw_records<R: Read>(reader: R) -> Result<CsvImport> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let absent: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !absent.is_empty() {
        return Err(PipelineError::MalformedInput(format!(
            "missing columns: {}",
            absent.join(", ")
        )));
    }

    let mut import = CsvImport::default();
    for row in csv_reader.records() {
        let parsed = match row {
            Ok(row) => row
                .deserialize::<CsvRow>(Some(&headers))
                .map(RawRecord::from)
                .map_err(|e| rejected_row(&headers, Some(&row), &e)),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => Err(rejected_row(&headers, None, &e)),
        };
        match parsed {
            Ok(record) => import.records.push(record),
            Err(issue) => {
                warn!(issue = %issue, "skipped csv row");
                import.rejected.push(issue);
            }
        }
    }

    debug!(
        records = import.records.len(),
        rejected = import.rejected.len(),
        "read raw records from csv"
    );
    Ok(import)
}

fn rejected_row(headers: &StringRecord, row: Option<&StringRecord>, error: &csv::Error) -> ValidationIssue {
    let field = |name: &str| {
        row.and_then(|row| {
            headers
                .iter()
                .position(|h| h == name)
                .and_then(|i| row.get(i))
        })
        .unwrap_or_default()
        .to_string()
    };
    let line = error
        .position()
        .or_else(|| row.and_then(|r| r.position()))
        .map(|p| p.line())
        .unwrap_or_default();

    ValidationIssue {
        entity_id: field("entity_id"),
        metric: field("metric"),
        timestamp: field("timestamp"),
        source: field("source"),
        reason: ValidationReason::Malformed {
            line,
            detail: error.to_string(),
        },
    }
}
