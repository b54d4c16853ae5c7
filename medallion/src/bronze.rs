//! Bronze Store Adapter
//!
//! The only component allowed to write bronze. It types raw records and
//! appends them unchanged; values keep their source unit and timestamps keep
//! their reported offset. Records that cannot be typed are reported back and
//! skipped, the rest of the batch proceeds.

use crate::error::{Result, ValidationIssue, ValidationReason};
use crate::model::{RawPoint, RawRecord, RawValue};
use crate::store::BronzeWriter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one ingest batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Points newly written to bronze
    pub appended: usize,
    /// Records identical to a point already in bronze
    pub duplicates: usize,
    pub rejected: Vec<ValidationIssue>,
}

pub struct BronzeAdapter {
    writer: Arc<dyn BronzeWriter>,
}

impl BronzeAdapter {
    pub fn new(writer: Arc<dyn BronzeWriter>) -> Self {
        Self { writer }
    }

    /// Type and append a batch of raw records.
    ///
    /// Store failures abort the batch and are returned; invalid records never do.
    pub fn ingest(&self, records: &[RawRecord]) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for record in records {
            match parse_record(record) {
                Ok(point) => {
                    if self.writer.append(point)? {
                        report.appended += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(reason) => {
                    let issue = ValidationIssue {
                        entity_id: record.entity_id.clone(),
                        metric: record.metric.clone(),
                        timestamp: record.timestamp.clone(),
                        source: record.source.clone(),
                        reason,
                    };
                    warn!(issue = %issue, "rejected raw record");
                    report.rejected.push(issue);
                }
            }
        }

        info!(
            appended = report.appended,
            duplicates = report.duplicates,
            rejected = report.rejected.len(),
            "bronze ingest finished"
        );
        Ok(report)
    }
}

/// Type a raw record without changing its content.
pub fn parse_record(record: &RawRecord) -> std::result::Result<RawPoint, ValidationReason> {
    for (field, value) in [
        ("entity_id", &record.entity_id),
        ("metric", &record.metric),
        ("source", &record.source),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationReason::MissingField {
                field: field.to_string(),
            });
        }
    }

    // RFC 3339 requires an explicit offset, naive timestamps fail here
    let timestamp = DateTime::parse_from_rfc3339(record.timestamp.trim()).map_err(|e| {
        ValidationReason::Timestamp {
            detail: format!("'{}': {}", record.timestamp, e),
        }
    })?;
    let ingested_at = DateTime::parse_from_rfc3339(record.ingested_at.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ValidationReason::IngestedAt {
            detail: format!("'{}': {}", record.ingested_at, e),
        })?;

    let value = match &record.value {
        RawValue::Number(v) => *v,
        RawValue::Text(text) => text.trim().parse::<f64>().map_err(|_| ValidationReason::Value {
            detail: format!("'{}' is not numeric", text),
        })?,
    };
    if !value.is_finite() {
        return Err(ValidationReason::Value {
            detail: format!("{} is not finite", value),
        });
    }

    Ok(RawPoint {
        entity_id: record.entity_id.trim().to_string(),
        metric: record.metric.trim().to_string(),
        timestamp,
        value,
        unit: record.unit.clone(),
        source: record.source.trim().to_string(),
        ingested_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: &str, value: RawValue) -> RawRecord {
        RawRecord {
            entity_id: "NO1".to_string(),
            metric: "energy_production".to_string(),
            timestamp: timestamp.to_string(),
            value,
            unit: Some("kWh".to_string()),
            source: "elhub".to_string(),
            ingested_at: "2024-01-02T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_parse_keeps_offset() {
        let point = parse_record(&record("2024-01-01T03:00:00+01:00", RawValue::Number(5.0))).unwrap();
        assert_eq!(point.timestamp.offset().local_minus_utc(), 3600);
        assert_eq!(point.utc_timestamp().to_rfc3339(), "2024-01-01T02:00:00+00:00");
    }

    #[test]
    fn test_naive_timestamp_is_rejected() {
        let result = parse_record(&record("2024-01-01T03:00:00", RawValue::Number(5.0)));
        assert!(matches!(result, Err(ValidationReason::Timestamp { .. })));
    }

    #[test]
    fn test_numeric_text_is_accepted() {
        let point = parse_record(&record("2024-01-01T03:00:00Z", RawValue::Text(" 4.5 ".into()))).unwrap();
        assert_eq!(point.value, 4.5);

        let bad = parse_record(&record("2024-01-01T03:00:00Z", RawValue::Text("n/a".into())));
        assert!(matches!(bad, Err(ValidationReason::Value { .. })));
    }
}
