//! Error types for the medallion crate

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the layer stages and their stores
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A requested time range is empty or inverted
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Too few valid points for the requested unit of output
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A backing store could not serve the read or write
    #[error("Store unavailable ({store}): {reason}")]
    StoreUnavailable { store: String, reason: String },

    /// Input file is unusable as a whole, e.g. a required column is absent
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reading CSV input
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error parsing a TOML configuration file
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Error converting records to JSON rows
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Shorthand for a store failure
    pub fn store_unavailable(store: &str, reason: impl Into<String>) -> Self {
        PipelineError::StoreUnavailable {
            store: store.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a single raw record or point was dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationReason {
    /// A required identifier is empty
    MissingField { field: String },
    /// Timestamp missing, unparseable, or without an explicit offset
    Timestamp { detail: String },
    /// Ingestion timestamp unparseable
    IngestedAt { detail: String },
    /// Value is not numeric or not finite
    Value { detail: String },
    /// Metric is not in the registry
    UnknownMetric,
    /// Unit cannot be converted to the metric's canonical unit
    UnknownUnit { unit: String },
    /// Value outside the metric's plausible range after conversion
    OutOfRange { value: f64, min: f64, max: f64 },
    /// Point belongs to another series than the one being transformed
    WrongSeries,
    /// Source row could not be read at all
    Malformed { line: u64, detail: String },
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationReason::MissingField { field } => write!(f, "missing {}", field),
            ValidationReason::Timestamp { detail } => write!(f, "bad timestamp: {}", detail),
            ValidationReason::IngestedAt { detail } => write!(f, "bad ingested_at: {}", detail),
            ValidationReason::Value { detail } => write!(f, "bad value: {}", detail),
            ValidationReason::UnknownMetric => write!(f, "unknown metric"),
            ValidationReason::UnknownUnit { unit } => write!(f, "unknown unit '{}'", unit),
            ValidationReason::OutOfRange { value, min, max } => {
                write!(f, "value {} outside [{}, {}]", value, min, max)
            }
            ValidationReason::WrongSeries => write!(f, "point belongs to another series"),
            ValidationReason::Malformed { line, detail } => write!(f, "malformed row at line {}: {}", line, detail),
        }
    }
}

/// A dropped record, reported back to the caller instead of failing the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub entity_id: String,
    pub metric: String,
    /// The timestamp as it arrived, for tracing the record back to its source
    pub timestamp: String,
    pub source: String,
    pub reason: ValidationReason,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} @ {} from {}: {}",
            self.entity_id, self.metric, self.timestamp, self.source, self.reason
        )
    }
}
