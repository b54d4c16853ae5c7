//! Error types for the energy_analytics crate

use chrono::{DateTime, Utc};
use medallion::PipelineError;
use series_math::MathError;
use thiserror::Error;

/// Errors raised by the anomaly, correlation and forecast engines
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Too few valid points for the requested output
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Input series do not share interval or grid
    #[error("Series are not aligned: {0}")]
    Misaligned(String),

    /// The endogenous series has missing points inside the training window
    #[error(
        "Training window of {entity_id}/{metric} has {missing} missing points (first at {first_missing})"
    )]
    MissingTrainingData {
        entity_id: String,
        metric: String,
        missing: usize,
        first_missing: DateTime<Utc>,
    },

    /// An exogenous series does not span the training window and horizon
    #[error("Exogenous series {series} has no value at {first_uncovered} (horizon ends {horizon_end})")]
    Coverage {
        series: String,
        first_uncovered: DateTime<Utc>,
        horizon_end: DateTime<Utc>,
    },

    /// Model fitting failed; `spec` describes the attempted configuration
    #[error("Fit of {spec} failed after {iterations} iterations: {reason}")]
    FitConvergence {
        spec: String,
        iterations: usize,
        reason: String,
    },

    /// Caller abandoned the request before fitting started
    #[error("Forecast request was cancelled")]
    Cancelled,

    /// Error from numeric primitives
    #[error("Math error: {0}")]
    Math(#[from] MathError),

    /// Error from the pipeline layers or their stores
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, AnalyticsError>;
