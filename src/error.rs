//! Error types for the energy_lake crate

use energy_analytics::AnalyticsError;
use medallion::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LakeError {
    /// Error from a pipeline layer or store
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Error from an analytic
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// A batch worker stopped without reporting its series
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, LakeError>;
