//! # Series Math
//!
//! Numeric building blocks for the energy lake analytics.
//! This crate has no notion of entities, layers or timestamps: every function
//! works on plain `f64` slices so it can be shared by the pipeline and the
//! analytics stages.

use thiserror::Error;

// Statistics modules
pub mod correlation;
pub mod descriptive;
pub mod neighbors;
pub mod regression;
pub mod robust;
pub mod smoothing;
pub mod spectral;

/// Errors that can occur in series calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for series math operations
pub type Result<T> = std::result::Result<T, MathError>;

pub use correlation::{autocorrelation, ljung_box, pearson, LjungBox};
pub use descriptive::{mean, normal_quantile, std_dev, variance};
pub use regression::least_squares;
pub use robust::{median, median_absolute_deviation, TrailingWindow, MAD_NORMAL_CONSISTENCY};
pub use smoothing::{loess, moving_average, stl, StlDecomposition, StlParams};
