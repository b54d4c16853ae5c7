//! # Energy Analytics
//!
//! Analytics over silver energy and weather series.
//!
//! ## Features
//!
//! - Anomaly detection (rolling median/MAD, DCT smoothing with control limits, local outlier factor)
//! - Sliding-window lagged correlation between two aligned series
//! - Forecasting with exogenous regressors (seasonal ARX with MA residual terms, seasonal naive baseline)
//! - Forecast accuracy metrics and an in-memory results store
//! - STL seasonal-trend decomposition and spectrograms
//! - Seasonal snow drift and wind rose from hourly weather
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use energy_analytics::models::sarimax::Sarimax;
//! use energy_analytics::{ForecastEngine, ForecastRequest};
//! # fn run(
//! #     consumption: &medallion::SilverSeries,
//! #     temperature: &medallion::SilverSeries,
//! #     training: medallion::TimeRange,
//! # ) -> energy_analytics::Result<()> {
//!
//! // Daily seasonality on hourly data
//! let model = Sarimax::new([1, 0, 1], [1, 1, 1, 24], 100, 1e-4)?;
//! let engine = ForecastEngine::new(model, 672, 48, 0.95)?;
//!
//! let run = engine.forecast(&ForecastRequest::new(consumption, vec![temperature], training))?;
//! for step in &run.results {
//!     println!("{} {:.1} [{:.1}, {:.1}]", step.horizon_timestamp, step.point_estimate, step.lower_bound, step.upper_bound);
//! }
//! # Ok(())
//! # }
//! ```

pub mod anomaly;
pub mod correlation;
pub mod decomposition;
pub mod error;
pub mod forecast;
pub mod metrics;
pub mod models;
pub mod results;
pub mod snow_drift;

// Re-export commonly used types
pub use crate::anomaly::{mark_outliers, AnomalyDetector, AnomalyFlag, AnomalyMethod};
pub use crate::correlation::{CorrelationEngine, CorrelationResult};
pub use crate::decomposition::{series_spectrogram, Decomposer, Decomposition, Spectrogram};
pub use crate::error::{AnalyticsError, Result};
pub use crate::forecast::{ForecastEngine, ForecastRequest, ForecastResult, ForecastRun};
pub use crate::metrics::{evaluate_forecast, ForecastMetrics};
pub use crate::models::{FitDiagnostics, ForecastModel, ModelForecast, TrainedForecastModel};
pub use crate::results::{MemoryResultsStore, ResultsStore};
pub use crate::snow_drift::{snow_drift, SnowDriftParams, SnowDriftReport, WeatherInputs};
