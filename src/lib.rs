//! # Energy Lake
//!
//! Layered processing of energy and weather time series with analytics on top.
//!
//! ## Crates
//!
//! - `series_math`: statistical primitives (robust statistics, correlation, least squares, DCT, LOF)
//! - `medallion`: bronze ingestion, silver cleaning and resampling, gold aggregation, serving sync
//! - `energy_analytics`: anomaly detection, lagged correlation, forecasting with weather regressors
//!
//! This crate wires them to a set of stores through [`Lakehouse`].
//!
//! ## Example
//!
//! ```no_run
//! use chrono::{Duration, TimeZone, Utc};
//! use energy_lake::{init_logging, Lakehouse, DEFAULT_DIRECTIVE};
//! use medallion::{PipelineConfig, SeriesKey, TimeRange};
//!
//! # fn main() -> energy_lake::Result<()> {
//! init_logging(DEFAULT_DIRECTIVE);
//! let lake = Lakehouse::in_memory(PipelineConfig::load()?)?;
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let range = TimeRange::new(start, start + Duration::days(7))?;
//! let report = lake.ingest_csv("elhub_dump.csv")?;
//! println!("appended {} raw points", report.appended);
//!
//! let key = SeriesKey::new("NO1", "energy_consumption");
//! lake.refresh_silver(&key, &range)?;
//! lake.refresh_gold(&key, &range)?;
//! lake.publish(&key, &range)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod logging;
pub mod pipeline;

pub use crate::error::{LakeError, Result};
pub use crate::logging::{init_logging, DEFAULT_DIRECTIVE};
pub use crate::pipeline::{Lakehouse, RefreshOutcome, Stores};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
