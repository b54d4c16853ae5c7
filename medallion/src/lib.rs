//! # Medallion
//!
//! `medallion` holds the layered storage pipeline for energy and weather time
//! series: raw records land in bronze, are cleaned onto a canonical grid in
//! silver, and are summarised per window in gold.
//!
//! ## Stages
//!
//! - **Bronze Store Adapter** ([`BronzeAdapter`]): types raw records and appends them, unchanged
//! - **Silver Transformer** ([`SilverTransformer`]): dedup, unit and timezone normalisation, resampling, bounded interpolation
//! - **Gold Aggregator** ([`GoldAggregator`]): daily, weekly or hourly-block sums, means and extremes with completeness ratios
//! - **Serving Sync** ([`ServingSync`]): pass-through publication to the query-facing store
//!
//! Each stage is a pure transformation over explicit arguments; stores are
//! reached only through the traits in [`store`].
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use medallion::{BronzeAdapter, MemoryBronzeStore, PipelineConfig, SeriesKey, SilverTransformer, TimeRange};
//! use medallion::csv_source::read_raw_csv;
//!
//! let config = PipelineConfig::load()?;
//! let bronze = Arc::new(MemoryBronzeStore::new());
//! let import = read_raw_csv("production.csv")?;
//! let report = BronzeAdapter::new(bronze.clone()).ingest(&import.records)?;
//! println!("appended {} raw points", report.appended);
//!
//! let key = SeriesKey::new("NO1", "energy_production");
//! let range = TimeRange::new(
//!     "2024-01-01T00:00:00Z".parse().unwrap(),
//!     "2024-02-01T00:00:00Z".parse().unwrap(),
//! )?;
//! let transformer = SilverTransformer::from_config(&config)?;
//! let raw = medallion::BronzeReader::read_range(bronze.as_ref(), "NO1", "energy_production", &range)?;
//! let outcome = transformer.transform(&key, &range, &raw)?;
//! println!("{} silver points", outcome.series.len());
//! # Ok::<(), medallion::PipelineError>(())
//! ```

pub mod areas;
pub mod bronze;
pub mod config;
pub mod csv_source;
pub mod error;
pub mod gold;
pub mod model;
pub mod serving;
pub mod silver;
pub mod store;
pub mod units;
pub mod utils;

pub use bronze::{BronzeAdapter, IngestReport};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result, ValidationIssue, ValidationReason};
pub use gold::GoldAggregator;
pub use model::{
    align_pair, AggregateKind, GoldSummary, Layer, QualityFlag, RawPoint, RawRecord, RawValue,
    SeriesKey, SilverSeries, TimeRange, TimeSeriesPoint, WindowSpec,
};
pub use serving::{ServingRecord, ServingSync};
pub use silver::{ConflictResolution, SilverOutcome, SilverTransformer};
pub use store::{
    BronzeReader, BronzeWriter, MemoryBronzeStore, MemoryServingStore, MemorySeriesStore,
    MemorySummaryStore, SeriesStore, ServingSink, SummaryStore,
};
