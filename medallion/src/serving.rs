//! Serving Sync
//!
//! Pushes silver and gold records to the query-facing store unchanged. Each
//! record becomes one JSON object row, identified by its [`ServingRecord::row_key`].
//! Publishing a recomputed record replaces the row with the same key.

use crate::error::Result;
use crate::model::{GoldSummary, RawRecord, SilverSeries, TimeSeriesPoint};
use crate::store::ServingSink;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub const SILVER_TABLE: &str = "silver_series";
pub const GOLD_TABLE: &str = "gold_summaries";

/// A record that can be published as a serving row
pub trait ServingRecord: Serialize {
    /// Identity of the row within its table
    fn row_key(&self) -> String;
}

impl ServingRecord for TimeSeriesPoint {
    fn row_key(&self) -> String {
        format!("{}|{}|{}", self.entity_id, self.metric, self.timestamp.to_rfc3339())
    }
}

impl ServingRecord for GoldSummary {
    fn row_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{:?}",
            self.entity_id,
            self.metric,
            self.window_start.to_rfc3339(),
            self.window_end.to_rfc3339(),
            self.aggregate_kind
        )
    }
}

impl ServingRecord for RawRecord {
    fn row_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.entity_id, self.metric, self.timestamp, self.source, self.ingested_at
        )
    }
}

pub struct ServingSync {
    sink: Arc<dyn ServingSink>,
}

impl ServingSync {
    pub fn new(sink: Arc<dyn ServingSink>) -> Self {
        Self { sink }
    }

    /// Serialise `records` and write them to `table`. Returns the number of
    /// rows that were new or changed.
    pub fn publish<T: ServingRecord>(&self, table: &str, records: &[T]) -> Result<usize> {
        let rows = records
            .iter()
            .map(|record| serde_json::to_value(record).map(|row| (record.row_key(), row)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let total = rows.len();
        let added = self.sink.publish(table, rows)?;
        info!(table, rows = total, added, "published to serving store");
        Ok(added)
    }

    /// Publish every point of a silver series
    pub fn publish_series(&self, series: &SilverSeries) -> Result<usize> {
        self.publish(SILVER_TABLE, &series.points)
    }

    pub fn publish_summaries(&self, summaries: &[GoldSummary]) -> Result<usize> {
        self.publish(GOLD_TABLE, summaries)
    }
}
