//! Store interfaces and in-memory backends
//!
//! The layers talk to storage only through these narrow traits. Bronze is
//! split into a reader and a writer so stages that must not write raw data
//! only ever receive a reader. The in-memory backends are used by tests and
//! the demo and can be switched offline to exercise failure propagation.

use crate::error::{PipelineError, Result};
use crate::model::{GoldSummary, RawPoint, SeriesKey, SilverSeries, TimeRange, TimeSeriesPoint};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// Read access to raw bronze points
pub trait BronzeReader: Send + Sync {
    /// Points of one series whose timestamp falls in `range`, in append order
    fn read_range(&self, entity_id: &str, metric: &str, range: &TimeRange) -> Result<Vec<RawPoint>>;
}

/// Append-only write access to bronze
pub trait BronzeWriter: Send + Sync {
    /// Append a point. Returns `false` when an identical point already exists.
    fn append(&self, point: RawPoint) -> Result<bool>;
}

/// Silver series storage
pub trait SeriesStore: Send + Sync {
    /// Store a series, replacing previously written points inside its range
    fn write_series(&self, series: &SilverSeries) -> Result<()>;
    fn read_series(&self, entity_id: &str, metric: &str, range: &TimeRange) -> Result<SilverSeries>;
}

/// Gold summary storage
pub trait SummaryStore: Send + Sync {
    /// Store summaries, replacing earlier ones for the same window and kind
    fn write_summaries(&self, summaries: &[GoldSummary]) -> Result<()>;
    /// Summaries whose window starts inside `range`
    fn read_summaries(&self, entity_id: &str, metric: &str, range: &TimeRange) -> Result<Vec<GoldSummary>>;
}

/// Query-facing store fed by serving sync
pub trait ServingSink: Send + Sync {
    /// Upsert keyed rows into `table`; returns how many rows were new or changed
    fn publish(&self, table: &str, rows: Vec<(String, serde_json::Value)>) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// Availability switch shared by the memory backends
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Availability {
    offline: AtomicBool,
}

impl Availability {
    fn check(&self, store: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(PipelineError::store_unavailable(store, "store is offline"))
        } else {
            Ok(())
        }
    }

    fn set(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Bronze
// ---------------------------------------------------------------------------

/// In-memory bronze store. Points are never modified or removed; corrections
/// arrive as additional points with a later `ingested_at`.
#[derive(Debug, Default)]
pub struct MemoryBronzeStore {
    points: RwLock<BTreeMap<SeriesKey, Vec<RawPoint>>>,
    availability: Availability,
}

impl MemoryBronzeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage; every call fails with `StoreUnavailable` while set
    pub fn set_offline(&self, offline: bool) {
        self.availability.set(offline);
    }

    /// Total number of stored points
    pub fn len(&self) -> usize {
        self.points.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn series_keys(&self) -> Vec<SeriesKey> {
        self.points.read().keys().cloned().collect()
    }
}

impl BronzeReader for MemoryBronzeStore {
    fn read_range(&self, entity_id: &str, metric: &str, range: &TimeRange) -> Result<Vec<RawPoint>> {
        self.availability.check("bronze")?;
        let key = SeriesKey::new(entity_id, metric);
        Ok(self
            .points
            .read()
            .get(&key)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| range.contains(p.utc_timestamp()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl BronzeWriter for MemoryBronzeStore {
    fn append(&self, point: RawPoint) -> Result<bool> {
        self.availability.check("bronze")?;
        let mut guard = self.points.write();
        let series = guard.entry(point.key()).or_default();
        if series.contains(&point) {
            return Ok(false);
        }
        series.push(point);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Silver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredSeries {
    unit: String,
    interval_minutes: i64,
    points: BTreeMap<DateTime<Utc>, TimeSeriesPoint>,
}

/// In-memory silver store
#[derive(Debug, Default)]
pub struct MemorySeriesStore {
    series: RwLock<BTreeMap<SeriesKey, StoredSeries>>,
    availability: Availability,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.availability.set(offline);
    }

    pub fn series_keys(&self) -> Vec<SeriesKey> {
        self.series.read().keys().cloned().collect()
    }
}

impl SeriesStore for MemorySeriesStore {
    fn write_series(&self, series: &SilverSeries) -> Result<()> {
        self.availability.check("silver")?;
        let mut guard = self.series.write();
        let stored = guard.entry(series.key()).or_insert_with(|| StoredSeries {
            unit: series.unit.clone(),
            interval_minutes: series.interval_minutes,
            points: BTreeMap::new(),
        });

        if stored.interval_minutes != series.interval_minutes {
            return Err(PipelineError::InvalidRange(format!(
                "{} is stored at {} min, cannot write {} min points",
                series.key(),
                stored.interval_minutes,
                series.interval_minutes
            )));
        }

        stored
            .points
            .retain(|ts, _| !series.range.contains(*ts));
        for point in &series.points {
            stored.points.insert(point.timestamp, point.clone());
        }
        stored.unit = series.unit.clone();
        Ok(())
    }

    fn read_series(&self, entity_id: &str, metric: &str, range: &TimeRange) -> Result<SilverSeries> {
        self.availability.check("silver")?;
        let key = SeriesKey::new(entity_id, metric);
        let guard = self.series.read();
        let stored = guard.get(&key).ok_or_else(|| {
            PipelineError::InsufficientData(format!("no silver series stored for {}", key))
        })?;

        Ok(SilverSeries {
            entity_id: key.entity_id.clone(),
            metric: key.metric.clone(),
            unit: stored.unit.clone(),
            interval_minutes: stored.interval_minutes,
            range: *range,
            points: stored
                .points
                .range(range.start..range.end)
                .map(|(_, p)| p.clone())
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Gold
// ---------------------------------------------------------------------------

/// In-memory gold store
#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    summaries: RwLock<BTreeMap<SeriesKey, Vec<GoldSummary>>>,
    availability: Availability,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.availability.set(offline);
    }
}

impl SummaryStore for MemorySummaryStore {
    fn write_summaries(&self, summaries: &[GoldSummary]) -> Result<()> {
        self.availability.check("gold")?;
        let mut guard = self.summaries.write();
        for summary in summaries {
            let key = SeriesKey::new(summary.entity_id.clone(), summary.metric.clone());
            let stored = guard.entry(key).or_default();
            stored.retain(|s| {
                !(s.window_start == summary.window_start
                    && s.window_end == summary.window_end
                    && s.aggregate_kind == summary.aggregate_kind)
            });
            stored.push(summary.clone());
            stored.sort_by(|a, b| {
                a.window_start
                    .cmp(&b.window_start)
                    .then(a.window_end.cmp(&b.window_end))
                    .then(a.aggregate_kind.cmp(&b.aggregate_kind))
            });
        }
        Ok(())
    }

    fn read_summaries(&self, entity_id: &str, metric: &str, range: &TimeRange) -> Result<Vec<GoldSummary>> {
        self.availability.check("gold")?;
        Ok(self
            .summaries
            .read()
            .get(&SeriesKey::new(entity_id, metric))
            .map(|stored| {
                stored
                    .iter()
                    .filter(|s| range.contains(s.window_start))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Serving
// ---------------------------------------------------------------------------

/// In-memory serving store. One row per key: re-publishing identical output
/// leaves a table unchanged, a changed row replaces the stored one in place.
#[derive(Debug, Default)]
pub struct MemoryServingStore {
    tables: RwLock<BTreeMap<String, ServingTable>>,
    availability: Availability,
}

#[derive(Debug, Default)]
struct ServingTable {
    rows: Vec<serde_json::Value>,
    index: HashMap<String, usize>,
}

impl MemoryServingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.availability.set(offline);
    }

    /// Snapshot of a table's rows in publish order
    pub fn table(&self, name: &str) -> Vec<serde_json::Value> {
        self.tables
            .read()
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }
}

impl ServingSink for MemoryServingStore {
    fn publish(&self, table: &str, rows: Vec<(String, serde_json::Value)>) -> Result<usize> {
        self.availability.check("serving")?;
        let mut guard = self.tables.write();
        let stored = guard.entry(table.to_string()).or_default();
        let mut written = 0;
        for (key, row) in rows {
            match stored.index.get(&key).copied() {
                Some(at) if stored.rows[at] == row => {}
                Some(at) => {
                    stored.rows[at] = row;
                    written += 1;
                }
                None => {
                    stored.index.insert(key, stored.rows.len());
                    stored.rows.push(row);
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn raw(hour: u32, value: f64) -> RawPoint {
        let offset = FixedOffset::east_opt(3600).unwrap();
        RawPoint {
            entity_id: "NO1".to_string(),
            metric: "energy_production".to_string(),
            timestamp: offset.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            value,
            unit: None,
            source: "elhub".to_string(),
            ingested_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    fn day() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_identical_append_is_noop() {
        let store = MemoryBronzeStore::new();
        assert!(store.append(raw(5, 1.0)).unwrap());
        assert!(!store.append(raw(5, 1.0)).unwrap());
        assert!(store.append(raw(5, 2.0)).unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_read_range_uses_utc() {
        let store = MemoryBronzeStore::new();
        // 00:00+01:00 is 23:00 UTC the previous day
        store.append(raw(0, 1.0)).unwrap();
        store.append(raw(2, 2.0)).unwrap();

        let points = store.read_range("NO1", "energy_production", &day()).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 2.0);
    }

    #[test]
    fn test_offline_store_reports_unavailable() {
        let store = MemoryBronzeStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.read_range("NO1", "energy_production", &day()),
            Err(PipelineError::StoreUnavailable { .. })
        ));
    }

    #[test]
    fn test_serving_dedups_identical_rows() {
        let store = MemoryServingStore::new();
        let rows = vec![
            ("a".to_string(), serde_json::json!({"a": 1})),
            ("b".to_string(), serde_json::json!({"a": 2})),
        ];
        assert_eq!(store.publish("t", rows.clone()).unwrap(), 2);
        assert_eq!(store.publish("t", rows).unwrap(), 0);
        assert_eq!(store.table("t").len(), 2);
    }

    #[test]
    fn test_serving_replaces_changed_row_with_same_key() {
        let store = MemoryServingStore::new();
        let row = |value: f64| vec![("NO1|2024-01-01T00:00:00+00:00".to_string(), serde_json::json!({"value": value}))];
        store.publish("t", vec![("other".to_string(), serde_json::json!({"value": 0.0}))]).unwrap();
        assert_eq!(store.publish("t", row(1.0)).unwrap(), 1);
        assert_eq!(store.publish("t", row(2.0)).unwrap(), 1);

        let rows = store.table("t");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["value"], 2.0);
    }
}
