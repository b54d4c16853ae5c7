//! Core record shapes shared by every layer.
//!
//! Bronze holds `RawPoint`s exactly as ingested. Silver holds `SilverSeries`:
//! gap-free sequences of `TimeSeriesPoint` on the canonical interval. Gold
//! holds `GoldSummary` windows derived from one silver series.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Flags and identifiers
// ---------------------------------------------------------------------------

/// Quality of a single silver point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityFlag {
    Raw,
    Interpolated,
    Outlier,
    Missing,
}

/// Data-quality layer a point belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Bronze => write!(f, "bronze"),
            Layer::Silver => write!(f, "silver"),
            Layer::Gold => write!(f, "gold"),
        }
    }
}

/// Identifies one physical series: a price area's production, a station's
/// temperature, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub entity_id: String,
    pub metric: String,
}

impl SeriesKey {
    pub fn new(entity_id: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            metric: metric.into(),
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_id, self.metric)
    }
}

// ---------------------------------------------------------------------------
// Time ranges and the canonical grid
// ---------------------------------------------------------------------------

/// Half-open UTC time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting empty or inverted ones
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(PipelineError::InvalidRange(format!(
                "range end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The range widened by `slots` intervals on both sides
    pub fn padded(&self, interval: Duration, slots: i64) -> Self {
        let pad = Duration::seconds(interval.num_seconds() * slots);
        Self {
            start: self.start - pad,
            end: self.end + pad,
        }
    }

    /// Overlap of two ranges, if any
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end > start).then_some(TimeRange { start, end })
    }

    /// Canonical grid timestamps inside the range. The grid is anchored on the
    /// Unix epoch so independently produced series line up.
    pub fn grid(&self, interval: Duration) -> Vec<DateTime<Utc>> {
        let step = interval.num_seconds();
        if step <= 0 {
            return Vec::new();
        }

        let first = align_up(self.start, interval);
        let mut out = Vec::new();
        let mut current = first;
        while current < self.end {
            out.push(current);
            current += Duration::seconds(step);
        }
        out
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Index of the grid slot containing `ts` (slot 0 starts at the epoch)
pub fn slot_index(ts: DateTime<Utc>, interval: Duration) -> i64 {
    ts.timestamp().div_euclid(interval.num_seconds().max(1))
}

/// Start time of grid slot `index`
pub fn slot_start(index: i64, interval: Duration) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(index * interval.num_seconds())
}

/// First grid timestamp at or after `ts`
pub fn align_up(ts: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let index = slot_index(ts, interval);
    let floor = slot_start(index, interval);
    if floor == ts {
        floor
    } else {
        slot_start(index + 1, interval)
    }
}

// ---------------------------------------------------------------------------
// Bronze records
// ---------------------------------------------------------------------------

/// A value as it arrives from a source: usually a number, sometimes text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

/// Wire form of a raw observation, before any typing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub entity_id: String,
    pub metric: String,
    /// ISO 8601 with an explicit offset, e.g. "2024-01-01T03:00:00+01:00"
    pub timestamp: String,
    pub value: RawValue,
    /// Source unit; the metric's canonical unit when absent
    #[serde(default)]
    pub unit: Option<String>,
    pub source: String,
    pub ingested_at: String,
}

/// A typed, immutable bronze observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub entity_id: String,
    pub metric: String,
    /// Observation time with the offset it was reported in
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
    pub unit: Option<String>,
    pub source: String,
    pub ingested_at: DateTime<Utc>,
}

impl RawPoint {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.entity_id.clone(), self.metric.clone())
    }

    pub fn utc_timestamp(&self) -> DateTime<Utc> {
        self.timestamp.with_timezone(&Utc)
    }
}

// ---------------------------------------------------------------------------
// Silver records
// ---------------------------------------------------------------------------

/// One point of a cleaned series. `value` is `None` only for `Missing` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub entity_id: String,
    pub metric: String,
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub quality_flag: QualityFlag,
    pub layer: Layer,
    /// Set when conflicting raw values existed and the latest ingestion won
    #[serde(default)]
    pub revised: bool,
}

impl TimeSeriesPoint {
    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }
}

/// Ordered, gap-free sequence of points on a fixed canonical interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverSeries {
    pub entity_id: String,
    pub metric: String,
    /// Canonical unit of every value
    pub unit: String,
    pub interval_minutes: i64,
    /// The range the series was requested for
    pub range: TimeRange,
    pub points: Vec<TimeSeriesPoint>,
}

impl SilverSeries {
    /// A series with no points for `range`
    pub fn empty(key: &SeriesKey, unit: &str, interval: Duration, range: TimeRange) -> Self {
        Self {
            entity_id: key.entity_id.clone(),
            metric: key.metric.clone(),
            unit: unit.to_string(),
            interval_minutes: interval.num_minutes(),
            range,
            points: Vec::new(),
        }
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.entity_id.clone(), self.metric.clone())
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(self.interval_minutes)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Non-missing `(timestamp, value)` pairs in order
    pub fn observed(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.points
            .iter()
            .filter_map(|p| p.value.map(|v| (p.timestamp, v)))
    }

    pub fn missing_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_missing()).count()
    }

    /// Position of the point at `ts`, relying on the fixed grid
    pub fn index_of(&self, ts: DateTime<Utc>) -> Option<usize> {
        let first = self.points.first()?.timestamp;
        let step = self.interval().num_seconds();
        if ts < first || step <= 0 {
            return None;
        }
        let offset = (ts - first).num_seconds();
        if offset % step != 0 {
            return None;
        }
        let index = (offset / step) as usize;
        (index < self.points.len()).then_some(index)
    }

    /// Value at `ts`; `None` if the slot is missing or outside the series
    pub fn value_at(&self, ts: DateTime<Utc>) -> Option<f64> {
        self.index_of(ts).and_then(|i| self.points[i].value)
    }

    /// The sub-series whose timestamps fall within `range`
    pub fn restrict(&self, range: &TimeRange) -> SilverSeries {
        let clipped = self.range.intersect(range).unwrap_or(TimeRange {
            start: range.start,
            end: range.start,
        });
        SilverSeries {
            entity_id: self.entity_id.clone(),
            metric: self.metric.clone(),
            unit: self.unit.clone(),
            interval_minutes: self.interval_minutes,
            range: clipped,
            points: self
                .points
                .iter()
                .filter(|p| range.contains(p.timestamp))
                .cloned()
                .collect(),
        }
    }

    /// Same interval and the same grid timestamps
    pub fn is_aligned_with(&self, other: &SilverSeries) -> bool {
        self.interval_minutes == other.interval_minutes
            && self.points.len() == other.points.len()
            && self.points.first().map(|p| p.timestamp) == other.points.first().map(|p| p.timestamp)
    }
}

/// Trim two series on the same interval to their common range.
pub fn align_pair(a: &SilverSeries, b: &SilverSeries) -> Result<(SilverSeries, SilverSeries)> {
    if a.interval_minutes != b.interval_minutes {
        return Err(PipelineError::InvalidRange(format!(
            "cannot align {} ({} min) with {} ({} min)",
            a.key(),
            a.interval_minutes,
            b.key(),
            b.interval_minutes
        )));
    }

    let overlap = a.range.intersect(&b.range).ok_or_else(|| {
        PipelineError::InvalidRange(format!("{} and {} do not overlap", a.key(), b.key()))
    })?;

    let left = a.restrict(&overlap);
    let right = b.restrict(&overlap);
    if !left.is_aligned_with(&right) {
        return Err(PipelineError::InsufficientData(format!(
            "{} and {} do not cover the same grid within {}",
            a.key(),
            b.key(),
            overlap
        )));
    }

    Ok((left, right))
}

// ---------------------------------------------------------------------------
// Gold records
// ---------------------------------------------------------------------------

/// Aggregate computed per gold window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Sum,
    Mean,
    Min,
    Max,
}

impl AggregateKind {
    pub fn all() -> [AggregateKind; 4] {
        [
            AggregateKind::Sum,
            AggregateKind::Mean,
            AggregateKind::Min,
            AggregateKind::Max,
        ]
    }
}

/// Fixed-size, non-overlapping gold windows, aligned in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowSpec {
    Daily,
    Weekly,
    Hours(u32),
}

/// One aggregate over one window of a silver series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldSummary {
    pub entity_id: String,
    pub metric: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub aggregate_kind: AggregateKind,
    pub value: f64,
    pub points_present: usize,
    pub points_expected: usize,
    pub completeness_ratio: f64,
}

impl GoldSummary {
    /// Whether the window meets a caller-chosen completeness threshold
    pub fn is_complete(&self, threshold: f64) -> bool {
        self.completeness_ratio >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(TimeRange::new(hour(5), hour(5)).is_err());
        assert!(TimeRange::new(hour(5), hour(4)).is_err());
    }

    #[test]
    fn test_grid_rounds_start_up_and_excludes_end() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let range = TimeRange::new(start, hour(3)).unwrap();

        assert_eq!(range.grid(Duration::hours(1)), vec![hour(1), hour(2)]);
    }

    #[test]
    fn test_slot_arithmetic() {
        let interval = Duration::minutes(15);
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 20, 0).unwrap();
        let index = slot_index(ts, interval);

        assert_eq!(
            slot_start(index, interval),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap()
        );
        assert_eq!(
            align_up(ts, interval),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_intersect() {
        let a = TimeRange::new(hour(0), hour(10)).unwrap();
        let b = TimeRange::new(hour(5), hour(15)).unwrap();
        let c = TimeRange::new(hour(10), hour(12)).unwrap();

        assert_eq!(a.intersect(&b), Some(TimeRange::new(hour(5), hour(10)).unwrap()));
        assert_eq!(a.intersect(&c), None);
    }
}
