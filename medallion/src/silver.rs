//! Silver Transformer
//!
//! Turns the raw points of one series into a gap-free series on the canonical
//! grid:
//!
//! - validate each point and convert it to the metric's canonical unit
//! - normalise timestamps to UTC
//! - drop exact duplicates; resolve conflicting values by most recent ingestion
//! - average points that share a grid slot
//! - interpolate gaps of at most `max_gap` slots, mark longer gaps `missing`
//!
//! The transform is a pure function of its input and configuration, so
//! replaying it over the same bronze snapshot yields identical output.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, ValidationIssue, ValidationReason};
use crate::model::{
    slot_index, slot_start, Layer, QualityFlag, RawPoint, SeriesKey, SilverSeries, TimeRange,
    TimeSeriesPoint,
};
use crate::store::{BronzeReader, SeriesStore};
use crate::units;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A timestamp that had conflicting raw values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub timestamp: DateTime<Utc>,
    pub kept_value: f64,
    pub kept_source: String,
    pub kept_ingested_at: DateTime<Utc>,
    /// Distinct values that lost, in canonical units
    pub discarded_values: Vec<f64>,
}

/// Result of transforming one series over one range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverOutcome {
    pub series: SilverSeries,
    pub rejected: Vec<ValidationIssue>,
    pub conflicts: Vec<ConflictResolution>,
}

/// A validated raw point in canonical units
#[derive(Debug, Clone)]
struct Candidate {
    timestamp: DateTime<Utc>,
    value: f64,
    source: String,
    ingested_at: DateTime<Utc>,
}

/// Running mean of the values landing in one grid slot
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    sum: f64,
    count: usize,
    revised: bool,
}

impl Slot {
    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

#[derive(Debug, Clone)]
pub struct SilverTransformer {
    interval: Duration,
    max_gap: usize,
}

impl SilverTransformer {
    pub fn new(interval: Duration, max_gap: usize) -> Result<Self> {
        if interval.num_seconds() <= 0 {
            return Err(PipelineError::InvalidConfig(
                "canonical interval must be positive".to_string(),
            ));
        }
        Ok(Self { interval, max_gap })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.interval()?, config.max_interpolation_gap)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_gap(&self) -> usize {
        self.max_gap
    }

    /// Read bronze for `range`, transform, and write the result to `store`.
    ///
    /// Bronze is read with `max_gap + 1` slots of padding on both sides so a
    /// gap that straddles a range edge is judged on its full length.
    pub fn run(
        &self,
        reader: &dyn BronzeReader,
        store: &dyn SeriesStore,
        key: &SeriesKey,
        range: &TimeRange,
    ) -> Result<SilverOutcome> {
        let padded = range.padded(self.interval, self.max_gap as i64 + 1);
        let raw = reader.read_range(&key.entity_id, &key.metric, &padded)?;
        let outcome = self.transform(key, range, &raw)?;
        store.write_series(&outcome.series)?;
        Ok(outcome)
    }

    /// Build the silver series for `key` over `range` from unordered raw points.
    ///
    /// Points outside `range` are used only as interpolation anchors.
    pub fn transform(
        &self,
        key: &SeriesKey,
        range: &TimeRange,
        raw: &[RawPoint],
    ) -> Result<SilverOutcome> {
        let unit = units::find_metric(&key.metric)
            .map(|m| m.canonical_unit)
            .unwrap_or_default();

        let (candidates, rejected) = self.validate(key, raw);
        let (values, conflicts) = resolve_duplicates(candidates);
        let slots = self.bucket(&values);

        let grid = range.grid(self.interval);
        let in_range = grid
            .first()
            .zip(grid.last())
            .map(|(first, last)| {
                let (lo, hi) = (slot_index(*first, self.interval), slot_index(*last, self.interval));
                slots.range(lo..=hi).next().is_some()
            })
            .unwrap_or(false);

        if !in_range {
            info!(
                entity_id = %key.entity_id,
                metric = %key.metric,
                range = %range,
                rejected = rejected.len(),
                "no valid raw points in range, returning empty series"
            );
            return Ok(SilverOutcome {
                series: SilverSeries::empty(key, unit, self.interval, *range),
                rejected,
                conflicts,
            });
        }

        let points: Vec<TimeSeriesPoint> = grid
            .iter()
            .map(|ts| self.resample(key, &slots, *ts))
            .collect();

        let interpolated = points
            .iter()
            .filter(|p| p.quality_flag == QualityFlag::Interpolated)
            .count();
        let missing = points.iter().filter(|p| p.is_missing()).count();
        info!(
            entity_id = %key.entity_id,
            metric = %key.metric,
            points = points.len(),
            interpolated,
            missing,
            rejected = rejected.len(),
            conflicts = conflicts.len(),
            "silver transform finished"
        );

        Ok(SilverOutcome {
            series: SilverSeries {
                entity_id: key.entity_id.clone(),
                metric: key.metric.clone(),
                unit: unit.to_string(),
                interval_minutes: self.interval.num_minutes(),
                range: *range,
                points,
            },
            rejected,
            conflicts,
        })
    }

    fn validate(&self, key: &SeriesKey, raw: &[RawPoint]) -> (Vec<Candidate>, Vec<ValidationIssue>) {
        let mut candidates = Vec::with_capacity(raw.len());
        let mut rejected = Vec::new();

        for point in raw {
            let checked = if point.entity_id != key.entity_id || point.metric != key.metric {
                Err(ValidationReason::WrongSeries)
            } else {
                units::normalize_value(&point.metric, point.value, point.unit.as_deref())
            };

            match checked {
                Ok(value) => candidates.push(Candidate {
                    timestamp: point.utc_timestamp(),
                    value,
                    source: point.source.clone(),
                    ingested_at: point.ingested_at,
                }),
                Err(reason) => {
                    let issue = ValidationIssue {
                        entity_id: point.entity_id.clone(),
                        metric: point.metric.clone(),
                        timestamp: point.timestamp.to_rfc3339(),
                        source: point.source.clone(),
                        reason,
                    };
                    warn!(issue = %issue, "dropped raw point");
                    rejected.push(issue);
                }
            }
        }

        (candidates, rejected)
    }

    fn bucket(&self, values: &[(DateTime<Utc>, f64, bool)]) -> BTreeMap<i64, Slot> {
        let mut slots: BTreeMap<i64, Slot> = BTreeMap::new();
        for (ts, value, revised) in values {
            let slot = slots.entry(slot_index(*ts, self.interval)).or_default();
            slot.sum += value;
            slot.count += 1;
            slot.revised |= revised;
        }
        slots
    }

    fn resample(&self, key: &SeriesKey, slots: &BTreeMap<i64, Slot>, ts: DateTime<Utc>) -> TimeSeriesPoint {
        let index = slot_index(ts, self.interval);
        let mut point = TimeSeriesPoint {
            entity_id: key.entity_id.clone(),
            metric: key.metric.clone(),
            timestamp: slot_start(index, self.interval),
            value: None,
            quality_flag: QualityFlag::Missing,
            layer: Layer::Silver,
            revised: false,
        };

        if let Some(slot) = slots.get(&index) {
            point.value = Some(slot.mean());
            point.quality_flag = QualityFlag::Raw;
            point.revised = slot.revised;
            return point;
        }

        let prev = slots.range(..index).next_back();
        let next = slots.range(index + 1..).next();
        if let (Some((&prev_index, prev_slot)), Some((&next_index, next_slot))) = (prev, next) {
            let gap = (next_index - prev_index - 1) as usize;
            if gap <= self.max_gap {
                let fraction = (index - prev_index) as f64 / (next_index - prev_index) as f64;
                let (a, b) = (prev_slot.mean(), next_slot.mean());
                point.value = Some(a + (b - a) * fraction);
                point.quality_flag = QualityFlag::Interpolated;
            }
        }

        point
    }
}

/// Collapse points sharing a timestamp.
///
/// Identical values collapse silently. Differing values keep the one with the
/// latest `ingested_at` (then the greatest source name, then the greatest
/// value) and are marked revised.
fn resolve_duplicates(
    mut candidates: Vec<Candidate>,
) -> (Vec<(DateTime<Utc>, f64, bool)>, Vec<ConflictResolution>) {
    candidates.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.ingested_at.cmp(&b.ingested_at))
            .then(a.source.cmp(&b.source))
            .then(a.value.total_cmp(&b.value))
    });

    let mut resolved = Vec::new();
    let mut conflicts = Vec::new();

    let mut start = 0;
    while start < candidates.len() {
        let ts = candidates[start].timestamp;
        let end = candidates[start..]
            .iter()
            .position(|c| c.timestamp != ts)
            .map(|offset| start + offset)
            .unwrap_or(candidates.len());
        let group = &candidates[start..end];

        // sorted ascending, so the winner is last
        let winner = &group[group.len() - 1];
        let mut discarded: Vec<f64> = group
            .iter()
            .map(|c| c.value)
            .filter(|v| v.total_cmp(&winner.value).is_ne())
            .collect();
        discarded.sort_by(f64::total_cmp);
        discarded.dedup_by(|a, b| a.total_cmp(b).is_eq());

        let revised = !discarded.is_empty();
        if revised {
            debug!(
                timestamp = %ts,
                kept = winner.value,
                discarded = ?discarded,
                "resolved conflicting raw values"
            );
            conflicts.push(ConflictResolution {
                timestamp: ts,
                kept_value: winner.value,
                kept_source: winner.source.clone(),
                kept_ingested_at: winner.ingested_at,
                discarded_values: discarded,
            });
        }
        resolved.push((ts, winner.value, revised));
        start = end;
    }

    (resolved, conflicts)
}
