//! Gold Aggregator
//!
//! Fixed-size, non-overlapping windows over one silver series. Windows are
//! aligned in UTC: days at midnight, weeks on Monday midnight, `Hours(n)` on
//! multiples of `n` hours since the epoch. Missing points lower the
//! completeness ratio but never fail the aggregation.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::model::{AggregateKind, GoldSummary, SeriesKey, SilverSeries, TimeRange, WindowSpec};
use crate::store::{SeriesStore, SummaryStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::{info, warn};

const SECONDS_PER_DAY: i64 = 86_400;
/// 1970-01-01 was a Thursday; shifting by three days puts week starts on Monday
const MONDAY_SHIFT_DAYS: i64 = 3;

/// `[start, end)` of the window containing `ts`
pub fn window_bounds(spec: WindowSpec, ts: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let secs = ts.timestamp();
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    match spec {
        WindowSpec::Daily => {
            let day = secs.div_euclid(SECONDS_PER_DAY);
            let start = epoch + Duration::days(day);
            (start, start + Duration::days(1))
        }
        WindowSpec::Weekly => {
            let day = secs.div_euclid(SECONDS_PER_DAY);
            let week = (day + MONDAY_SHIFT_DAYS).div_euclid(7);
            let start = epoch + Duration::days(week * 7 - MONDAY_SHIFT_DAYS);
            (start, start + Duration::days(7))
        }
        WindowSpec::Hours(hours) => {
            let width = i64::from(hours.max(1)) * 3600;
            let start = epoch + Duration::seconds(secs.div_euclid(width) * width);
            (start, start + Duration::seconds(width))
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoldAggregator {
    window: WindowSpec,
    kinds: Vec<AggregateKind>,
}

impl GoldAggregator {
    pub fn new(window: WindowSpec, kinds: &[AggregateKind]) -> Result<Self> {
        if let WindowSpec::Hours(0) = window {
            return Err(PipelineError::InvalidConfig(
                "hour windows must be at least 1 hour".to_string(),
            ));
        }
        let mut kinds = kinds.to_vec();
        kinds.sort();
        kinds.dedup();
        if kinds.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one aggregate kind is required".to_string(),
            ));
        }
        Ok(Self { window, kinds })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.aggregate_window, &config.aggregate_kinds)
    }

    /// One summary per window and kind, ordered by window then kind.
    ///
    /// Interpolated points count as present. Windows with no value at all are
    /// omitted.
    pub fn aggregate(&self, series: &SilverSeries) -> Vec<GoldSummary> {
        let step = series.interval().num_seconds().max(1);

        let mut windows: BTreeMap<DateTime<Utc>, (DateTime<Utc>, Vec<f64>)> = BTreeMap::new();
        for point in &series.points {
            let (start, end) = window_bounds(self.window, point.timestamp);
            let entry = windows.entry(start).or_insert_with(|| (end, Vec::new()));
            if let Some(value) = point.value {
                entry.1.push(value);
            }
        }

        let mut summaries = Vec::new();
        for (start, (end, values)) in windows {
            if values.is_empty() {
                warn!(
                    entity_id = %series.entity_id,
                    metric = %series.metric,
                    window_start = %start,
                    "window has no values, summary omitted"
                );
                continue;
            }

            let expected = ((end - start).num_seconds() / step).max(1) as usize;
            let present = values.len();
            for &kind in &self.kinds {
                summaries.push(GoldSummary {
                    entity_id: series.entity_id.clone(),
                    metric: series.metric.clone(),
                    window_start: start,
                    window_end: end,
                    aggregate_kind: kind,
                    value: compute(kind, &values),
                    points_present: present,
                    points_expected: expected,
                    completeness_ratio: present as f64 / expected as f64,
                });
            }
        }

        summaries
    }

    /// Read silver for `range`, aggregate, and write the summaries to gold.
    pub fn run(
        &self,
        silver: &dyn SeriesStore,
        gold: &dyn SummaryStore,
        key: &SeriesKey,
        range: &TimeRange,
    ) -> Result<Vec<GoldSummary>> {
        let series = silver.read_series(&key.entity_id, &key.metric, range)?;
        let summaries = self.aggregate(&series);
        gold.write_summaries(&summaries)?;
        info!(
            entity_id = %key.entity_id,
            metric = %key.metric,
            summaries = summaries.len(),
            "gold aggregation finished"
        );
        Ok(summaries)
    }
}

fn compute(kind: AggregateKind, values: &[f64]) -> f64 {
    match kind {
        AggregateKind::Sum => values.iter().sum(),
        AggregateKind::Mean => values.iter().sum::<f64>() / values.len() as f64,
        AggregateKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Weekday};

    #[test]
    fn test_daily_window_starts_at_midnight() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 17, 45, 0).unwrap();
        let (start, end) = window_bounds(WindowSpec::Daily, ts);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn test_weekly_window_starts_on_monday() {
        for day in 1..=14 {
            let ts = Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap();
            let (start, end) = window_bounds(WindowSpec::Weekly, ts);
            assert_eq!(start.weekday(), Weekday::Mon);
            assert!(start <= ts && ts < end);
        }
    }

    #[test]
    fn test_hour_windows() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 7, 30, 0).unwrap();
        let (start, _) = window_bounds(WindowSpec::Hours(6), ts);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_kinds_are_sorted_and_deduplicated() {
        let aggregator = GoldAggregator::new(
            WindowSpec::Daily,
            &[AggregateKind::Max, AggregateKind::Sum, AggregateKind::Max],
        )
        .unwrap();
        assert_eq!(aggregator.kinds, vec![AggregateKind::Sum, AggregateKind::Max]);
        assert!(GoldAggregator::new(WindowSpec::Daily, &[]).is_err());
    }
}
