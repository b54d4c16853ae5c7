use chrono::{DateTime, Duration, TimeZone, Utc};
use medallion::utils::{raw_points, seasonal_values, series_from_values};
use medallion::{
    AggregateKind, GoldAggregator, MemorySeriesStore, MemorySummaryStore, SeriesKey, SeriesStore,
    SilverTransformer, SummaryStore, TimeRange, WindowSpec,
};
use pretty_assertions::assert_eq;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn key() -> SeriesKey {
    SeriesKey::new("NO1", "energy_consumption")
}

fn all_kinds() -> GoldAggregator {
    GoldAggregator::new(WindowSpec::Daily, &AggregateKind::all()).unwrap()
}

#[test]
fn test_daily_sum_matches_hourly_silver() {
    let values = seasonal_values(72, 500.0, 120.0, 24, 15.0, 42);
    let raw = raw_points(&key(), start(), Duration::hours(1), &values, "elhub", start());
    let range = TimeRange::new(start(), start() + Duration::days(3)).unwrap();
    let series = SilverTransformer::new(Duration::hours(1), 3)
        .unwrap()
        .transform(&key(), &range, &raw)
        .unwrap()
        .series;

    let summaries = all_kinds().aggregate(&series);
    let sums: Vec<_> = summaries
        .iter()
        .filter(|s| s.aggregate_kind == AggregateKind::Sum)
        .collect();

    assert_eq!(sums.len(), 3);
    for (day, summary) in sums.iter().enumerate() {
        let expected: f64 = values[day * 24..(day + 1) * 24].iter().sum();
        assert!((summary.value - expected).abs() < 1e-6);
        assert_eq!(summary.completeness_ratio, 1.0);
        assert_eq!(summary.points_expected, 24);
    }
}

#[test]
fn test_summaries_are_ordered_by_window_then_kind() {
    let values: Vec<Option<f64>> = (0..48).map(|i| Some(i as f64)).collect();
    let series = series_from_values(&key(), "kWh", start(), Duration::hours(1), &values);

    let summaries = all_kinds().aggregate(&series);
    let order: Vec<(DateTime<Utc>, AggregateKind)> = summaries
        .iter()
        .map(|s| (s.window_start, s.aggregate_kind))
        .collect();

    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
    assert_eq!(summaries.len(), 8);

    let day_one: Vec<f64> = summaries[..4].iter().map(|s| s.value).collect();
    assert_eq!(day_one, vec![276.0, 11.5, 0.0, 23.0]);
}

#[test]
fn test_missing_points_lower_completeness() {
    let mut values: Vec<Option<f64>> = vec![Some(2.0); 24];
    for v in values.iter_mut().take(6) {
        *v = None;
    }
    let series = series_from_values(&key(), "kWh", start(), Duration::hours(1), &values);

    let summaries = all_kinds().aggregate(&series);
    let mean = summaries
        .iter()
        .find(|s| s.aggregate_kind == AggregateKind::Mean)
        .unwrap();

    assert_eq!(mean.points_present, 18);
    assert!((mean.completeness_ratio - 0.75).abs() < 1e-12);
    assert_eq!(mean.value, 2.0);
    assert!(mean.is_complete(0.7));
    assert!(!mean.is_complete(0.8));
}

#[test]
fn test_window_without_values_is_omitted() {
    let mut values: Vec<Option<f64>> = vec![None; 24];
    values.extend(vec![Some(1.0); 24]);
    let series = series_from_values(&key(), "kWh", start(), Duration::hours(1), &values);

    let summaries = all_kinds().aggregate(&series);

    assert_eq!(summaries.len(), 4);
    assert!(summaries.iter().all(|s| s.window_start == start() + Duration::days(1)));
}

#[test]
fn test_aggregation_is_repeatable() {
    let values: Vec<Option<f64>> = seasonal_values(24 * 14, 50.0, 5.0, 24, 1.0, 3)
        .into_iter()
        .map(Some)
        .collect();
    let series = series_from_values(&key(), "kWh", start(), Duration::hours(1), &values);
    let weekly = GoldAggregator::new(WindowSpec::Weekly, &[AggregateKind::Max]).unwrap();

    let first = weekly.aggregate(&series);
    let second = weekly.aggregate(&series);
    assert_eq!(first, second);
    // 2024-01-01 is a Monday, so 14 days are exactly two weeks
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].points_expected, 168);
}

#[test]
fn test_run_reads_silver_and_writes_gold() {
    let silver = MemorySeriesStore::new();
    let gold = MemorySummaryStore::new();
    let values: Vec<Option<f64>> = (0..24).map(|_| Some(3.0)).collect();
    let series = series_from_values(&key(), "kWh", start(), Duration::hours(1), &values);
    silver.write_series(&series).unwrap();

    let range = TimeRange::new(start(), start() + Duration::days(1)).unwrap();
    let written = all_kinds().run(&silver, &gold, &key(), &range).unwrap();
    let stored = gold.read_summaries("NO1", "energy_consumption", &range).unwrap();

    assert_eq!(written, stored);
    assert_eq!(stored[0].value, 72.0);

    // re-running replaces rather than duplicates
    all_kinds().run(&silver, &gold, &key(), &range).unwrap();
    assert_eq!(gold.read_summaries("NO1", "energy_consumption", &range).unwrap().len(), 4);
}
