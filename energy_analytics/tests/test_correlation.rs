use chrono::{DateTime, Duration, TimeZone, Utc};
use energy_analytics::{AnalyticsError, CorrelationEngine};
use medallion::utils::{seasonal_values, series_from_values};
use medallion::{align_pair, SeriesKey, SilverSeries};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
}

fn weather(values: &[Option<f64>]) -> SilverSeries {
    series_from_values(
        &SeriesKey::new("NO1-weather", "temperature_2m"),
        "degC",
        start(),
        Duration::hours(1),
        values,
    )
}

fn energy(values: &[Option<f64>]) -> SilverSeries {
    series_from_values(
        &SeriesKey::new("NO1", "energy_consumption"),
        "kWh",
        start(),
        Duration::hours(1),
        values,
    )
}

/// `a` and a copy of `a` delayed by `delay` intervals and multiplied by `scale`
fn delayed_pair(len: usize, delay: usize, scale: f64) -> (SilverSeries, SilverSeries) {
    let base = seasonal_values(len + delay, 0.0, 0.0, 24, 1.0, 23);
    let a: Vec<Option<f64>> = base[delay..].iter().copied().map(Some).collect();
    let b: Vec<Option<f64>> = base[..len].iter().map(|v| Some(scale * v)).collect();
    (weather(&a), energy(&b))
}

#[rstest]
#[case(0, 1.0)]
#[case(3, 1.0)]
#[case(5, 1.0)]
#[case(3, 2.5)]
#[case(4, -1.0)]
fn test_best_lag_recovers_delay(#[case] delay: usize, #[case] scale: f64) {
    let (a, b) = delayed_pair(200, delay, scale);
    let engine = CorrelationEngine::new(48, 24, (-6, 6), 10).unwrap();

    let results = engine.correlate(&a, &b).unwrap();
    let best = CorrelationEngine::best_lags(&results);

    assert!(!best.is_empty());
    for window in &best {
        assert_eq!(window.lag, delay as i64);
        // an inverted response is found by strength and keeps its sign
        assert!(window.coefficient.abs() > 0.999);
        assert_eq!(window.coefficient.signum(), scale.signum());
    }
}

#[test]
fn test_results_are_ordered_and_labelled() {
    let (a, b) = delayed_pair(96, 2, 1.0);
    let engine = CorrelationEngine::new(48, 24, (-1, 1), 10).unwrap();

    let results = engine.correlate(&a, &b).unwrap();

    // windows at 0h, 24h, 48h with three lags each
    assert_eq!(results.len(), 9);
    assert_eq!(results[0].window_start, start());
    assert_eq!(results[0].window_end, start() + Duration::hours(48));
    assert_eq!(results[0].lag, -1);
    assert_eq!(results[8].window_start, start() + Duration::hours(48));
    assert_eq!(results[8].lag, 1);
    assert_eq!(
        results[0].entity_pair,
        ("NO1-weather".to_string(), "NO1".to_string())
    );
    assert_eq!(
        results[0].metric_pair,
        ("temperature_2m".to_string(), "energy_consumption".to_string())
    );
}

#[test]
fn test_sparse_windows_are_omitted() {
    let (a, b) = delayed_pair(96, 0, 1.0);
    let mut sparse: Vec<Option<f64>> = b.values();
    // leave only 5 values in the second day
    for (i, value) in sparse.iter_mut().enumerate().skip(24).take(24) {
        if i % 5 != 0 {
            *value = None;
        }
    }
    let b = energy(&sparse);
    let engine = CorrelationEngine::new(24, 24, (0, 0), 10).unwrap();

    let results = engine.correlate(&a, &b).unwrap();
    let starts: Vec<DateTime<Utc>> = results.iter().map(|r| r.window_start).collect();
    assert_eq!(starts, vec![start(), start() + Duration::hours(48), start() + Duration::hours(72)]);
    assert!(results.iter().all(|r| r.n_points >= 10));
}

#[test]
fn test_constant_window_is_omitted() {
    let (a, _) = delayed_pair(48, 0, 1.0);
    let flat = energy(&vec![Some(42.0); 48]);
    let engine = CorrelationEngine::new(24, 24, (0, 0), 10).unwrap();

    assert!(engine.correlate(&a, &flat).unwrap().is_empty());
}

#[test]
fn test_misaligned_series_are_rejected() {
    let (a, _) = delayed_pair(48, 0, 1.0);
    let shifted = series_from_values(
        &SeriesKey::new("NO1", "energy_consumption"),
        "kWh",
        start() + Duration::hours(1),
        Duration::hours(1),
        &vec![Some(1.0); 48],
    );
    let engine = CorrelationEngine::new(24, 24, (0, 0), 10).unwrap();

    let err = engine.correlate(&a, &shifted).unwrap_err();
    assert!(matches!(err, AnalyticsError::Misaligned(_)));

    // trimming to the common range makes them comparable
    let (left, right) = align_pair(&a, &shifted).unwrap();
    assert!(left.is_aligned_with(&right));
}

#[test]
fn test_short_series_is_insufficient() {
    let (a, b) = delayed_pair(20, 0, 1.0);
    let engine = CorrelationEngine::new(24, 24, (0, 0), 10).unwrap();
    assert!(matches!(
        engine.correlate(&a, &b),
        Err(AnalyticsError::InsufficientData(_))
    ));
}
