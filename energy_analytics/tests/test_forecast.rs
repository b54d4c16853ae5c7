use chrono::{DateTime, Duration, TimeZone, Utc};
use energy_analytics::models::sarimax::Sarimax;
use energy_analytics::models::seasonal_naive::SeasonalNaive;
use energy_analytics::{
    evaluate_forecast, AnalyticsError, ForecastEngine, ForecastModel, ForecastRequest, MemoryResultsStore,
    ResultsStore, TrainedForecastModel,
};
use medallion::utils::{seasonal_values, series_from_values};
use medallion::{PipelineConfig, SeriesKey, SilverSeries, TimeRange};
use pretty_assertions::assert_eq;

const TRAINING: usize = 24 * 28;
const HORIZON: usize = 48;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn at(hour: usize) -> DateTime<Utc> {
    start() + Duration::hours(hour as i64)
}

fn hourly(key: SeriesKey, unit: &str, values: &[f64]) -> SilverSeries {
    let values: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    series_from_values(&key, unit, start(), Duration::hours(1), &values)
}

/// Hourly temperature and a consumption series that drifts day to day,
/// responds to temperature with slope -20 and has AR(1) noise
fn scenario(len: usize) -> (Vec<f64>, Vec<f64>) {
    let temperature = seasonal_values(len, 5.0, 4.0, 24, 1.5, 101);
    let shocks = seasonal_values(len, 0.0, 0.0, 24, 5.0, 202);
    let profile = seasonal_values(24, 1000.0, 200.0, 24, 0.0, 0);

    let mut noise = vec![0.0; len];
    for t in 1..len {
        noise[t] = 0.5 * noise[t - 1] + shocks[t];
    }
    let mut load = vec![0.0; len];
    for t in 0..len {
        let base = if t < 24 {
            profile[t]
        } else {
            load[t - 24] + 20.0 * temperature[t - 24]
        };
        load[t] = base - 20.0 * temperature[t] + noise[t];
    }
    (load, temperature)
}

fn scenario_series(len: usize) -> (SilverSeries, SilverSeries) {
    let (load, temperature) = scenario(len);
    (
        hourly(SeriesKey::new("NO1", "energy_consumption"), "kWh", &load),
        hourly(SeriesKey::new("NO1-weather", "temperature_2m"), "degC", &temperature),
    )
}

fn default_model() -> Sarimax {
    Sarimax::from_config(&PipelineConfig::default()).unwrap()
}

fn training_window() -> TimeRange {
    TimeRange::new(start(), at(TRAINING)).unwrap()
}

#[test]
fn test_fit_recovers_temperature_response() {
    let (load, temperature) = scenario(TRAINING);
    let fitted = default_model().train(&load, &[temperature]).unwrap();

    // AR 1, AR 24, temperature, MA 1, MA 24
    let coefficients = fitted.coefficients();
    assert_eq!(coefficients.len(), 5);
    assert!((coefficients[2] + 20.0).abs() < 1.0);

    let diagnostics = fitted.diagnostics();
    assert!(diagnostics.iterations >= 2);
    assert!(diagnostics.iterations <= 100);
    assert_eq!(diagnostics.observations, TRAINING - 24 - 24);
    assert!(diagnostics.residual_mean.abs() < 1.0);
}

#[test]
fn test_fitting_is_deterministic() {
    let (load, temperature) = scenario(TRAINING);
    let exog = vec![temperature];

    let first = default_model().train(&load, &exog).unwrap();
    let second = default_model().train(&load, &exog).unwrap();
    assert_eq!(first.coefficients(), second.coefficients());
    assert_eq!(
        first.forecast(&[vec![5.0; 6]], 6).unwrap(),
        second.forecast(&[vec![5.0; 6]], 6).unwrap()
    );
}

#[test]
fn test_forecast_tracks_later_actuals() {
    let (load, temperature) = scenario_series(TRAINING + HORIZON);
    let engine = ForecastEngine::new(default_model(), TRAINING, HORIZON, 0.95).unwrap();
    let request = ForecastRequest::new(&load, vec![&temperature], training_window());

    let run = engine.forecast_at(&request, at(TRAINING)).unwrap();

    assert_eq!(run.results.len(), HORIZON);
    assert_eq!(run.model_name, "SARIMAX(1,0,1)(1,1,1,24)");
    assert_eq!(run.results[0].horizon_timestamp, at(TRAINING));
    assert_eq!(run.results[HORIZON - 1].horizon_timestamp, at(TRAINING + HORIZON - 1));

    // intervals widen with the horizon
    let width = |i: usize| run.results[i].upper_bound - run.results[i].lower_bound;
    assert!(width(HORIZON - 1) > width(0));

    let metrics = evaluate_forecast(&run.results, &load).unwrap();
    assert_eq!(metrics.n, HORIZON);
    assert!(metrics.mape < 5.0, "{}", metrics);
    assert!(metrics.coverage >= 50.0, "{}", metrics);
}

#[test]
fn test_exogenous_gap_fails_before_fitting() {
    let (load, temperature) = scenario_series(TRAINING + HORIZON);
    // weather stops ten hours into the horizon
    let short = temperature.restrict(&TimeRange::new(start(), at(TRAINING + 10)).unwrap());
    let engine = ForecastEngine::new(default_model(), TRAINING, HORIZON, 0.95).unwrap();

    let err = engine
        .forecast_at(&ForecastRequest::new(&load, vec![&short], training_window()), at(TRAINING))
        .unwrap_err();

    match err {
        AnalyticsError::Coverage {
            series,
            first_uncovered,
            horizon_end,
        } => {
            assert_eq!(series, "NO1-weather/temperature_2m");
            assert_eq!(first_uncovered, at(TRAINING + 10));
            assert_eq!(horizon_end, at(TRAINING + HORIZON));
        }
        other => panic!("expected a coverage error, got {other}"),
    }
}

#[test]
fn test_exogenous_series_without_records_is_a_coverage_error() {
    let (load, _) = scenario_series(TRAINING + HORIZON);
    let empty = series_from_values(
        &SeriesKey::new("NO1-weather", "temperature_2m"),
        "degC",
        start(),
        Duration::hours(1),
        &[],
    );
    let engine = ForecastEngine::new(default_model(), TRAINING, HORIZON, 0.95).unwrap();

    let outcome = engine.forecast_at(&ForecastRequest::new(&load, vec![&empty], training_window()), at(TRAINING));
    let produced = outcome.as_ref().map(|run| run.results.len()).unwrap_or(0);
    assert_eq!(produced, 0);
    assert!(matches!(
        outcome,
        Err(AnalyticsError::Coverage { first_uncovered, .. }) if first_uncovered == start()
    ));
}

#[test]
fn test_gap_in_training_target_is_rejected() {
    let (load, temperature) = scenario(TRAINING + HORIZON);
    let mut values: Vec<Option<f64>> = load.into_iter().map(Some).collect();
    values[100] = None;
    let target = series_from_values(
        &SeriesKey::new("NO1", "energy_consumption"),
        "kWh",
        start(),
        Duration::hours(1),
        &values,
    );
    let temperature = hourly(SeriesKey::new("NO1-weather", "temperature_2m"), "degC", &temperature);
    let engine = ForecastEngine::new(default_model(), TRAINING, HORIZON, 0.95).unwrap();

    let err = engine
        .forecast_at(&ForecastRequest::new(&target, vec![&temperature], training_window()), at(TRAINING))
        .unwrap_err();
    assert!(matches!(
        err,
        AnalyticsError::MissingTrainingData { missing: 1, first_missing, .. } if first_missing == at(100)
    ));
}

#[test]
fn test_non_convergence_reports_configuration() {
    let (load, temperature) = scenario_series(TRAINING + HORIZON);
    let model = Sarimax::new([1, 0, 1], [1, 1, 1, 24], 1, 1e-4).unwrap();
    let engine = ForecastEngine::new(model, TRAINING, HORIZON, 0.95).unwrap();

    let err = engine
        .forecast_at(&ForecastRequest::new(&load, vec![&temperature], training_window()), at(TRAINING))
        .unwrap_err();
    match err {
        AnalyticsError::FitConvergence { spec, iterations, .. } => {
            assert!(spec.contains("SARIMAX(1,0,1)(1,1,1,24)"));
            assert!(spec.contains("max_iterations=1"));
            assert_eq!(iterations, 1);
        }
        other => panic!("expected a fit failure, got {other}"),
    }
}

#[test]
fn test_too_short_training_window() {
    let (load, temperature) = scenario_series(TRAINING + HORIZON);
    let engine = ForecastEngine::new(default_model(), TRAINING, HORIZON, 0.95).unwrap();
    let window = TimeRange::new(start(), at(40)).unwrap();

    let err = engine
        .forecast_at(&ForecastRequest::new(&load, vec![&temperature], window), at(40))
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::InsufficientData(_)));
}

#[test]
fn test_seasonal_naive_baseline_is_worse_than_fitted_model() {
    let (load, temperature) = scenario_series(TRAINING + HORIZON);
    let request = ForecastRequest::new(&load, vec![&temperature], training_window());

    let sarimax = ForecastEngine::new(default_model(), TRAINING, HORIZON, 0.95)
        .unwrap()
        .forecast_at(&request, at(TRAINING))
        .unwrap();
    let naive = ForecastEngine::new(SeasonalNaive::new(24).unwrap(), TRAINING, HORIZON, 0.95)
        .unwrap()
        .forecast_at(&request, at(TRAINING))
        .unwrap();

    assert_eq!(naive.model_name, "SeasonalNaive(24)");
    assert_eq!(naive.results[0].point_estimate, load.value_at(at(TRAINING - 24)).unwrap());

    let fitted = evaluate_forecast(&sarimax.results, &load).unwrap();
    let baseline = evaluate_forecast(&naive.results, &load).unwrap();
    assert!(fitted.mae < baseline.mae, "fitted {} vs baseline {}", fitted.mae, baseline.mae);
}

#[test]
fn test_forecasts_are_stored_per_generation_time() {
    let (load, temperature) = scenario_series(TRAINING + HORIZON);
    let engine = ForecastEngine::new(SeasonalNaive::new(24).unwrap(), TRAINING, HORIZON, 0.9).unwrap();
    let request = ForecastRequest::new(&load, vec![&temperature], training_window());
    let store = MemoryResultsStore::new();

    let run = engine.forecast_at(&request, at(TRAINING)).unwrap();
    store.save_forecasts(&run.results).unwrap();
    store.save_forecasts(&run.results).unwrap();

    let generated = TimeRange::new(at(TRAINING), at(TRAINING + 1)).unwrap();
    let stored = store.read_forecasts("NO1", "energy_consumption", &generated).unwrap();
    assert_eq!(stored, run.results);
}
