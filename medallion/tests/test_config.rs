use chrono::Duration;
use medallion::{AggregateKind, PipelineConfig, PipelineError, WindowSpec};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_partial_file_keeps_other_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
canonical_interval = "15m"
max_interpolation_gap = 8
aggregate_window = {{ hours = 6 }}
aggregate_kinds = ["sum", "max"]
correlation_lag_range = [-12, 12]
"#
    )
    .unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();

    assert_eq!(config.interval().unwrap(), Duration::minutes(15));
    assert_eq!(config.max_interpolation_gap, 8);
    assert_eq!(config.aggregate_window, WindowSpec::Hours(6));
    assert_eq!(config.aggregate_kinds, vec![AggregateKind::Sum, AggregateKind::Max]);
    assert_eq!(config.correlation_lag_range, [-12, 12]);
    assert_eq!(config.anomaly_window_size, 24);
    assert_eq!(config.forecast_seasonal_order, [1, 1, 1, 24]);
}

#[test]
fn test_weekly_window_parses() {
    let config = PipelineConfig::from_toml_str(r#"aggregate_window = "weekly""#).unwrap();
    assert_eq!(config.aggregate_window, WindowSpec::Weekly);
}

#[test]
fn test_unknown_key_is_rejected() {
    let result = PipelineConfig::from_toml_str("anomaly_treshold = 2.0");
    assert!(matches!(result, Err(PipelineError::Toml(_))));
}

#[rstest]
#[case("canonical_interval = \"90s\"")]
#[case("confidence_level = 1.0")]
#[case("correlation_lag_range = [5, -5]")]
#[case("correlation_min_points = 2")]
#[case("forecast_seasonal_order = [1, 0, 0, 1]")]
#[case("aggregate_kinds = []")]
#[case("worker_threads = 0")]
#[case("stl_seasonal = 24")]
#[case("stl_trend = 23")]
#[case("spectrogram_overlap = 1.0")]
fn test_invalid_values_are_rejected(#[case] toml: &str) {
    let result = PipelineConfig::from_toml_str(toml);
    assert!(
        matches!(result, Err(PipelineError::InvalidConfig(_))),
        "expected InvalidConfig for {}, got {:?}",
        toml,
        result
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let result = PipelineConfig::from_file("/nonexistent/energy_lake.toml");
    assert!(matches!(result, Err(PipelineError::Io(_))));
}
