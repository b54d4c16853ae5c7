use chrono::{DateTime, Duration, TimeZone, Utc};
use energy_analytics::{evaluate_forecast, CorrelationEngine};
use energy_lake::{init_logging, Lakehouse, DEFAULT_DIRECTIVE};
use medallion::areas::weather_entity_for;
use medallion::utils::{raw_records, seasonal_values};
use medallion::{PipelineConfig, RawRecord, RawValue, SeriesKey, TimeRange};

const DAYS: i64 = 30;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(DEFAULT_DIRECTIVE);

    println!("Energy Lake: Pipeline Walkthrough");
    println!("=================================\n");

    let config = PipelineConfig::load()?;
    let lake = Lakehouse::in_memory(config)?;
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let range = TimeRange::new(start, start + Duration::days(DAYS))?;

    // Bronze
    println!("Ingesting synthetic raw records...");
    let mut keys = Vec::new();
    for (seed, area) in ["NO1", "NO2"].iter().enumerate() {
        let weather = weather_entity_for(area).ok_or("unknown price area")?;
        let energy_key = SeriesKey::new(*area, "energy_consumption");
        let weather_key = SeriesKey::new(weather, "temperature_2m");

        let (load, temperature) = synthetic_area(seed as u64);
        let mut records = raw_records(&energy_key, start, Duration::hours(1), &load, 1, "elhub", start);
        records.extend(raw_records(&weather_key, start, Duration::hours(1), &temperature, 0, "frost", start));
        let report = lake.ingest(&records)?;
        println!("  {}: {} appended, {} rejected", area, report.appended, report.rejected.len());

        keys.push(energy_key);
        keys.push(weather_key);
    }

    // A late correction, a duplicate delivery and a malformed record
    let corrected = correction(start + Duration::hours(200), start + Duration::days(DAYS));
    let report = lake.ingest(&corrected)?;
    println!(
        "  corrections: {} appended, {} duplicates, {} rejected\n",
        report.appended,
        report.duplicates,
        report.rejected.len()
    );

    // Silver and gold
    println!("Refreshing silver and gold for {} series...", keys.len());
    for (key, outcome) in lake.refresh_batch(&keys, &range) {
        match outcome {
            Ok(outcome) => println!(
                "  {}: {} points ({} missing), {} conflicts, {} daily summaries",
                key, outcome.silver_points, outcome.missing_points, outcome.conflicts, outcome.summaries
            ),
            Err(e) => println!("  {}: failed: {}", key, e),
        }
    }
    println!();

    // Analytics
    let energy = SeriesKey::new("NO1", "energy_consumption");
    let weather = SeriesKey::new("NO1-weather", "temperature_2m");

    let flags = lake.detect_anomalies(&energy, &range)?;
    println!("Anomalies in {}: {}", energy, flags.len());
    for flag in &flags {
        println!(
            "  {} value {:.1} vs median {:.1} (severity {:.1})",
            flag.timestamp, flag.value, flag.reference_value, flag.severity
        );
    }

    let correlations = lake.correlate(&weather, &energy, &range)?;
    println!("\nBest lag per correlation window ({} units evaluated):", correlations.len());
    for best in CorrelationEngine::best_lags(&correlations).iter().take(5) {
        println!("  {}: lag {:+} h, r = {:.3}", best.window_start, best.lag, best.coefficient);
    }

    let training_end = start + Duration::hours(lake.config().forecast_training_window as i64);
    match lake.forecast(&energy, &[weather.clone()], training_end, training_end) {
        Ok(run) => {
            println!("\nForecast {} ({})", run.model_name, run.model_id);
            println!("  AIC {:.1}, residual std {:.2}", run.diagnostics.aic, run.diagnostics.residual_std);
            for step in run.results.iter().take(6) {
                println!(
                    "  {} {:.1} [{:.1}, {:.1}]",
                    step.horizon_timestamp, step.point_estimate, step.lower_bound, step.upper_bound
                );
            }

            let actual = lake
                .stores()
                .series
                .read_series(&energy.entity_id, &energy.metric, &range)?;
            println!("\n{}", evaluate_forecast(&run.results, &actual)?);
        }
        Err(e) => println!("\nForecast failed: {}", e),
    }

    // Serving
    let rows = lake.publish(&energy, &range)? + lake.publish_analytics(&energy, &range)?;
    println!("Published {} rows to the serving store", rows);

    Ok(())
}

/// Hourly consumption that drifts from day to day and follows temperature
fn synthetic_area(seed: u64) -> (Vec<f64>, Vec<f64>) {
    let len = (DAYS * 24) as usize;
    let temperature = seasonal_values(len, 2.0 + seed as f64, 4.0, 24, 1.5, 100 + seed);
    let shocks = seasonal_values(len, 0.0, 0.0, 24, 5.0, 200 + seed);
    let profile = seasonal_values(24, 1500.0, 250.0, 24, 0.0, 0);

    let mut noise = 0.0;
    let mut load = vec![0.0; len];
    for t in 0..len {
        noise = 0.5 * noise + shocks[t];
        let base = if t < 24 {
            profile[t]
        } else {
            load[t - 24] + 25.0 * temperature[t - 24]
        };
        load[t] = base - 25.0 * temperature[t] + noise;
    }
    // one metering glitch
    load[400] *= 10.0;
    (load, temperature)
}

fn correction(at: DateTime<Utc>, ingested_at: DateTime<Utc>) -> Vec<RawRecord> {
    let record = |value: RawValue, ingested: DateTime<Utc>| RawRecord {
        entity_id: "NO1".to_string(),
        metric: "energy_consumption".to_string(),
        timestamp: at.to_rfc3339(),
        value,
        unit: Some("MWh".to_string()),
        source: "elhub".to_string(),
        ingested_at: ingested.to_rfc3339(),
    };
    vec![
        record(RawValue::Number(1.42), ingested_at),
        record(RawValue::Number(1.42), ingested_at),
        record(RawValue::Text("n/a".to_string()), ingested_at),
    ]
}
