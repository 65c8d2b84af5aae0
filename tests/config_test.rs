//! Configuration loading tests against real TOML files.

use rust_telemetry::config::TelemetryConfig;
use rust_telemetry::timeseries::ResamplingFunction;
use rust_telemetry::WindowError;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write config");
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
        [application]
        name = "feeder_7"
        log_level = "debug"
        log_format = "json"
        report_interval = "10s"

        [window]
        size = "15m"
        input_sampling_period = "200ms"
        align_to = "2024-01-01T00:00:00Z"
        channel_capacity = 64

        [resampler]
        period = "1s"
        function = "min"
        aligned = true

        [source]
        period = "200ms"
        base_power = 230.0
        noise = 0.1
        dropout_probability = 0.25
        seed = 3
        "#,
    );

    let config = TelemetryConfig::load_from(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.application.name, "feeder_7");
    assert_eq!(config.application.report_interval, Duration::from_secs(10));
    assert_eq!(config.window.size, Duration::from_secs(15 * 60));
    assert_eq!(config.window.input_sampling_period, Duration::from_millis(200));
    assert_eq!(config.window.channel_capacity, 64);
    assert_eq!(config.source.seed, Some(3));
    assert_eq!(config.align_to().to_rfc3339(), "2024-01-01T00:00:00+00:00");

    let resampler = config.resampler_config().unwrap().unwrap();
    assert_eq!(resampler.resampling_period, Duration::from_secs(1));
    assert!(matches!(resampler.resampling_function, ResamplingFunction::Min));
    assert_eq!(resampler.align_to, Some(config.align_to()));
    // default applied for the omitted key
    assert_eq!(resampler.warn_buffer_len, 128);
}

#[test]
fn test_missing_sections_use_defaults() {
    let file = write_config(
        r#"
        [window]
        size = "30s"
        "#,
    );

    let config = TelemetryConfig::load_from(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.window.size, Duration::from_secs(30));
    assert_eq!(config.window.input_sampling_period, Duration::from_secs(1));
    assert!(config.resampler.is_none());
}

#[test]
fn test_invalid_duration_is_a_load_error() {
    let file = write_config(
        r#"
        [window]
        size = "a while"
        "#,
    );

    let err = TelemetryConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, WindowError::Config(_)));
}

#[test]
fn test_semantic_errors_are_caught_by_validate() {
    let file = write_config(
        r#"
        [window]
        size = "1s"
        input_sampling_period = "2s"
        "#,
    );

    let config = TelemetryConfig::load_from(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(WindowError::Configuration(_))
    ));
}

#[test]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/telemetry.toml");
    let config = TelemetryConfig::load_from(path).unwrap();
    config.validate().unwrap();
    assert!(config.resampler.is_some());
}
