//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, `config/telemetry.toml` by default)
//! 2. Environment variables prefixed with `RUST_TELEMETRY_`
//!
//! Nested keys are separated by a double underscore in environment variables,
//! e.g. `RUST_TELEMETRY_APPLICATION__LOG_LEVEL=debug` or
//! `RUST_TELEMETRY_WINDOW__SIZE=5m`.
//!
//! Durations use the humantime format (`"500ms"`, `"1s"`, `"5m"`).
//!
//! # Example
//! ```no_run
//! use rust_telemetry::config::TelemetryConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TelemetryConfig::load()?;
//! config.validate()?;
//! println!("Application: {}", config.application.name);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{WindowError, WindowResult};
use crate::timeseries::{ResamplerConfig, ResamplingFunction, UNIX_EPOCH};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/telemetry.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "RUST_TELEMETRY_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Moving window settings
    #[serde(default)]
    pub window: WindowConfig,
    /// Optional resampling stage in front of the window
    #[serde(default)]
    pub resampler: Option<ResamplerSettings>,
    /// Mock sample source used by the binary
    #[serde(default)]
    pub source: SourceConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Interval between window reports
    #[serde(default = "default_report_interval", with = "humantime_serde")]
    pub report_interval: Duration,
}

/// Moving window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Span of time the window covers
    #[serde(default = "default_window_size", with = "humantime_serde")]
    pub size: Duration,
    /// Interval between input samples
    #[serde(default = "default_input_period", with = "humantime_serde")]
    pub input_sampling_period: Duration,
    /// Slot grid reference, the UNIX epoch when unset
    #[serde(default)]
    pub align_to: Option<DateTime<Utc>>,
    /// Capacity of the inbound sample channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Resampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResamplerSettings {
    /// Output cadence
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Aggregation (average, sum, min, max, last)
    #[serde(default = "default_function")]
    pub function: String,
    /// Align ticks to the window grid; otherwise ticks start one period after startup
    #[serde(default = "default_true")]
    pub aligned: bool,
    /// Samples per tick above which a warning is logged
    #[serde(default = "default_warn_buffer_len")]
    pub warn_buffer_len: usize,
}

/// Mock source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Interval between emitted samples
    #[serde(default = "default_input_period", with = "humantime_serde")]
    pub period: Duration,
    /// Mean emitted value in watts
    #[serde(default = "default_base_power")]
    pub base_power: f64,
    /// Uniform noise amplitude as a fraction of `base_power`
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Probability of emitting an absent sample
    #[serde(default)]
    pub dropout_probability: f64,
    /// RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

// Default value functions
fn default_name() -> String {
    "rust_telemetry".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_report_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_window_size() -> Duration {
    Duration::from_secs(60)
}

fn default_input_period() -> Duration {
    Duration::from_secs(1)
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_function() -> String {
    "average".to_string()
}

fn default_true() -> bool {
    true
}

fn default_warn_buffer_len() -> usize {
    crate::timeseries::resampling::DEFAULT_WARN_BUFFER_LEN
}

fn default_base_power() -> f64 {
    1_000.0
}

fn default_noise() -> f64 {
    0.05
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            report_interval: default_report_interval(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size: default_window_size(),
            input_sampling_period: default_input_period(),
            align_to: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            period: default_input_period(),
            base_power: default_base_power(),
            noise: default_noise(),
            dropout_probability: 0.0,
            seed: None,
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> WindowResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and the environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> WindowResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// The provider stack backing [`TelemetryConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(TelemetryConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> WindowResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(WindowError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(WindowError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.window.input_sampling_period.is_zero() {
            return Err(WindowError::Configuration(
                "window.input_sampling_period must be greater than zero".into(),
            ));
        }
        if self.window.input_sampling_period > self.window.size {
            return Err(WindowError::Configuration(format!(
                "window.input_sampling_period ({:?}) must not exceed window.size ({:?})",
                self.window.input_sampling_period, self.window.size
            )));
        }
        if self.window.channel_capacity == 0 {
            return Err(WindowError::Configuration(
                "window.channel_capacity must be greater than zero".into(),
            ));
        }

        if let Some(resampler) = &self.resampler {
            if resampler.period.is_zero() || resampler.period > self.window.size {
                return Err(WindowError::Configuration(format!(
                    "resampler.period ({:?}) must be greater than zero and not exceed window.size ({:?})",
                    resampler.period, self.window.size
                )));
            }
            resampler.function.parse::<ResamplingFunction>()?;
        }

        if self.source.period.is_zero() {
            return Err(WindowError::Configuration(
                "source.period must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.source.dropout_probability) {
            return Err(WindowError::Configuration(format!(
                "source.dropout_probability {} must be within 0..=1",
                self.source.dropout_probability
            )));
        }
        if !self.source.noise.is_finite() || self.source.noise < 0.0 {
            return Err(WindowError::Configuration(format!(
                "source.noise {} must be a non-negative number",
                self.source.noise
            )));
        }

        Ok(())
    }

    /// Slot grid reference for the window.
    pub fn align_to(&self) -> DateTime<Utc> {
        self.window.align_to.unwrap_or(UNIX_EPOCH)
    }

    /// Resampler settings for the window, if resampling is enabled.
    pub fn resampler_config(&self) -> WindowResult<Option<ResamplerConfig>> {
        let Some(settings) = &self.resampler else {
            return Ok(None);
        };
        let function = settings.function.parse::<ResamplingFunction>()?;
        let align_to = settings.aligned.then(|| self.align_to());
        Ok(Some(
            ResamplerConfig::new(settings.period)
                .with_function(function)
                .with_align_to(align_to)
                .with_warn_buffer_len(settings.warn_buffer_len),
        ))
    }
}
