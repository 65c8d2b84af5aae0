//! Fixed-cadence resampling of irregular sample streams.
//!
//! A [`Resampler`] owns any number of named sub-streams. Each sub-stream has
//! its own input channel, aggregation function and sink. One tick loop,
//! [`Resampler::resample`], serves all of them: on every tick it drains what
//! each input channel has queued, aggregates it and hands one sample stamped at
//! the tick boundary to the sink.
//!
//! A tick with no input still produces a sample, with an absent value, so the
//! output stays on a strict grid.
//!
//! ## Scheduling
//!
//! Ticks come from `tokio::time::interval_at` anchored at the first boundary.
//! Every later tick is scheduled relative to that anchor, not to the end of
//! the previous tick, so time spent in sinks does not accumulate as drift.
//! With `align_to` set (the default is the UNIX epoch) the first boundary is
//! the next multiple of the period after the current wall-clock time.
//!
//! ## Locking
//!
//! The sub-stream registry sits behind a `parking_lot::Mutex` that is only
//! held by synchronous code: registration and the drain/aggregate/dispatch
//! step of a tick. Sinks run while the lock is held and must not call back
//! into the same resampler.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{WindowError, WindowResult};
use crate::timeseries::alignment::{next_boundary, offset, period_nanos};
use crate::timeseries::sample::{Sample, UNIX_EPOCH};

/// Callback receiving one resampled sample per tick.
pub type Sink = Box<dyn FnMut(Sample) -> anyhow::Result<()> + Send>;

/// User-supplied aggregation over the values received during one tick.
pub type AggregateFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Default number of samples per tick above which a warning is logged.
pub const DEFAULT_WARN_BUFFER_LEN: usize = 128;

/// Aggregation applied to the values received during one tick.
#[derive(Clone, Default)]
pub enum ResamplingFunction {
    /// Arithmetic mean
    #[default]
    Average,
    /// Sum of all values
    Sum,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Most recently received value
    Last,
    /// Caller-provided aggregation, only invoked on non-empty input
    Custom(AggregateFn),
}

impl ResamplingFunction {
    /// Aggregate `values`; `None` when nothing was received.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let value = match self {
            ResamplingFunction::Average => values.iter().sum::<f64>() / values.len() as f64,
            ResamplingFunction::Sum => values.iter().sum(),
            ResamplingFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            ResamplingFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ResamplingFunction::Last => values[values.len() - 1],
            ResamplingFunction::Custom(f) => f(values),
        };
        Some(value)
    }
}

impl fmt::Debug for ResamplingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResamplingFunction::Average => "Average",
            ResamplingFunction::Sum => "Sum",
            ResamplingFunction::Min => "Min",
            ResamplingFunction::Max => "Max",
            ResamplingFunction::Last => "Last",
            ResamplingFunction::Custom(_) => "Custom",
        };
        f.write_str(name)
    }
}

impl FromStr for ResamplingFunction {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(ResamplingFunction::Average),
            "sum" => Ok(ResamplingFunction::Sum),
            "min" => Ok(ResamplingFunction::Min),
            "max" => Ok(ResamplingFunction::Max),
            "last" => Ok(ResamplingFunction::Last),
            other => Err(WindowError::Configuration(format!(
                "Invalid resampling function '{}'. Must be one of: average, sum, min, max, last",
                other
            ))),
        }
    }
}

/// Resampler settings shared by all sub-streams.
#[derive(Debug, Clone)]
pub struct ResamplerConfig {
    /// Output cadence
    pub resampling_period: Duration,
    /// Aggregation used by `add_timeseries`
    pub resampling_function: ResamplingFunction,
    /// Tick phase reference; `None` starts ticking one period after `resample` is entered
    pub align_to: Option<DateTime<Utc>>,
    /// Samples per tick above which a warning is logged
    pub warn_buffer_len: usize,
}

impl ResamplerConfig {
    /// Averaging resampler aligned to the UNIX epoch.
    pub fn new(resampling_period: Duration) -> Self {
        Self {
            resampling_period,
            resampling_function: ResamplingFunction::Average,
            align_to: Some(UNIX_EPOCH),
            warn_buffer_len: DEFAULT_WARN_BUFFER_LEN,
        }
    }

    /// Set the default aggregation.
    pub fn with_function(mut self, function: ResamplingFunction) -> Self {
        self.resampling_function = function;
        self
    }

    /// Set or clear the tick phase reference.
    pub fn with_align_to(mut self, align_to: Option<DateTime<Utc>>) -> Self {
        self.align_to = align_to;
        self
    }

    /// Set the per-tick warning threshold.
    pub fn with_warn_buffer_len(mut self, len: usize) -> Self {
        self.warn_buffer_len = len;
        self
    }

    /// Check the configuration can drive a tick loop.
    pub fn validate(&self) -> WindowResult<()> {
        if self.resampling_period.is_zero() {
            return Err(WindowError::Precondition(
                "The resampling period should be greater than zero.".into(),
            ));
        }
        Ok(())
    }
}

/// One registered sub-stream.
struct Timeseries {
    receiver: mpsc::Receiver<Sample>,
    sink: Sink,
    function: ResamplingFunction,
    pending: Vec<f64>,
    closed: bool,
}

impl Timeseries {
    /// Move everything queued on the input channel into `pending`.
    ///
    /// Returns the number of samples drained, absent ones included.
    fn drain(&mut self, name: &str) -> usize {
        let mut drained = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(sample) => {
                    drained += 1;
                    if let Some(value) = sample.value {
                        self.pending.push(value);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        info!(timeseries = name, "Resampler input channel closed");
                        self.closed = true;
                    }
                    break;
                }
            }
        }
        drained
    }
}

/// Tick loop turning irregular input into one sample per period per sub-stream.
///
/// Cloning yields another handle to the same set of sub-streams.
#[derive(Clone)]
pub struct Resampler {
    config: Arc<ResamplerConfig>,
    timeseries: Arc<Mutex<BTreeMap<String, Timeseries>>>,
}

impl Resampler {
    /// Create a resampler with no sub-streams.
    pub fn new(config: ResamplerConfig) -> WindowResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            timeseries: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    /// The configuration this resampler was built with.
    pub fn config(&self) -> &ResamplerConfig {
        &self.config
    }

    /// Register a sub-stream aggregated with the configured default function.
    ///
    /// # Errors
    /// `WindowError::DuplicateTimeseries` if `name` is already registered.
    pub fn add_timeseries<F>(
        &self,
        name: impl Into<String>,
        receiver: mpsc::Receiver<Sample>,
        sink: F,
    ) -> WindowResult<()>
    where
        F: FnMut(Sample) -> anyhow::Result<()> + Send + 'static,
    {
        let function = self.config.resampling_function.clone();
        self.add_timeseries_with(name, receiver, sink, function)
    }

    /// Register a sub-stream with its own aggregation function.
    pub fn add_timeseries_with<F>(
        &self,
        name: impl Into<String>,
        receiver: mpsc::Receiver<Sample>,
        sink: F,
        function: ResamplingFunction,
    ) -> WindowResult<()>
    where
        F: FnMut(Sample) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        let mut registry = self.timeseries.lock();
        if registry.contains_key(&name) {
            return Err(WindowError::DuplicateTimeseries(name));
        }

        debug!(timeseries = %name, function = ?function, "Registering timeseries");
        registry.insert(
            name,
            Timeseries {
                receiver,
                sink: Box::new(sink),
                function,
                pending: Vec::new(),
                closed: false,
            },
        );
        Ok(())
    }

    /// Unregister a sub-stream. Returns false if it was not registered.
    pub fn remove_timeseries(&self, name: &str) -> bool {
        self.timeseries.lock().remove(name).is_some()
    }

    /// Names of the registered sub-streams, sorted.
    pub fn timeseries_names(&self) -> Vec<String> {
        self.timeseries.lock().keys().cloned().collect()
    }

    /// Run the tick loop.
    ///
    /// Never returns `Ok` on its own: the owner stops it by dropping the
    /// future (for example through `tokio::select!` or by aborting the task).
    /// Returns `WindowError::Resampling` when a sink fails.
    pub async fn resample(&self) -> WindowResult<()> {
        let period = self.config.resampling_period;
        let (mut boundary, start) = self.first_tick();
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        debug!(period = ?period, first_tick = %boundary, "Resampler started");

        loop {
            ticker.tick().await;
            self.tick(boundary)?;
            boundary = offset(boundary, period_nanos(period));
        }
    }

    /// Timestamp and instant of the first tick.
    fn first_tick(&self) -> (DateTime<Utc>, Instant) {
        let period = self.config.resampling_period;
        let now = Utc::now();
        let instant = Instant::now();

        match self.config.align_to {
            Some(align_to) => {
                let boundary = next_boundary(now, align_to, period);
                let wait = (boundary - now).to_std().unwrap_or(period);
                (boundary, instant + wait)
            }
            None => (offset(now, period_nanos(period)), instant + period),
        }
    }

    /// Drain, aggregate and dispatch every sub-stream for one tick boundary.
    fn tick(&self, timestamp: DateTime<Utc>) -> WindowResult<()> {
        let mut registry = self.timeseries.lock();
        let mut failures = Vec::new();

        for (name, series) in registry.iter_mut() {
            let drained = series.drain(name);
            if drained > self.config.warn_buffer_len {
                warn!(
                    timeseries = %name,
                    drained,
                    limit = self.config.warn_buffer_len,
                    "Resampler received more samples than expected in one period"
                );
            }

            let value = series.function.apply(&series.pending);
            series.pending.clear();

            if let Err(err) = (series.sink)(Sample { timestamp, value }) {
                failures.push((name.clone(), format!("{err:#}")));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            let err = WindowError::Resampling { failures };
            error!(error = %err, "Resampler sink failed");
            Err(err)
        }
    }
}

impl fmt::Debug for Resampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resampler")
            .field("config", &self.config)
            .field("timeseries", &self.timeseries_names())
            .finish()
    }
}
