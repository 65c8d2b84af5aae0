//! A window over the most recent span of a live sample stream.
//!
//! [`MovingWindow`] drains an inbound `mpsc` channel into an
//! [`OrderedRingBuffer`], optionally through a [`Resampler`] first, and lets
//! callers read the buffer by index, by timestamp or by slice at any time.
//!
//! ## Tasks
//!
//! Building a window spawns up to two tasks:
//! - **ingestion**: receives samples and writes them into the buffer, or
//!   forwards them to the resampler's `"avg"` sub-stream;
//! - **resampler**: the tick loop, whose sink writes into the buffer.
//!
//! Both stop on [`MovingWindow::stop`] or when the window is dropped. The
//! ingestion task also ends when the producer closes the inbound channel.
//!
//! ## Concurrent reads
//!
//! The buffer sits in an `Arc<parking_lot::RwLock<_>>`. Writers take the lock
//! only for one synchronous `update`, never across an `.await`, so a reader
//! always sees whole samples.
//!
//! # Example
//! ```no_run
//! use std::time::Duration;
//! use chrono::Utc;
//! use rust_telemetry::timeseries::{Key, MovingWindow, Sample};
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, rx) = mpsc::channel(1024);
//! let mut window = MovingWindow::builder(Duration::from_secs(60), rx, Duration::from_secs(1))
//!     .name("grid_power")
//!     .build()?;
//!
//! tx.send(Sample::new(Utc::now(), 1_250.0)).await?;
//!
//! let newest = window.at(-1)?;
//! let last_ten = window.get(Key::range(-10, 0))?;
//! # let _ = (newest, last_ten);
//! window.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::error::{WindowError, WindowResult};
use crate::supervisor::{wait_all, TaskExit, TaskOutcome, TaskResult};
use crate::timeseries::alignment::capacity_for;
use crate::timeseries::resampling::{Resampler, ResamplerConfig};
use crate::timeseries::ring_buffer::OrderedRingBuffer;
use crate::timeseries::sample::{Sample, UNIX_EPOCH};

/// Name of the resampler sub-stream feeding the buffer.
const RESAMPLED_STREAM: &str = "avg";

/// Default capacity of the channel between ingestion and resampler.
const DEFAULT_FORWARD_CAPACITY: usize = 1024;

/// Largest number of slots a window may allocate (80 MB of `f64`).
pub const MAX_CAPACITY: usize = 10_000_000;

/// Read key for [`MovingWindow::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Logical position, negative values count back from the newest slot
    Index(i64),
    /// Wall-clock timestamp
    Time(DateTime<Utc>),
    /// Half-open slice; an omitted bound defaults to the edge of the window
    Range(Option<Box<Key>>, Option<Box<Key>>),
}

impl Key {
    /// `[start, stop)`.
    pub fn range(start: impl Into<Key>, stop: impl Into<Key>) -> Self {
        Key::Range(Some(Box::new(start.into())), Some(Box::new(stop.into())))
    }

    /// `[start, end of window)`.
    pub fn range_from(start: impl Into<Key>) -> Self {
        Key::Range(Some(Box::new(start.into())), None)
    }

    /// `[start of window, stop)`.
    pub fn range_to(stop: impl Into<Key>) -> Self {
        Key::Range(None, Some(Box::new(stop.into())))
    }

    /// The whole window.
    pub fn full() -> Self {
        Key::Range(None, None)
    }
}

impl From<i64> for Key {
    fn from(index: i64) -> Self {
        Key::Index(index)
    }
}

impl From<i32> for Key {
    fn from(index: i32) -> Self {
        Key::Index(i64::from(index))
    }
}

impl From<DateTime<Utc>> for Key {
    fn from(timestamp: DateTime<Utc>) -> Self {
        Key::Time(timestamp)
    }
}

impl<T: Into<Key>> From<Range<T>> for Key {
    fn from(range: Range<T>) -> Self {
        Key::range(range.start, range.end)
    }
}

impl<T: Into<Key>> From<RangeFrom<T>> for Key {
    fn from(range: RangeFrom<T>) -> Self {
        Key::range_from(range.start)
    }
}

impl<T: Into<Key>> From<RangeTo<T>> for Key {
    fn from(range: RangeTo<T>) -> Self {
        Key::range_to(range.end)
    }
}

impl From<RangeFull> for Key {
    fn from(_: RangeFull) -> Self {
        Key::full()
    }
}

/// Result of a read: one value for point keys, a slice for range keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Index or timestamp read
    Value(f64),
    /// Slice read, oldest first
    Values(Vec<f64>),
}

impl Selection {
    /// The single value, if this was a point read.
    pub fn as_value(&self) -> Option<f64> {
        match self {
            Selection::Value(value) => Some(*value),
            Selection::Values(_) => None,
        }
    }

    /// The values as a vector; a point read becomes a one-element vector.
    pub fn into_values(self) -> Vec<f64> {
        match self {
            Selection::Value(value) => vec![value],
            Selection::Values(values) => values,
        }
    }
}

/// Where the ingestion task sends received samples.
enum IngestTarget {
    Buffer(Arc<RwLock<OrderedRingBuffer>>),
    Resampler(mpsc::Sender<Sample>),
}

/// A spawned task together with its shutdown signal.
struct WindowTask {
    name: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<TaskResult>>,
}

impl WindowTask {
    fn signal_shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }

    fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Builder for [`MovingWindow`].
pub struct MovingWindowBuilder {
    size: Duration,
    receiver: mpsc::Receiver<Sample>,
    input_sampling_period: Duration,
    resampler_config: Option<ResamplerConfig>,
    align_to: DateTime<Utc>,
    name: String,
    span: Option<Span>,
    forward_capacity: usize,
}

impl MovingWindowBuilder {
    /// Resample the input before storing it.
    pub fn resampler_config(mut self, config: ResamplerConfig) -> Self {
        self.resampler_config = Some(config);
        self
    }

    /// Reference point fixing the slot grid. Defaults to the UNIX epoch.
    pub fn align_to(mut self, align_to: DateTime<Utc>) -> Self {
        self.align_to = align_to;
        self
    }

    /// Name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Span the window's tasks and reads are recorded under.
    ///
    /// Defaults to an `info` span named `moving_window` carrying the window name.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Capacity of the channel between ingestion and the resampler.
    pub fn forward_capacity(mut self, capacity: usize) -> Self {
        self.forward_capacity = capacity;
        self
    }

    fn validate(&self) -> WindowResult<()> {
        if self.input_sampling_period.is_zero() {
            return Err(WindowError::Precondition(
                "The input sampling period should be greater than zero.".into(),
            ));
        }
        if self.input_sampling_period > self.size {
            return Err(WindowError::Precondition(
                "The input sampling period should be equal to or lower than the window size."
                    .into(),
            ));
        }
        if let Some(config) = &self.resampler_config {
            config.validate()?;
            if config.resampling_period > self.size {
                return Err(WindowError::Precondition(
                    "The resampling period should be equal to or lower than the window size."
                        .into(),
                ));
            }
        }
        if self.forward_capacity == 0 {
            return Err(WindowError::Precondition(
                "The forward channel capacity should be greater than zero.".into(),
            ));
        }
        let capacity = capacity_for(self.size, self.effective_period());
        if capacity > MAX_CAPACITY {
            return Err(WindowError::Precondition(format!(
                "The window needs {capacity} slots, more than the maximum of {MAX_CAPACITY}."
            )));
        }
        Ok(())
    }

    /// Slot width: the resampling period if configured, else the input period.
    fn effective_period(&self) -> Duration {
        self.resampler_config
            .as_ref()
            .map_or(self.input_sampling_period, |config| config.resampling_period)
    }

    /// Validate the configuration, build the buffer and start the tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// `WindowError::Precondition` for invalid periods or when no runtime is
    /// available. No task is started in that case.
    pub fn build(self) -> WindowResult<MovingWindow> {
        self.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            WindowError::Precondition(format!("MovingWindow requires a Tokio runtime: {e}"))
        })?;

        let sampling_period = self.effective_period();
        let capacity = capacity_for(self.size, sampling_period);
        let buffer = Arc::new(RwLock::new(OrderedRingBuffer::new(
            capacity,
            sampling_period,
            self.align_to,
        )?));

        let span = self
            .span
            .unwrap_or_else(|| info_span!("moving_window", window = %self.name));
        span.in_scope(|| {
            info!(
                size = ?self.size,
                sampling_period = ?sampling_period,
                capacity,
                resampling = self.resampler_config.is_some(),
                "Starting moving window"
            )
        });

        let mut tasks = Vec::with_capacity(2);
        let mut resampler = None;

        let target = match self.resampler_config {
            Some(config) => {
                let instance = Resampler::new(config)?;
                let (forward_tx, forward_rx) = mpsc::channel(self.forward_capacity);
                let sink_buffer = Arc::clone(&buffer);
                instance.add_timeseries(RESAMPLED_STREAM, forward_rx, move |sample| {
                    sink_buffer.write().update(sample);
                    Ok(())
                })?;

                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                let handle = runtime.spawn(
                    run_resampler(instance.clone(), shutdown_rx).instrument(span.clone()),
                );
                tasks.push(WindowTask {
                    name: "resampler",
                    shutdown_tx: Some(shutdown_tx),
                    handle: Some(handle),
                });
                resampler = Some(instance);
                IngestTarget::Resampler(forward_tx)
            }
            None => IngestTarget::Buffer(Arc::clone(&buffer)),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = runtime
            .spawn(run_ingestion(self.receiver, target, shutdown_rx).instrument(span.clone()));
        tasks.push(WindowTask {
            name: "ingestion",
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        });

        Ok(MovingWindow {
            name: self.name,
            size: self.size,
            sampling_period,
            buffer,
            resampler,
            tasks,
            span,
        })
    }
}

/// Receive samples until cancelled or the producer closes the channel.
async fn run_ingestion(
    mut receiver: mpsc::Receiver<Sample>,
    target: IngestTarget,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> TaskResult {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                info!("MovingWindow task has been cancelled");
                return Ok(TaskExit::Cancelled);
            }
            received = receiver.recv() => {
                let Some(sample) = received else {
                    info!("Inbound sample channel has been closed");
                    return Ok(TaskExit::Completed);
                };
                debug!(timestamp = %sample.timestamp, value = ?sample.value, "Received new sample");
                match &target {
                    IngestTarget::Buffer(buffer) => buffer.write().update(sample),
                    IngestTarget::Resampler(forward_tx) => {
                        // a full forward channel must not delay shutdown
                        tokio::select! {
                            biased;
                            _ = &mut shutdown_rx => {
                                info!("MovingWindow task has been cancelled");
                                return Ok(TaskExit::Cancelled);
                            }
                            sent = forward_tx.send(sample) => {
                                if sent.is_err() {
                                    warn!("Resampler input has been closed, stopping ingestion");
                                    return Ok(TaskExit::Completed);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Drive the resampler until cancelled.
async fn run_resampler(resampler: Resampler, shutdown_rx: oneshot::Receiver<()>) -> TaskResult {
    tokio::select! {
        result = resampler.resample() => result.map(|()| TaskExit::Completed),
        _ = shutdown_rx => {
            info!("Resampler task has been cancelled");
            Ok(TaskExit::Cancelled)
        }
    }
}

/// A bounded, randomly addressable view over the latest span of a sample stream.
pub struct MovingWindow {
    name: String,
    size: Duration,
    sampling_period: Duration,
    buffer: Arc<RwLock<OrderedRingBuffer>>,
    resampler: Option<Resampler>,
    tasks: Vec<WindowTask>,
    span: Span,
}

impl MovingWindow {
    /// Start building a window of `size` fed by `receiver`.
    ///
    /// `input_sampling_period` is the interval between consecutive input
    /// samples; it becomes the slot width unless a resampler is configured.
    pub fn builder(
        size: Duration,
        receiver: mpsc::Receiver<Sample>,
        input_sampling_period: Duration,
    ) -> MovingWindowBuilder {
        MovingWindowBuilder {
            size,
            receiver,
            input_sampling_period,
            resampler_config: None,
            align_to: UNIX_EPOCH,
            name: "moving_window".to_string(),
            span: None,
            forward_capacity: DEFAULT_FORWARD_CAPACITY,
        }
    }

    /// Build a window with default alignment and no resampling.
    pub fn new(
        size: Duration,
        receiver: mpsc::Receiver<Sample>,
        input_sampling_period: Duration,
    ) -> WindowResult<Self> {
        Self::builder(size, receiver, input_sampling_period).build()
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested time span.
    pub fn size(&self) -> Duration {
        self.size
    }

    /// Effective slot width: the resampling period if configured, else the input period.
    pub fn sampling_period(&self) -> Duration {
        self.sampling_period
    }

    /// Number of slots in the underlying buffer.
    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    /// Always false: a window has at least one slot.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The resampler, if the window resamples its input.
    pub fn resampler(&self) -> Option<&Resampler> {
        self.resampler.as_ref()
    }

    /// Oldest timestamp in the valid span.
    pub fn time_bound_oldest(&self) -> Option<DateTime<Utc>> {
        self.buffer.read().time_bound_oldest()
    }

    /// Newest timestamp in the valid span.
    pub fn time_bound_newest(&self) -> Option<DateTime<Utc>> {
        self.buffer.read().time_bound_newest()
    }

    /// Number of slots currently holding a value.
    pub fn count_valid(&self) -> usize {
        self.buffer.read().count_valid()
    }

    /// Whether any background task is still running.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(WindowTask::is_running)
    }

    /// Read by index, timestamp or slice.
    ///
    /// # Errors
    /// - out-of-range errors for positions outside the valid span
    /// - `WindowError::KeyType` for slices mixing an index and a timestamp,
    ///   or slices bounded by other slices
    /// - `WindowError::EmptyRange` for empty or reversed slices
    pub fn get(&self, key: impl Into<Key>) -> WindowResult<Selection> {
        let _entered = self.span.enter();
        match key.into() {
            Key::Index(index) => self.buffer.read().get(index).map(Selection::Value),
            Key::Time(timestamp) => {
                debug!(%timestamp, "Returning value at time");
                self.buffer.read().get_at(timestamp).map(Selection::Value)
            }
            Key::Range(start, stop) => self
                .slice(start.map(|k| *k), stop.map(|k| *k))
                .map(Selection::Values),
        }
    }

    fn slice(&self, start: Option<Key>, stop: Option<Key>) -> WindowResult<Vec<f64>> {
        let buffer = self.buffer.read();
        match (start, stop) {
            (Some(Key::Range(..)), _) | (_, Some(Key::Range(..))) => Err(WindowError::KeyType(
                "Slice bounds have to be either timestamps or integers, not slices".into(),
            )),
            (Some(Key::Index(_)), Some(Key::Time(_))) | (Some(Key::Time(_)), Some(Key::Index(_))) => {
                Err(WindowError::KeyType(
                    "Slice bounds have to be both timestamps or both integers".into(),
                ))
            }
            (Some(Key::Time(start)), stop) => {
                let stop = match stop {
                    Some(Key::Time(stop)) => stop,
                    _ => buffer.time_bound_newest().ok_or(WindowError::TimestampOutOfRange {
                        timestamp: start,
                        oldest: None,
                        newest: None,
                    })?,
                };
                debug!(%start, %stop, "Returning slice");
                buffer.window(start, stop)
            }
            (None, Some(Key::Time(stop))) => {
                let start = buffer
                    .time_bound_oldest()
                    .ok_or(WindowError::TimestampOutOfRange {
                        timestamp: stop,
                        oldest: None,
                        newest: None,
                    })?;
                debug!(%start, %stop, "Returning slice");
                buffer.window(start, stop)
            }
            (start, stop) => {
                let start = match start {
                    Some(Key::Index(index)) => index,
                    _ => 0,
                };
                let stop = match stop {
                    Some(Key::Index(index)) => index,
                    _ => buffer.len() as i64,
                };
                debug!(start, stop, "Returning slice");
                buffer.window_by_index(start, stop)
            }
        }
    }

    /// Value at a logical index.
    pub fn at(&self, index: i64) -> WindowResult<f64> {
        self.buffer.read().get(index)
    }

    /// Value stored for `timestamp`.
    pub fn at_time(&self, timestamp: DateTime<Utc>) -> WindowResult<f64> {
        self.buffer.read().get_at(timestamp)
    }

    /// Values for `[start, end)` by time.
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> WindowResult<Vec<f64>> {
        self.buffer.read().window(start, end)
    }

    /// Values for `[start, end)` by logical index.
    pub fn window_by_index(&self, start: i64, end: i64) -> WindowResult<Vec<f64>> {
        self.buffer.read().window_by_index(start, end)
    }

    /// Snapshot of the whole window, oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.buffer.read().to_vec()
    }

    /// Cancel the background tasks and wait for them to end.
    ///
    /// Calling `stop` again afterwards does nothing.
    ///
    /// # Errors
    /// `WindowError::TaskFailed` if a task ended with an error or a panic
    /// before it could be cancelled.
    pub async fn stop(&mut self) -> WindowResult<()> {
        for task in &mut self.tasks {
            task.signal_shutdown();
        }

        let handles: Vec<_> = self
            .tasks
            .iter_mut()
            .filter_map(|task| task.handle.take().map(|handle| (task.name.to_string(), handle)))
            .collect();
        if handles.is_empty() {
            return Ok(());
        }

        let outcomes = wait_all(handles).instrument(self.span.clone()).await;
        let failure = outcomes.into_iter().find_map(|(task, outcome)| match outcome {
            TaskOutcome::Failed(reason) => Some(WindowError::TaskFailed { task, reason }),
            _ => None,
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for MovingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovingWindow")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("sampling_period", &self.sampling_period)
            .field("len", &self.len())
            .field("resampling", &self.resampler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tracing_test::traced_test;

    fn at(secs: i64) -> DateTime<Utc> {
        UNIX_EPOCH + TimeDelta::seconds(secs)
    }

    #[test]
    fn key_conversions() {
        assert_eq!(Key::from(3_i64), Key::Index(3));
        assert_eq!(Key::from(at(5)), Key::Time(at(5)));
        assert_eq!(Key::from(1..4), Key::range(1, 4));
        assert_eq!(Key::from(at(1)..at(4)), Key::range(at(1), at(4)));
        assert_eq!(Key::from(2..), Key::Range(Some(Box::new(Key::Index(2))), None));
        assert_eq!(Key::from(..at(2)), Key::Range(None, Some(Box::new(Key::Time(at(2))))));
        assert_eq!(Key::from(..), Key::full());
    }

    #[test]
    fn selection_accessors() {
        assert_eq!(Selection::Value(1.0).as_value(), Some(1.0));
        assert_eq!(Selection::Values(vec![1.0]).as_value(), None);
        assert_eq!(Selection::Value(2.0).into_values(), vec![2.0]);
    }

    #[test]
    fn build_outside_runtime_fails() {
        let (_tx, rx) = mpsc::channel(1);
        let result = MovingWindow::new(Duration::from_secs(10), rx, Duration::from_secs(1));
        assert!(matches!(result, Err(WindowError::Precondition(_))));
    }

    #[tokio::test]
    async fn preconditions_are_checked_before_start() {
        let (_tx, rx) = mpsc::channel(1);
        let err = MovingWindow::new(Duration::from_secs(10), rx, Duration::ZERO).unwrap_err();
        assert!(matches!(err, WindowError::Precondition(_)));

        let (_tx, rx) = mpsc::channel(1);
        let err = MovingWindow::new(Duration::from_secs(10), rx, Duration::from_secs(11))
            .unwrap_err();
        assert!(matches!(err, WindowError::Precondition(_)));

        let (_tx, rx) = mpsc::channel(1);
        let err = MovingWindow::builder(Duration::from_secs(10), rx, Duration::from_secs(1))
            .resampler_config(ResamplerConfig::new(Duration::from_secs(20)))
            .build()
            .unwrap_err();
        assert!(matches!(err, WindowError::Precondition(_)));
    }

    #[tokio::test]
    async fn oversized_capacity_is_rejected() {
        let (_tx, rx) = mpsc::channel(1);
        let err = MovingWindow::new(Duration::from_secs(3600), rx, Duration::from_nanos(1))
            .unwrap_err();
        assert!(matches!(err, WindowError::Precondition(_)));

        // resampling decides the slot width
        let (_tx, rx) = mpsc::channel(1);
        let mut window = MovingWindow::builder(Duration::from_secs(3600), rx, Duration::from_nanos(1))
            .resampler_config(ResamplerConfig::new(Duration::from_secs(1)))
            .build()
            .unwrap();
        assert_eq!(window.len(), 3600);
        window.stop().await.unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let mut window = MovingWindow::new(
            Duration::from_secs(MAX_CAPACITY as u64),
            rx,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(window.len(), MAX_CAPACITY);
        window.stop().await.unwrap();
    }

    #[tokio::test]
    async fn capacity_follows_effective_period() {
        let (_tx, rx) = mpsc::channel(1);
        let mut window = MovingWindow::new(Duration::from_secs(10), rx, Duration::from_secs(3))
            .unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window.sampling_period(), Duration::from_secs(3));
        window.stop().await.unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let mut window = MovingWindow::builder(Duration::from_secs(60), rx, Duration::from_millis(100))
            .resampler_config(ResamplerConfig::new(Duration::from_secs(5)))
            .build()
            .unwrap();
        assert_eq!(window.len(), 12);
        assert_eq!(window.sampling_period(), Duration::from_secs(5));
        assert_eq!(
            window.resampler().map(Resampler::timeseries_names),
            Some(vec![RESAMPLED_STREAM.to_string()])
        );
        window.stop().await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn stop_logs_cancellation() {
        let (_tx, rx) = mpsc::channel(1);
        let mut window = MovingWindow::builder(Duration::from_secs(10), rx, Duration::from_secs(1))
            .name("cancel_me")
            .build()
            .unwrap();
        assert!(window.is_running());

        window.stop().await.unwrap();
        assert!(!window.is_running());
        assert!(logs_contain("MovingWindow task has been cancelled"));
        assert!(logs_contain("cancel_me"));

        window.stop().await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn closed_inbound_channel_ends_ingestion() {
        let (tx, rx) = mpsc::channel(4);
        let mut window = MovingWindow::new(Duration::from_secs(10), rx, Duration::from_secs(1))
            .unwrap();

        tx.send(Sample::new(at(3), 1.5)).await.unwrap();
        drop(tx);
        for _ in 0..100 {
            if !window.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(!window.is_running());
        assert_eq!(window.at_time(at(3)).unwrap(), 1.5);
        assert!(logs_contain("Inbound sample channel has been closed"));
        window.stop().await.unwrap();
    }
}
