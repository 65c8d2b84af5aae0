//! Custom error types for the crate.
//!
//! This module defines the primary error type, `WindowError`, shared by the ring buffer,
//! the resampler and the moving window. Using the `thiserror` crate, it provides a
//! consistent way to report the different ways a read or a configuration can go wrong.
//!
//! ## Error Hierarchy
//!
//! - **`Precondition`**: A window or resampler was configured with values that can never
//!   work (non-positive period, period larger than the window). Raised at construction,
//!   before any background task is started.
//! - **`IndexOutOfRange`** / **`TimestampOutOfRange`**: A read addressed a position outside
//!   the span currently held by the buffer. The buffer state is untouched.
//! - **`EmptyRange`**: A slice whose end does not lie after its start.
//! - **`KeyType`**: A read key of the wrong shape (mixed range bounds, nested ranges).
//! - **`DuplicateTimeseries`**: A resampler sub-stream name is already registered.
//! - **`Resampling`**: One or more resampler sinks failed during a tick. This ends the
//!   resampling task and is observed through its terminal state.
//! - **`TaskFailed`**: A background task ended with a fault or a panic.
//! - **`Config`** / **`Configuration`**: Loading or validating configuration failed.
//!
//! Upstream channel closure and cancellation are normal shutdown paths and are never
//! reported through this type.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type WindowResult<T> = std::result::Result<T, WindowError>;

/// Errors raised by buffers, resamplers, windows and configuration loading.
#[derive(Error, Debug)]
pub enum WindowError {
    /// Invalid construction parameters
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Logical index outside `[-len, len)`
    #[error("Index {index} out of range for buffer of length {len}")]
    IndexOutOfRange {
        /// Requested logical index
        index: i64,
        /// Buffer capacity
        len: usize,
    },

    /// Timestamp outside the valid span
    #[error("Timestamp {timestamp} outside of the valid range {oldest:?}..={newest:?}")]
    TimestampOutOfRange {
        /// Requested timestamp
        timestamp: DateTime<Utc>,
        /// Oldest valid timestamp, `None` before the first write
        oldest: Option<DateTime<Utc>>,
        /// Newest valid timestamp, `None` before the first write
        newest: Option<DateTime<Utc>>,
    },

    /// Slice whose end does not lie after its start
    #[error("Empty or reversed range: {0}")]
    EmptyRange(String),

    /// Read key of the wrong shape
    #[error("Invalid key: {0}")]
    KeyType(String),

    /// Sub-stream name already registered
    #[error("Timeseries '{0}' is already registered")]
    DuplicateTimeseries(String),

    /// One or more sinks failed during a tick
    #[error("Resampling failed for timeseries: {}", .failures.iter().map(|(name, err)| format!("{name}: {err}")).collect::<Vec<_>>().join("; "))]
    Resampling {
        /// `(sub-stream, error)` for every failing sink
        failures: Vec<(String, String)>,
    },

    /// Background task ended with an error or a panic
    #[error("Task '{task}' failed: {reason}")]
    TaskFailed {
        /// Task name
        task: String,
        /// Error or panic message
        reason: String,
    },

    /// Loading configuration failed
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but invalid
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl WindowError {
    /// Returns true for errors caused by addressing outside the buffer's valid span.
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            WindowError::IndexOutOfRange { .. } | WindowError::TimestampOutOfRange { .. }
        )
    }
}
