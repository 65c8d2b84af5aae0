//! Time-addressed ring buffer holding the most recent span of a sampled signal.
//!
//! The buffer stores one `f64` per sampling period in a fixed array that is
//! allocated once and never grows. Every timestamp maps to a slot through the
//! alignment formula
//!
//! ```text
//! slot(t) = floor((t - align_to) / sampling_period) mod capacity
//! ```
//!
//! so two timestamps that are a whole number of buffer spans apart share a
//! slot, and writing the newer one overwrites the older.
//!
//! # Logical vs. physical order
//!
//! `align_to` is an arbitrary fixed reference that usually lies far outside
//! the span in view, so physical slot 0 is rarely the oldest value. Reads by
//! index use the *logical* order (oldest to newest); the buffer translates to
//! physical slots with the same modulo arithmetic.
//!
//! ```text
//! capacity = 5, newest written at slot 1:
//!
//!   physical:  [ t5 | t6 | t2 | t3 | t4 ]
//!   logical:     3    4    0    1    2
//! ```
//!
//! A slice crossing the physical end is materialised by concatenating the two
//! storage segments.
//!
//! # Missing data
//!
//! Absent values are stored as NaN. When a write jumps ahead by more than one
//! period, the slots skipped over are reset to NaN, so wrapped data from an
//! older span never shows up inside the valid range.
//!
//! # Ordering
//!
//! `update` performs no ordering check: the last write to a slot wins. Input
//! is expected to be (close to) monotonic; a sample that is more than one
//! buffer span older than the newest will silently replace newer data.

use std::ops::Index;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{WindowError, WindowResult};
use crate::timeseries::alignment::{
    align_down, nanos_since, offset, period_nanos, periods_since, slot_index,
};
use crate::timeseries::sample::Sample;

/// Fixed-capacity circular store addressed by absolute time.
#[derive(Debug, Clone)]
pub struct OrderedRingBuffer {
    /// Slot storage, NaN where no value is present
    buffer: Box<[f64]>,

    /// Duration covered by one slot
    sampling_period: Duration,

    /// Reference point fixing the phase of slot 0
    align_to: DateTime<Utc>,

    /// Newest timestamp written so far, aligned to the sampling grid
    newest: Option<DateTime<Utc>>,
}

impl OrderedRingBuffer {
    /// Create a buffer with `capacity` slots of `sampling_period` each.
    ///
    /// # Errors
    /// Returns `WindowError::Precondition` if `capacity` or `sampling_period` is zero.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use rust_telemetry::timeseries::{OrderedRingBuffer, Sample, UNIX_EPOCH};
    ///
    /// let mut rb = OrderedRingBuffer::new(4, Duration::from_secs(1), UNIX_EPOCH).unwrap();
    /// let t = UNIX_EPOCH + chrono::TimeDelta::seconds(10);
    /// rb.update(Sample::new(t, 42.0));
    /// assert_eq!(rb.get_at(t).unwrap(), 42.0);
    /// ```
    pub fn new(
        capacity: usize,
        sampling_period: Duration,
        align_to: DateTime<Utc>,
    ) -> WindowResult<Self> {
        if capacity == 0 {
            return Err(WindowError::Precondition(
                "Ring buffer capacity must be greater than zero".into(),
            ));
        }
        if sampling_period.is_zero() {
            return Err(WindowError::Precondition(
                "Ring buffer sampling period must be greater than zero".into(),
            ));
        }

        Ok(Self {
            buffer: vec![f64::NAN; capacity].into_boxed_slice(),
            sampling_period,
            align_to,
            newest: None,
        })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Always false: a buffer has at least one slot.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Duration covered by one slot.
    pub fn sampling_period(&self) -> Duration {
        self.sampling_period
    }

    /// Reference point of the slot grid.
    pub fn align_to(&self) -> DateTime<Utc> {
        self.align_to
    }

    /// Round `timestamp` down onto the sampling grid.
    pub fn normalize_timestamp(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        align_down(timestamp, self.align_to, self.sampling_period)
    }

    /// Physical slot holding `timestamp`.
    pub fn datetime_to_index(&self, timestamp: DateTime<Utc>) -> usize {
        slot_index(timestamp, self.align_to, self.sampling_period, self.len())
    }

    /// Write a sample into the slot of its timestamp.
    ///
    /// Overwrites unconditionally. Advances the valid span when the sample is
    /// newer than anything seen so far, clearing the slots jumped over.
    pub fn update(&mut self, sample: Sample) {
        let timestamp = self.normalize_timestamp(sample.timestamp);

        match self.newest {
            Some(newest) if timestamp > newest => {
                let skipped = periods_since(timestamp, newest, self.sampling_period) - 1;
                self.clear_after(newest, skipped);
                self.newest = Some(timestamp);
            }
            Some(_) => {}
            None => self.newest = Some(timestamp),
        }

        let slot = self.datetime_to_index(timestamp);
        self.buffer[slot] = sample.value_or_nan();
    }

    /// Reset the `count` slots following `from` to NaN, at most one full buffer.
    fn clear_after(&mut self, from: DateTime<Utc>, count: i128) {
        let capacity = self.len();
        let count = count.clamp(0, capacity as i128) as usize;
        let first = (self.datetime_to_index(from) + 1) % capacity;
        for k in 0..count {
            self.buffer[(first + k) % capacity] = f64::NAN;
        }
    }

    /// Oldest timestamp in the valid span (inclusive), `None` before the first write.
    pub fn time_bound_oldest(&self) -> Option<DateTime<Utc>> {
        let span = (self.len() as i128 - 1) * period_nanos(self.sampling_period);
        self.newest.map(|newest| offset(newest, -span))
    }

    /// Newest timestamp in the valid span (inclusive), `None` before the first write.
    pub fn time_bound_newest(&self) -> Option<DateTime<Utc>> {
        self.newest
    }

    /// Physical slot of logical index 0.
    fn start_slot(&self) -> usize {
        self.time_bound_oldest()
            .map(|oldest| self.datetime_to_index(oldest))
            .unwrap_or(0)
    }

    fn logical_to_physical(&self, index: usize) -> usize {
        (self.start_slot() + index) % self.len()
    }

    /// Resolve a possibly negative logical index into `0..len`.
    fn resolve_index(&self, index: i64) -> WindowResult<usize> {
        let len = self.len() as i64;
        let resolved = if index < 0 { index + len } else { index };
        if (0..len).contains(&resolved) {
            Ok(resolved as usize)
        } else {
            Err(WindowError::IndexOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    /// Value at a logical index; negative indices count back from the newest slot.
    pub fn get(&self, index: i64) -> WindowResult<f64> {
        let index = self.resolve_index(index)?;
        Ok(self.buffer[self.logical_to_physical(index)])
    }

    /// Value stored for `timestamp`.
    ///
    /// # Errors
    /// `WindowError::TimestampOutOfRange` when the timestamp lies outside the valid span.
    pub fn get_at(&self, timestamp: DateTime<Utc>) -> WindowResult<f64> {
        let normalized = self.checked_timestamp(timestamp)?;
        Ok(self.buffer[self.datetime_to_index(normalized)])
    }

    /// True if no value is stored for `timestamp`.
    pub fn is_missing(&self, timestamp: DateTime<Utc>) -> WindowResult<bool> {
        self.get_at(timestamp).map(f64::is_nan)
    }

    /// Number of slots holding a value.
    pub fn count_valid(&self) -> usize {
        self.buffer.iter().filter(|v| !v.is_nan()).count()
    }

    fn out_of_range(&self, timestamp: DateTime<Utc>) -> WindowError {
        WindowError::TimestampOutOfRange {
            timestamp,
            oldest: self.time_bound_oldest(),
            newest: self.time_bound_newest(),
        }
    }

    fn checked_timestamp(&self, timestamp: DateTime<Utc>) -> WindowResult<DateTime<Utc>> {
        let normalized = self.normalize_timestamp(timestamp);
        match (self.time_bound_oldest(), self.time_bound_newest()) {
            (Some(oldest), Some(newest)) if oldest <= normalized && normalized <= newest => {
                Ok(normalized)
            }
            _ => Err(self.out_of_range(timestamp)),
        }
    }

    /// Values for the half-open time interval `[start, end)`, oldest first.
    ///
    /// Both bounds are rounded down onto the sampling grid. `end` may lie one
    /// period past the newest timestamp so the newest value can be included.
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> WindowResult<Vec<f64>> {
        let first = self.normalize_timestamp(start);
        let last = self.normalize_timestamp(end);
        if last <= first {
            return Err(WindowError::EmptyRange(format!("{start} .. {end}")));
        }

        let (oldest, newest) = match (self.time_bound_oldest(), self.time_bound_newest()) {
            (Some(oldest), Some(newest)) => (oldest, newest),
            _ => return Err(self.out_of_range(start)),
        };
        if first < oldest {
            return Err(self.out_of_range(start));
        }
        if nanos_since(last, newest) > period_nanos(self.sampling_period) {
            return Err(self.out_of_range(end));
        }

        let from = periods_since(first, oldest, self.sampling_period) as usize;
        let count = periods_since(last, first, self.sampling_period) as usize;
        Ok(self.copy_logical(from, count))
    }

    /// Values for the half-open logical index interval `[start, end)`.
    pub fn window_by_index(&self, start: i64, end: i64) -> WindowResult<Vec<f64>> {
        let len = self.len() as i64;
        let from = self.resolve_index(start)?;
        let to = if end < 0 { end + len } else { end };
        if !(0..=len).contains(&to) {
            return Err(WindowError::IndexOutOfRange {
                index: end,
                len: self.len(),
            });
        }
        let to = to as usize;
        if to <= from {
            return Err(WindowError::EmptyRange(format!("{start} .. {end}")));
        }
        Ok(self.copy_logical(from, to - from))
    }

    /// Copy `count` values starting at logical index `from`, joining the wrap.
    fn copy_logical(&self, from: usize, count: usize) -> Vec<f64> {
        let capacity = self.len();
        let start = self.logical_to_physical(from);

        if start + count <= capacity {
            return self.buffer[start..start + count].to_vec();
        }

        let head = capacity - start;
        let mut values = Vec::with_capacity(count);
        values.extend_from_slice(&self.buffer[start..]);
        values.extend_from_slice(&self.buffer[..count - head]);
        values
    }

    /// Iterate all slots in logical order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let start = self.start_slot();
        self.buffer[start..]
            .iter()
            .chain(self.buffer[..start].iter())
            .copied()
    }

    /// Snapshot of all slots in logical order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.copy_logical(0, self.len())
    }
}

impl Index<usize> for OrderedRingBuffer {
    type Output = f64;

    /// Logical indexing; panics when `index >= len()` like slice indexing.
    fn index(&self, index: usize) -> &f64 {
        let physical = if index < self.len() {
            self.logical_to_physical(index)
        } else {
            index
        };
        &self.buffer[physical]
    }
}
