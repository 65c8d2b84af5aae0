//! Timestamped scalar measurements flowing through the window.

use chrono::{DateTime, Utc};

/// The default alignment reference for buffers and resampler ticks.
pub const UNIX_EPOCH: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// A single measurement at a point in time.
///
/// `value` is `None` when there was no measurement for `timestamp`, which is
/// distinct from a measured zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Time the value refers to
    pub timestamp: DateTime<Utc>,
    /// Measured value, `None` if absent
    pub value: Option<f64>,
}

impl Sample {
    /// Create a sample carrying a measured value.
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
        }
    }

    /// Create a sample marking a missing measurement.
    pub fn absent(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            value: None,
        }
    }

    /// Value as stored in the ring buffer, with NaN standing in for absent.
    pub fn value_or_nan(&self) -> f64 {
        self.value.unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_is_not_zero() {
        let ts = Utc::now();
        let absent = Sample::absent(ts);
        let zero = Sample::new(ts, 0.0);
        assert_ne!(absent, zero);
        assert!(absent.value_or_nan().is_nan());
        assert_eq!(zero.value_or_nan(), 0.0);
    }
}
