//! Time-to-slot arithmetic shared by the ring buffer and the resampler.
//!
//! All computations run on signed nanosecond offsets in `i128`, so timestamps
//! before the alignment reference and spans of several centuries stay exact.
//! Floor division is Euclidean: a timestamp one nanosecond before `align_to`
//! belongs to period `-1`, not period `0`.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Length of `period` in nanoseconds.
pub fn period_nanos(period: Duration) -> i128 {
    period.as_nanos() as i128
}

/// Signed nanoseconds from `reference` to `t`.
pub fn nanos_since(t: DateTime<Utc>, reference: DateTime<Utc>) -> i128 {
    let secs = i128::from(t.timestamp()) - i128::from(reference.timestamp());
    let subsec =
        i128::from(t.timestamp_subsec_nanos()) - i128::from(reference.timestamp_subsec_nanos());
    secs * NANOS_PER_SECOND + subsec
}

/// Shift `t` by a signed number of nanoseconds, saturating at the representable range.
pub fn offset(t: DateTime<Utc>, nanos: i128) -> DateTime<Utc> {
    let secs = nanos.div_euclid(NANOS_PER_SECOND);
    let subsec = nanos.rem_euclid(NANOS_PER_SECOND) as i64;
    let shifted = i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| t.checked_add_signed(delta))
        .and_then(|t| t.checked_add_signed(TimeDelta::nanoseconds(subsec)));

    match shifted {
        Some(t) => t,
        None if nanos < 0 => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// Number of whole periods between `align_to` and `t`, rounded towards negative infinity.
pub fn periods_since(t: DateTime<Utc>, align_to: DateTime<Utc>, period: Duration) -> i128 {
    nanos_since(t, align_to).div_euclid(period_nanos(period))
}

/// The grid point at or before `t`.
pub fn align_down(t: DateTime<Utc>, align_to: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let periods = periods_since(t, align_to, period);
    offset(align_to, periods * period_nanos(period))
}

/// The first grid point strictly after `t`.
pub fn next_boundary(
    t: DateTime<Utc>,
    align_to: DateTime<Utc>,
    period: Duration,
) -> DateTime<Utc> {
    let periods = periods_since(t, align_to, period) + 1;
    offset(align_to, periods * period_nanos(period))
}

/// `floor((t - align_to) / period) mod capacity`.
pub fn slot_index(
    t: DateTime<Utc>,
    align_to: DateTime<Utc>,
    period: Duration,
    capacity: usize,
) -> usize {
    periods_since(t, align_to, period).rem_euclid(capacity as i128) as usize
}

/// Slots needed to cover `size` at `period`, rounding up when the division is not exact.
pub fn capacity_for(size: Duration, period: Duration) -> usize {
    let size = size.as_nanos();
    let period = period.as_nanos();
    if period == 0 {
        return 0;
    }
    usize::try_from(size.div_ceil(period)).unwrap_or(usize::MAX)
}
