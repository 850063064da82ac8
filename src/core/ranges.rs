use chrono::{DateTime, Duration, Utc};

use crate::error::InvalidInputError;
use crate::models::{RateRange, TimeWindow};

/// Check that a numeric range is finite, non-negative and ordered
pub fn validate_range(field: &'static str, range: &RateRange) -> Result<(), InvalidInputError> {
    if !range.min.is_finite() || !range.max.is_finite() || range.min < 0.0 || range.max < 0.0 {
        return Err(InvalidInputError::InvalidBound { field });
    }
    if range.min > range.max {
        return Err(InvalidInputError::InvertedRange {
            field,
            min: range.min,
            max: range.max,
        });
    }
    Ok(())
}

/// Check that a time window does not end before it starts
pub fn validate_window(field: &'static str, window: &TimeWindow) -> Result<(), InvalidInputError> {
    if window.end < window.start {
        return Err(InvalidInputError::InvertedWindow { field });
    }
    Ok(())
}

/// Whether two closed ranges share at least one point
#[inline]
pub fn ranges_overlap(a: &RateRange, b: &RateRange) -> bool {
    a.min <= b.max && b.min <= a.max
}

/// Distance between the nearest edges of two ranges (0 when they overlap)
#[inline]
pub fn range_gap(a: &RateRange, b: &RateRange) -> f64 {
    if ranges_overlap(a, b) {
        0.0
    } else if a.max < b.min {
        b.min - a.max
    } else {
        a.min - b.max
    }
}

/// Length of the intersection of two windows, never negative
#[inline]
pub fn window_overlap(a: &TimeWindow, b: &TimeWindow) -> Duration {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    if end > start {
        end - start
    } else {
        Duration::zero()
    }
}

/// Whether `outer` fully contains `inner`
#[inline]
pub fn window_covers(outer: &TimeWindow, inner: &TimeWindow) -> bool {
    outer.start <= inner.start && outer.end >= inner.end
}

#[inline]
pub fn window_contains(window: &TimeWindow, instant: DateTime<Utc>) -> bool {
    window.start <= instant && instant <= window.end
}

/// Duration as fractional seconds, for ratios
#[inline]
pub fn as_secs_f64(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}
