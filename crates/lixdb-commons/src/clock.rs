//! Strictly monotonic wall-clock timestamps.
//!
//! `updated_at` must strictly increase on every update (and `created_at`
//! must never repeat within a burst of mutations), so raw `Utc::now()` is
//! not enough on fast machines where two mutations can land in the same
//! millisecond. The clock remembers the last value it handed out and bumps
//! forward by one millisecond when the wall clock has not moved.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;

/// Monotonic timestamp source shared by all mutation paths of one engine.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_ms: Mutex<i64>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, strictly greater than every previously returned one.
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last_ms.lock();
        let mut ms = Utc::now().timestamp_millis();
        if ms <= *last {
            ms = *last + 1;
        }
        *last = ms;
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }

    /// Next timestamp formatted the way the engine persists it.
    ///
    /// RFC 3339 with fixed millisecond precision in UTC, so lexicographic
    /// ordering of stored strings equals chronological ordering.
    pub fn now_rfc3339(&self) -> String {
        format_timestamp(&self.now())
    }
}

/// Canonical persisted form of a timestamp.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now_rfc3339();
        for _ in 0..100 {
            let next = clock.now_rfc3339();
            assert!(next > prev, "{next} should sort after {prev}");
            prev = next;
        }
    }

    #[test]
    fn test_fixed_width_format() {
        let clock = MonotonicClock::new();
        let ts = clock.now_rfc3339();
        // 2024-01-01T00:00:00.000Z
        assert_eq!(ts.len(), 24);
        assert!(ts.ends_with('Z'));
    }
}
