//! Time source for snapshot stamping
//!
//! Stores never read the wall clock directly: they ask an injected [`Clock`]
//! and pass the reading through [`MonotonicStamper`], so timestamps on one
//! snapshot id strictly increase even when the wall clock stalls or steps
//! backward.

use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the current instant
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and deterministic replays
///
/// Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Smallest step used to separate two stamps taken at the same reading
const STAMP_STEP_MICROS: i64 = 1;

/// Produces per-snapshot timestamps that never go backward
#[derive(Debug, Clone)]
pub struct MonotonicStamper {
    clock: Arc<dyn Clock>,
}

impl MonotonicStamper {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Current clock reading, unadjusted
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Stamp strictly after every instant in `after`
    ///
    /// Uses the clock reading when it is already ahead; otherwise steps one
    /// microsecond past the latest previous stamp.
    pub fn stamp_after<I>(&self, after: I) -> DateTime<Utc>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let now = self.clock.now();
        match after.into_iter().max() {
            Some(prev) if prev >= now => prev + Duration::microseconds(STAMP_STEP_MICROS),
            _ => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(t0());
        let other = clock.clone();
        clock.advance(Duration::seconds(5));
        assert_eq!(other.now(), t0() + Duration::seconds(5));
    }

    #[test]
    fn test_stamp_uses_clock_when_ahead() {
        let clock = ManualClock::new(t0());
        let stamper = MonotonicStamper::new(Arc::new(clock.clone()));
        let prev = t0() - Duration::seconds(1);
        assert_eq!(stamper.stamp_after([prev]), t0());
    }

    #[test]
    fn test_stamp_steps_past_stalled_clock() {
        let clock = ManualClock::new(t0());
        let stamper = MonotonicStamper::new(Arc::new(clock.clone()));

        let first = stamper.stamp_after([t0()]);
        assert!(first > t0());

        // Clock moves backward
        clock.set(t0() - Duration::hours(1));
        let second = stamper.stamp_after([first]);
        assert!(second > first);
    }
}
