//! Injectable time source. Wall-clock timestamps come from `now()`;
//! interval gating in the allocation optimizer uses `monotonic()`, which
//! never goes backwards.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    /// Monotonic elapsed time since the clock was created.
    fn monotonic(&self) -> Duration;
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Hand-advanced clock for tests of interval-gated behavior.
pub struct ManualClock {
    origin: DateTime<Utc>,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.origin
            + ChronoDuration::from_std(*self.elapsed.lock())
                .unwrap_or_else(|_| ChronoDuration::zero())
    }

    fn monotonic(&self) -> Duration {
        *self.elapsed.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(Utc::now());
        let before = clock.monotonic();
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.monotonic() - before, Duration::from_secs(90));
    }
}
