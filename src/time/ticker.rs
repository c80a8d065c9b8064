//! Interval edge detector.
//!
//! A [`TimeTicker`] answers "has a full interval passed since the last tick?"
//! and, when it has, advances its tick boundary for exactly one caller.
//!
//! ## Algorithm
//!
//! ```text
//! tick_if_elapsed():
//!   now  = clock.now()
//!   last = last_tick.load()
//!   if now - last >= interval:
//!     return CAS(last_tick, last -> now)   // only the winner sees `true`
//!   return false
//! ```
//!
//! `last_tick` only moves forward. When several threads observe the same
//! elapsed interval, one compare-and-swap succeeds and the others return
//! `false` without touching the boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::time::clock::{Clock, duration_nanos};

#[derive(Debug)]
pub struct TimeTicker {
    interval_nanos: u64,
    last_tick: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl TimeTicker {
    /// Creates a ticker whose first boundary is the clock's current instant.
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let start = clock.now_nanos();
        Self {
            interval_nanos: duration_nanos(interval),
            last_tick: AtomicU64::new(start),
            clock,
        }
    }

    /// Returns `true` to the single caller that observes a completed interval.
    pub fn tick_if_elapsed(&self) -> bool {
        let now = self.clock.now_nanos();
        let last = self.last_tick.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.interval_nanos {
            return false;
        }
        self.last_tick
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Time elapsed since the last tick boundary.
    pub fn elapsed(&self) -> Duration {
        let now = self.clock.now_nanos();
        let last = self.last_tick.load(Ordering::Acquire);
        Duration::from_nanos(now.saturating_sub(last))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos)
    }

    /// Clock reading of the current tick boundary.
    pub fn last_tick_nanos(&self) -> u64 {
        self.last_tick.load(Ordering::Acquire)
    }

    /// Index of the interval that began at the current boundary.
    ///
    /// Boundaries are at least one interval apart, so every tick strictly
    /// increases the index.
    pub fn window_index(&self) -> u64 {
        self.last_tick_nanos() / self.interval_nanos.max(1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;
    use crate::time::TestClock;

    const SECOND: u64 = 1_000_000_000;

    #[test]
    fn ticks_once_per_elapsed_interval() {
        let clock = Arc::new(TestClock::new(42));
        let ticker = TimeTicker::new(Duration::from_secs(1), clock.clone());

        assert!(!ticker.tick_if_elapsed(), "ticked before the interval passed");

        clock.advance_nanos(SECOND);
        assert!(ticker.tick_if_elapsed(), "did not tick after one interval");
        assert!(!ticker.tick_if_elapsed(), "ticked twice for one interval");

        clock.advance_nanos(SECOND + 1);
        assert!(ticker.tick_if_elapsed());
    }

    #[test]
    fn partial_interval_does_not_tick() {
        let clock = Arc::new(TestClock::new(0));
        let ticker = TimeTicker::new(Duration::from_secs(1), clock.clone());

        clock.advance_nanos(SECOND - 1);
        assert!(!ticker.tick_if_elapsed());
        assert_eq!(ticker.elapsed(), Duration::from_nanos(SECOND - 1));
    }

    #[test]
    fn window_index_increases_with_every_tick() {
        let clock = Arc::new(TestClock::new(5 * SECOND + 7));
        let ticker = TimeTicker::new(Duration::from_secs(1), clock.clone());
        assert_eq!(ticker.window_index(), 5);

        clock.advance_nanos(SECOND - 1);
        assert!(!ticker.tick_if_elapsed());
        assert_eq!(ticker.window_index(), 5);

        clock.advance_nanos(1);
        assert!(ticker.tick_if_elapsed());
        assert_eq!(ticker.last_tick_nanos(), 6 * SECOND + 7);
        assert_eq!(ticker.window_index(), 6);
    }

    #[test]
    fn concurrent_callers_see_one_tick() {
        let clock = Arc::new(TestClock::new(0));
        let ticker = Arc::new(TimeTicker::new(Duration::from_secs(1), clock.clone()));
        clock.advance_nanos(SECOND);

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let ticker = ticker.clone();
                let barrier = barrier.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if ticker.tick_if_elapsed() {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::Relaxed), 1);
    }
}
