//! Tumbling-window event counter.
//!
//! [`RateGauge`] accumulates a count and resets it to zero whenever its
//! [`TimeTicker`] reports a completed window. Both [`increment`](RateGauge::increment)
//! and [`current_rate`](RateGauge::current_rate) roll the window first, so a
//! reading taken after a long idle period is `0` even if nothing was added.
//!
//! The count is packed with the index of the window it belongs to, so there
//! is no separate reset step for an increment to race with:
//!
//! ```text
//!   state: AtomicU64 = [ window index (32 bits) | count (32 bits) ]
//!
//!   increment(n):  w = window after rolling the ticker
//!                  state.window == w   -> count += n
//!                  state.window  > w   -> count += n   (late: lands in the newer window)
//!                  state.window  < w   -> state = (w, n)
//!   current_rate:  state.window >= w ? count : 0
//! ```
//!
//! Window indices compare modulo 2^32, with at most [`LATE_WINDOWS`] of
//! look-ahead. Counts saturate at `u32::MAX` per window.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bucketkit::time::{RateGauge, TestClock};
//!
//! let clock = Arc::new(TestClock::new(0));
//! let gauge = RateGauge::with_clock(Duration::from_secs(1), clock.clone());
//!
//! gauge.increment(1);
//! assert_eq!(gauge.current_rate(), 1);
//!
//! clock.advance(Duration::from_secs(1));
//! assert_eq!(gauge.current_rate(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::time::clock::{Clock, SystemClock};
use crate::time::ticker::TimeTicker;

/// How far ahead of a caller's window the stored window may be for the
/// caller's increment to join it.
pub const LATE_WINDOWS: u32 = 1 << 10;

const COUNT_BITS: u32 = 32;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

#[inline]
fn pack(window: u32, count: u32) -> u64 {
    (u64::from(window) << COUNT_BITS) | u64::from(count)
}

#[inline]
fn unpack(state: u64) -> (u32, u32) {
    ((state >> COUNT_BITS) as u32, (state & COUNT_MASK) as u32)
}

/// `stored` is `window` or a window shortly after it.
#[inline]
fn is_current(stored: u32, window: u32) -> bool {
    stored.wrapping_sub(window) <= LATE_WINDOWS
}

#[derive(Debug)]
pub struct RateGauge {
    state: AtomicU64,
    ticker: TimeTicker,
}

impl RateGauge {
    /// One-second windows on the shared system clock.
    pub fn new() -> Self {
        Self::with_clock(Duration::from_secs(1), SystemClock::shared())
    }

    /// Custom window on the shared system clock.
    pub fn with_interval(interval: Duration) -> Self {
        Self::with_clock(interval, SystemClock::shared())
    }

    pub fn with_clock(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let ticker = TimeTicker::new(interval, clock);
        Self {
            state: AtomicU64::new(pack(ticker.window_index() as u32, 0)),
            ticker,
        }
    }

    /// Rolls the ticker and returns the index of the window now in effect.
    #[inline]
    fn current_window(&self) -> u32 {
        self.ticker.tick_if_elapsed();
        self.ticker.window_index() as u32
    }

    fn add_in_window(&self, window: u32, n: u64) {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                let (stored, count) = unpack(state);
                Some(if is_current(stored, window) {
                    pack(stored, count.saturating_add(n))
                } else {
                    pack(window, n)
                })
            });
    }

    /// Adds `n` events to the current window.
    pub fn increment(&self, n: u64) {
        let window = self.current_window();
        self.add_in_window(window, n);
    }

    /// Events counted since the start of the current window.
    pub fn current_rate(&self) -> u64 {
        let window = self.current_window();
        let (stored, count) = unpack(self.state.load(Ordering::Acquire));
        if is_current(stored, window) {
            u64::from(count)
        } else {
            0
        }
    }

    pub fn window(&self) -> Duration {
        self.ticker.interval()
    }
}

impl Default for RateGauge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::time::TestClock;

    #[test]
    fn counts_within_window_and_resets_after() {
        let clock = Arc::new(TestClock::new(1_000));
        let gauge = RateGauge::with_clock(Duration::from_secs(1), clock.clone());

        assert_eq!(gauge.current_rate(), 0);

        gauge.increment(1);
        assert_eq!(gauge.current_rate(), 1);

        clock.advance_nanos(1);
        assert_eq!(gauge.current_rate(), 1);

        clock.advance(Duration::from_secs(1));
        assert_eq!(gauge.current_rate(), 0);
    }

    #[test]
    fn increment_after_window_starts_fresh_count() {
        let clock = Arc::new(TestClock::new(0));
        let gauge = RateGauge::with_clock(Duration::from_millis(100), clock.clone());

        gauge.increment(5);
        clock.advance(Duration::from_millis(100));
        gauge.increment(2);

        assert_eq!(gauge.current_rate(), 2);
    }

    #[test]
    fn increment_racing_the_winning_tick_is_kept() {
        let clock = Arc::new(TestClock::new(0));
        let gauge = RateGauge::with_clock(Duration::from_secs(1), clock.clone());
        gauge.increment(3);

        // One caller wins the tick, then another counts into the new window
        // before the winner's own increment lands.
        clock.advance(Duration::from_secs(1));
        assert!(gauge.ticker.tick_if_elapsed());
        gauge.increment(1);
        gauge.add_in_window(gauge.ticker.window_index() as u32, 1);

        assert_eq!(gauge.current_rate(), 2);
    }

    #[test]
    fn late_increment_from_previous_window_lands_in_current() {
        let clock = Arc::new(TestClock::new(0));
        let gauge = RateGauge::with_clock(Duration::from_secs(1), clock.clone());
        let stale = gauge.current_window();

        clock.advance(Duration::from_secs(1));
        gauge.increment(1);
        gauge.add_in_window(stale, 1);

        assert_eq!(gauge.current_rate(), 2);
    }

    #[test]
    fn count_saturates_within_a_window() {
        let clock = Arc::new(TestClock::new(0));
        let gauge = RateGauge::with_clock(Duration::from_secs(1), clock);
        gauge.increment(u64::MAX);
        gauge.increment(1);
        assert_eq!(gauge.current_rate(), u64::from(u32::MAX));
    }

    #[test]
    fn concurrent_increments_within_window_are_not_lost() {
        let clock = Arc::new(TestClock::new(0));
        let gauge = Arc::new(RateGauge::with_clock(Duration::from_secs(60), clock));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gauge = gauge.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        gauge.increment(1);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(gauge.current_rate(), 4_000);
    }
}
