//! Injectable nanosecond time sources.
//!
//! Every time-dependent component in the crate (the [`TimeTicker`] behind each
//! rate gauge, and idle-bucket eviction) reads time through a shared
//! `Arc<dyn Clock>`, so tests can drive windows and expiry deterministically
//! with a [`TestClock`].
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//!
//! use bucketkit::time::{Clock, TestClock};
//!
//! let clock = TestClock::new(1_000);
//! assert_eq!(clock.now_nanos(), 1_000);
//!
//! clock.advance(Duration::from_nanos(500));
//! assert_eq!(clock.now_nanos(), 1_500);
//! ```
//!
//! [`TimeTicker`]: crate::time::TimeTicker

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// A monotonically non-decreasing source of nanosecond instants.
///
/// Readings are only meaningful relative to other readings of the same clock.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant in nanoseconds.
    fn now_nanos(&self) -> u64;
}

/// Monotonic clock backed by [`Instant`], anchored at construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Process-wide shared instance used when no clock is configured.
    pub fn shared() -> Arc<dyn Clock> {
        static SHARED: OnceLock<Arc<SystemClock>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(SystemClock::new())).clone()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Manually driven clock for tests.
///
/// Time only moves when [`set`](Self::set) or [`advance`](Self::advance) is
/// called. Safe to share across threads.
#[derive(Debug, Default)]
pub struct TestClock {
    now: AtomicU64,
}

impl TestClock {
    pub fn new(start_nanos: u64) -> Self {
        Self {
            now: AtomicU64::new(start_nanos),
        }
    }

    /// Sets the current instant.
    pub fn set(&self, nanos: u64) {
        self.now.store(nanos, Ordering::Release);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.advance_nanos(nanos);
    }

    pub fn advance_nanos(&self, nanos: u64) {
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.saturating_add(nanos))
            });
    }
}

impl Clock for TestClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

/// Converts a [`Duration`] to whole nanoseconds, saturating at `u64::MAX`.
#[inline]
pub(crate) fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
