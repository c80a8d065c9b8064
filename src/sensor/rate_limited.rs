//! Rate-limiting sensor.
//!
//! [`RateLimited`] counts *offers* in a tumbling window and withholds *takes*
//! once the count reaches the limit. Inserts are never rejected: a hot key's
//! bucket keeps accepting elements and backlogs, while the fairness scan skips
//! it until the window rolls over. Producers are never blocked by it.
//!
//! ```text
//!   offers ──▶ RateGauge (window W) ──▶ rate
//!                                       │
//!   can_take() = rate < limit  ◀────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bucketkit::sensor::{BucketSensor, RateLimited};
//! use bucketkit::time::TestClock;
//!
//! let clock = Arc::new(TestClock::new(0));
//! let sensor = RateLimited::with_clock(2, Duration::from_secs(1), clock.clone());
//!
//! sensor.on_offer(1);
//! assert!(sensor.can_take());
//! sensor.on_offer(1);
//! assert!(!sensor.can_take());
//!
//! clock.advance(Duration::from_secs(1));
//! assert!(sensor.can_take());
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::sensor::BucketSensor;
use crate::time::{Clock, RateGauge, SystemClock};

#[derive(Debug)]
pub struct RateLimited {
    gauge: RateGauge,
    limit: u64,
}

impl RateLimited {
    /// `limit` events per `window` on the shared system clock.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self::with_clock(limit, window, SystemClock::shared())
    }

    pub fn with_clock(limit: u64, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            gauge: RateGauge::with_clock(window, clock),
            limit,
        }
    }

    pub fn per_nanosecond(limit: u64) -> Self {
        Self::new(limit, Duration::from_nanos(1))
    }

    pub fn per_second(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    pub fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn per_hour(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60 * 60))
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Offers counted in the current window.
    pub fn current_rate(&self) -> u64 {
        self.gauge.current_rate()
    }
}

impl BucketSensor for RateLimited {
    fn can_take(&self) -> bool {
        self.gauge.current_rate() < self.limit
    }

    fn on_offer(&self, count: u64) {
        self.gauge.increment(count);
    }
}
