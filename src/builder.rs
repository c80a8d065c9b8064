//! Configuration for [`BucketedBlockingQueue`].
//!
//! Collects the key function, the per-bucket store and sensor factories, the
//! idle timeout and the clock, then validates them once in [`try_build`].
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use bucketkit::builder::BucketedQueueBuilder;
//!
//! let queue = BucketedQueueBuilder::new(|order: &(u32, &'static str)| order.0)
//!     .bounded(128)
//!     .rate_limited(500, Duration::from_secs(1))
//!     .idle_timeout(Duration::from_secs(30))
//!     .build();
//!
//! queue.offer((7, "widget")).unwrap();
//! assert_eq!(queue.poll(), Some((7, "widget")));
//! ```
//!
//! [`try_build`]: BucketedQueueBuilder::try_build

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::bucketed::{BucketedBlockingQueue, KeyFn};
use crate::error::{BoxError, ConfigError};
use crate::queue::{BlockingQueue, DequeFactory, Order, QueueFactory};
use crate::sensor::{BucketSensor, NullSensorFactory, RateLimitedFactory, SensorFactory};
use crate::time::{Clock, SystemClock};

/// Buckets idle for longer than this are dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How often a consumer re-scans while every non-empty bucket is throttled.
pub const DEFAULT_THROTTLE_RECHECK: Duration = Duration::from_millis(10);

enum Sensors<K, E> {
    Null,
    RateLimited { limit: u64, window: Duration },
    Custom(Box<dyn SensorFactory<K, E>>),
}

pub struct BucketedQueueBuilder<K, E> {
    key_fn: Box<KeyFn<E, K>>,
    capacity: Option<usize>,
    order: Order,
    queues: Option<Box<dyn QueueFactory<E>>>,
    sensors: Sensors<K, E>,
    idle_timeout: Duration,
    clock: Option<Arc<dyn Clock>>,
    throttle_recheck: Duration,
}

impl<K, E> BucketedQueueBuilder<K, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    /// Starts a builder partitioning elements by `key_fn`.
    ///
    /// Defaults: unbounded FIFO buckets, no sensor restrictions,
    /// [`DEFAULT_IDLE_TIMEOUT`], the system clock.
    pub fn new(key_fn: impl Fn(&E) -> K + Send + Sync + 'static) -> Self {
        Self {
            key_fn: Box::new(key_fn),
            capacity: None,
            order: Order::Fifo,
            queues: None,
            sensors: Sensors::Null,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            clock: None,
            throttle_recheck: DEFAULT_THROTTLE_RECHECK,
        }
    }

    /// Caps every bucket at `capacity` elements.
    pub fn bounded(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Buckets hand out their newest element first.
    pub fn lifo(mut self) -> Self {
        self.order = Order::Lifo;
        self
    }

    /// Replaces the built-in deque with a custom store per bucket.
    ///
    /// Overrides [`bounded`](Self::bounded) and [`lifo`](Self::lifo).
    pub fn queue_factory(mut self, factory: impl QueueFactory<E> + 'static) -> Self {
        self.queues = Some(Box::new(factory));
        self
    }

    pub fn sensor(mut self, factory: impl SensorFactory<K, E> + 'static) -> Self {
        self.sensors = Sensors::Custom(Box::new(factory));
        self
    }

    /// Per-key sensor from a closure, for policies that depend on the key.
    pub fn sensor_fn<F>(self, f: F) -> Self
    where
        F: Fn(&K, &dyn BlockingQueue<E>) -> Result<Box<dyn BucketSensor>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.sensor(f)
    }

    /// Gives each bucket a [`RateLimited`](crate::sensor::RateLimited)
    /// sensor allowing `limit` takes per `window` of offers. The sensor runs
    /// on the builder's clock.
    pub fn rate_limited(mut self, limit: u64, window: Duration) -> Self {
        self.sensors = Sensors::RateLimited { limit, window };
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn throttle_recheck(mut self, interval: Duration) -> Self {
        self.throttle_recheck = interval;
        self
    }

    /// Validates the configuration and builds the queue.
    pub fn try_build(self) -> Result<BucketedBlockingQueue<K, E>, ConfigError> {
        if self.queues.is_none() && self.capacity == Some(0) {
            return Err(ConfigError::new("bucket capacity must be > 0"));
        }
        if self.throttle_recheck.is_zero() {
            return Err(ConfigError::new("throttle recheck interval must be > 0"));
        }
        if let Sensors::RateLimited { window, .. } = &self.sensors
            && window.is_zero()
        {
            return Err(ConfigError::new("rate limit window must be > 0"));
        }

        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let queues: Box<dyn QueueFactory<E>> = match self.queues {
            Some(factory) => factory,
            None => {
                let factory = match self.capacity {
                    Some(capacity) => DequeFactory::bounded(capacity),
                    None => DequeFactory::unbounded(),
                };
                Box::new(factory.with_order(self.order))
            },
        };
        let sensors: Box<dyn SensorFactory<K, E>> = match self.sensors {
            Sensors::Null => Box::new(NullSensorFactory),
            Sensors::RateLimited { limit, window } => {
                Box::new(RateLimitedFactory::with_clock(limit, window, clock.clone()))
            },
            Sensors::Custom(factory) => factory,
        };

        Ok(BucketedBlockingQueue::assemble(
            self.key_fn,
            queues,
            sensors,
            self.idle_timeout,
            clock,
            self.throttle_recheck,
        ))
    }

    /// Builds the queue.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; see [`try_build`](Self::try_build).
    pub fn build(self) -> BucketedBlockingQueue<K, E> {
        match self.try_build() {
            Ok(queue) => queue,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<K, E> fmt::Debug for BucketedQueueBuilder<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sensors = match &self.sensors {
            Sensors::Null => "null",
            Sensors::RateLimited { .. } => "rate_limited",
            Sensors::Custom(_) => "custom",
        };
        f.debug_struct("BucketedQueueBuilder")
            .field("capacity", &self.capacity)
            .field("order", &self.order)
            .field("custom_queues", &self.queues.is_some())
            .field("sensors", &sensors)
            .field("idle_timeout", &self.idle_timeout)
            .field("throttle_recheck", &self.throttle_recheck)
            .finish()
    }
}
