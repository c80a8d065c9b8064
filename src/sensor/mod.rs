//! Per-bucket admission policies.
//!
//! A [`BucketSensor`] is consulted by its [`Bucket`](crate::bucket::Bucket)
//! before every mutation and notified after it. Each bucket owns exactly one
//! sensor, created by a [`SensorFactory`] when the bucket is first needed.
//!
//! ## Contract
//!
//! | Method           | When                                   | Default |
//! |------------------|----------------------------------------|---------|
//! | `can_offer`      | before a non-blocking insert           | `true`  |
//! | `can_offer_wait` | before a blocking or timed insert      | `true`  |
//! | `can_take`       | by the fairness scan, per visit        | `true`  |
//! | `on_offer(n)`    | after `can_offer*` passed, before the store insert | no-op |
//! | `on_take`        | before every removal attempt           | no-op   |
//!
//! `on_take` records an *attempted* take: it fires even when the bucket turns
//! out to be empty, so sensors must tolerate takes that removed nothing.
//!
//! ## Implementations
//!
//! - [`NullSensor`]: permits everything.
//! - [`RateLimited`]: throttles consumption once offers within the current
//!   window reach a limit.

pub mod null;
pub mod rate_limited;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub use null::NullSensor;
pub use rate_limited::RateLimited;

use crate::error::BoxError;
use crate::queue::BlockingQueue;
use crate::time::{Clock, SystemClock};

pub trait BucketSensor: Send + Sync + Debug {
    /// Permission for a non-blocking insert.
    fn can_offer(&self) -> bool {
        true
    }

    /// Permission for a blocking insert (`timeout == None`) or a timed one.
    fn can_offer_wait(&self, _timeout: Option<Duration>) -> bool {
        true
    }

    /// Permission to remove the bucket's head element right now.
    fn can_take(&self) -> bool {
        true
    }

    /// `count` elements are about to be handed to the backing store.
    fn on_offer(&self, _count: u64) {}

    /// A removal is being attempted.
    fn on_take(&self) {}
}

/// Creates the sensor for a newly created bucket.
///
/// Receives the bucket key and the bucket's backing store (for policies that
/// want to look at capacity or backlog). Any closure of the matching shape is
/// a factory:
///
/// ```
/// use bucketkit::error::BoxError;
/// use bucketkit::queue::BlockingQueue;
/// use bucketkit::sensor::{BucketSensor, RateLimited, SensorFactory};
///
/// let per_key = |key: &u64, _store: &dyn BlockingQueue<String>| {
///     let limit = if *key == 0 { 10 } else { 100 };
///     Ok::<_, BoxError>(Box::new(RateLimited::per_second(limit)) as Box<dyn BucketSensor>)
/// };
/// fn assert_factory<F: SensorFactory<u64, String>>(_: &F) {}
/// assert_factory(&per_key);
/// ```
pub trait SensorFactory<K, E>: Send + Sync {
    fn create(
        &self,
        key: &K,
        store: &dyn BlockingQueue<E>,
    ) -> Result<Box<dyn BucketSensor>, BoxError>;
}

impl<K, E, F> SensorFactory<K, E> for F
where
    F: Fn(&K, &dyn BlockingQueue<E>) -> Result<Box<dyn BucketSensor>, BoxError> + Send + Sync,
{
    fn create(
        &self,
        key: &K,
        store: &dyn BlockingQueue<E>,
    ) -> Result<Box<dyn BucketSensor>, BoxError> {
        self(key, store)
    }
}

/// Factory producing a [`NullSensor`] for every bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSensorFactory;

impl<K, E> SensorFactory<K, E> for NullSensorFactory {
    fn create(
        &self,
        _key: &K,
        _store: &dyn BlockingQueue<E>,
    ) -> Result<Box<dyn BucketSensor>, BoxError> {
        Ok(Box::new(NullSensor))
    }
}

/// Factory giving every bucket its own [`RateLimited`] sensor with the same
/// limit and window.
#[derive(Debug, Clone)]
pub struct RateLimitedFactory {
    limit: u64,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimitedFactory {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self::with_clock(limit, window, SystemClock::shared())
    }

    pub fn with_clock(limit: u64, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            clock,
        }
    }
}

impl<K, E> SensorFactory<K, E> for RateLimitedFactory {
    fn create(
        &self,
        _key: &K,
        _store: &dyn BlockingQueue<E>,
    ) -> Result<Box<dyn BucketSensor>, BoxError> {
        Ok(Box::new(RateLimited::with_clock(
            self.limit,
            self.window,
            self.clock.clone(),
        )))
    }
}
