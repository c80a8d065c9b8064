//! Key-partitioned blocking queue with fair, sensor-gated consumption.
//!
//! ## Architecture
//!
//! ```text
//!   producers                                               consumers
//!   ─────────                                               ─────────
//!   offer/put/add                                           take/poll/peek
//!        │                                                        │
//!        ▼                                                        ▼
//!   key_fn(&e) ──▶ buckets: Mutex<ExpiringStore<K, Entry>>   selector.lock()
//!                    │ lookup or create                           │
//!                    │ (creation inserts into registry)           ▼
//!                    ▼                                     round-robin over
//!               Bucket::offer ─────▶ selector.signal() ──▶ registry (SlotArena)
//!                                                                 │
//!   idle sweep / remove_bucket ── listener ── registry.remove     ▼
//!                                                          Bucket::poll
//! ```
//!
//! ## Locking
//!
//! | Lock                 | Held by                           | Nested inside      |
//! |----------------------|-----------------------------------|--------------------|
//! | `buckets` (mutex)    | producer lookup, sweeps, removal  | nothing            |
//! | registry (rwlock)    | create/evict (write), scan (read) | `buckets`, consumer|
//! | consumer (mutex)     | scan-and-remove, producer signal  | nothing            |
//! | bucket store locks   | each bucket operation             | consumer           |
//!
//! Producers never hold the `buckets` lock while inserting into a bucket; the
//! bucket is pinned instead so an idle sweep cannot drop it mid-insert.
//!
//! ## Example
//!
//! ```
//! use bucketkit::bucketed::BucketedBlockingQueue;
//! use bucketkit::queue::DequeFactory;
//! use bucketkit::sensor::NullSensorFactory;
//! use std::time::Duration;
//!
//! let queue = BucketedBlockingQueue::new(
//!     |x: &u32| *x % 2,
//!     DequeFactory::unbounded(),
//!     NullSensorFactory,
//!     Duration::from_secs(60),
//! );
//! for i in 1..=4 {
//!     queue.put(i).unwrap();
//! }
//!
//! let mut got: Vec<u32> = std::iter::from_fn(|| queue.poll()).collect();
//! got.sort();
//! assert_eq!(got, vec![1, 2, 3, 4]);
//! ```

mod iter;
pub(crate) mod select;

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

pub use iter::Iter;
use select::{ConsumerState, Registry, Selector, Wait};

use crate::bucket::{Bucket, BucketPin};
use crate::builder::{BucketedQueueBuilder, DEFAULT_THROTTLE_RECHECK};
use crate::ds::{ConcurrentSlotArena, SlotId};
use crate::error::{BoxError, QueueError};
use crate::metrics::{QueueCounters, QueueMetricsSnapshot};
use crate::queue::QueueFactory;
use crate::sensor::SensorFactory;
use crate::store::expiring::{Expirable, ExpiringStore, RemovalCause, RemovalListener};
use crate::time::clock::duration_nanos;
use crate::time::{Clock, SystemClock};

/// Maps an element to the key of the bucket it belongs to.
pub type KeyFn<E, K> = dyn Fn(&E) -> K + Send + Sync;

/// Cache entry: the bucket plus its registry handle.
struct BucketEntry<K, E> {
    bucket: Arc<Bucket<K, E>>,
    slot: SlotId,
}

impl<K, E> Expirable for BucketEntry<K, E> {
    fn last_access(&self) -> u64 {
        self.bucket.last_access()
    }

    fn touch(&self, now: u64) {
        self.bucket.touch(now)
    }

    fn can_expire(&self) -> bool {
        self.bucket.can_expire()
    }
}

pub struct BucketedBlockingQueue<K, E> {
    key_fn: Box<KeyFn<E, K>>,
    queues: Box<dyn QueueFactory<E>>,
    sensors: Box<dyn SensorFactory<K, E>>,
    buckets: Mutex<ExpiringStore<K, BucketEntry<K, E>>>,
    registry: Arc<Registry<K, E>>,
    selector: Selector,
    clock: Arc<dyn Clock>,
    counters: Arc<QueueCounters>,
}

impl<K, E> BucketedBlockingQueue<K, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    /// Creates a queue on the system clock.
    ///
    /// Buckets are created on first insert for a key, get their store from
    /// `queues` and their sensor from `sensors`, and are dropped once empty
    /// and idle for longer than `idle_timeout`.
    pub fn new(
        key_fn: impl Fn(&E) -> K + Send + Sync + 'static,
        queues: impl QueueFactory<E> + 'static,
        sensors: impl SensorFactory<K, E> + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self::assemble(
            Box::new(key_fn),
            Box::new(queues),
            Box::new(sensors),
            idle_timeout,
            SystemClock::shared(),
            DEFAULT_THROTTLE_RECHECK,
        )
    }

    pub fn builder(
        key_fn: impl Fn(&E) -> K + Send + Sync + 'static,
    ) -> BucketedQueueBuilder<K, E> {
        BucketedQueueBuilder::new(key_fn)
    }

    pub(crate) fn assemble(
        key_fn: Box<KeyFn<E, K>>,
        queues: Box<dyn QueueFactory<E>>,
        sensors: Box<dyn SensorFactory<K, E>>,
        idle_timeout: Duration,
        clock: Arc<dyn Clock>,
        recheck: Duration,
    ) -> Self {
        let registry: Arc<Registry<K, E>> = Arc::new(ConcurrentSlotArena::new());
        let counters = Arc::new(QueueCounters::default());
        let listener = removal_listener(Arc::clone(&registry), Arc::clone(&counters));
        let buckets =
            ExpiringStore::new(duration_nanos(idle_timeout), clock.clone()).with_listener(listener);

        Self {
            key_fn,
            queues,
            sensors,
            buckets: Mutex::new(buckets),
            registry,
            selector: Selector::new(recheck),
            clock,
            counters,
        }
    }

    // -- bucket lifecycle -------------------------------------------------

    /// Looks up or creates the bucket for `element`, pinned for the insert.
    fn bucket_for(&self, element: &E) -> Result<BucketPin<K, E>, QueueError> {
        let key = (self.key_fn)(element);
        let mut buckets = self.buckets.lock();
        buckets.run_pending();
        let entry = buckets.get_or_try_insert_with(&key, |key| self.create_bucket(key))?;
        Ok(BucketPin::new(&entry.bucket))
    }

    fn create_bucket(&self, key: &K) -> Result<BucketEntry<K, E>, QueueError> {
        let store = self.queues.create().map_err(creation_failed)?;
        let bucket = Bucket::new(key.clone(), store, self.sensors.as_ref())
            .map_err(creation_failed)?;
        let bucket = Arc::new(bucket);
        let slot = self.registry.insert(Arc::clone(&bucket));
        self.counters.record_bucket_created();
        tracing::debug!(
            slot = slot.index(),
            buckets = self.registry.len(),
            "created bucket"
        );
        Ok(BucketEntry { bucket, slot })
    }

    /// Bucket currently cached for `key`, without touching it.
    fn existing(&self, key: &K) -> Option<Arc<Bucket<K, E>>> {
        self.buckets.lock().peek(key).map(|entry| Arc::clone(&entry.bucket))
    }

    /// Drops the bucket for `key` and its elements. Producers blocked on a
    /// full bucket get [`QueueError::Interrupted`]; a producer that looked the
    /// bucket up just before the removal has its insert refused.
    pub fn remove_bucket(&self, key: &K) -> bool {
        self.buckets.lock().invalidate(key).is_some()
    }

    /// Runs the idle sweep now. Returns the number of buckets dropped.
    pub fn cleanup(&self) -> usize {
        self.buckets.lock().cleanup()
    }

    pub fn bucket_count(&self) -> usize {
        self.registry.len()
    }

    pub fn bucket_len(&self, key: &K) -> Option<usize> {
        self.existing(key).map(|bucket| bucket.len())
    }

    pub fn keys(&self) -> Vec<K> {
        self.buckets.lock().keys().cloned().collect()
    }

    // -- producers --------------------------------------------------------

    fn record_insert(&self, accepted: bool) -> bool {
        self.counters.record_offer(accepted);
        if accepted {
            self.selector.signal();
        }
        accepted
    }

    /// Inserts without blocking. `Ok(false)` if the sensor or a full bucket
    /// refused the element.
    pub fn offer(&self, element: E) -> Result<bool, QueueError> {
        let bucket = self.bucket_for(&element)?;
        let accepted = bucket.offer(element);
        Ok(self.record_insert(accepted))
    }

    /// Inserts, waiting up to `timeout` for space in the bucket.
    pub fn offer_timeout(&self, element: E, timeout: Duration) -> Result<bool, QueueError> {
        let bucket = self.bucket_for(&element)?;
        let accepted = bucket.offer_timeout(element, timeout);
        self.record_insert(matches!(accepted, Ok(true)));
        accepted
    }

    /// Inserts, waiting as long as the bucket is full. `Ok(false)` if the
    /// sensor refused a blocking insert.
    pub fn put(&self, element: E) -> Result<bool, QueueError> {
        let bucket = self.bucket_for(&element)?;
        let accepted = bucket.put(element);
        self.record_insert(matches!(accepted, Ok(true)));
        accepted
    }

    /// Inserts or fails with [`QueueError::IllegalState`].
    pub fn add(&self, element: E) -> Result<(), QueueError> {
        let bucket = self.bucket_for(&element)?;
        let added = bucket.add(element);
        self.record_insert(added.is_ok());
        added
    }

    /// Adds each element in turn, stopping at the first failure.
    pub fn add_all(&self, elements: impl IntoIterator<Item = E>) -> Result<bool, QueueError> {
        let mut changed = false;
        for element in elements {
            self.add(element)?;
            changed = true;
        }
        Ok(changed)
    }

    // -- consumers --------------------------------------------------------

    fn take_from(&self, bucket: &Bucket<K, E>) -> Option<E> {
        let element = bucket.poll()?;
        bucket.touch(self.clock.now_nanos());
        self.counters.record_take();
        Some(element)
    }

    fn take_next(
        &self,
        guard: &mut MutexGuard<'_, ConsumerState>,
        wait: Wait,
    ) -> Result<Option<E>, QueueError> {
        loop {
            let Some(bucket) = self.selector.select(guard, &self.registry, wait)? else {
                return Ok(None);
            };
            // Emptied by a removal outside the consumer lock; rescan.
            if let Some(element) = self.take_from(&bucket) {
                return Ok(Some(element));
            }
        }
    }

    /// Removes the next element, waiting until one is eligible.
    ///
    /// Fails with [`QueueError::Interrupted`] if [`interrupt`](Self::interrupt)
    /// is called while waiting.
    pub fn take(&self) -> Result<E, QueueError> {
        let mut guard = self.selector.lock();
        self.take_next(&mut guard, Wait::Forever)?
            .ok_or(QueueError::NoSuchElement)
    }

    /// Removes the next eligible element, if any, without blocking.
    pub fn poll(&self) -> Option<E> {
        let mut guard = self.selector.lock();
        self.take_next(&mut guard, Wait::Never).ok().flatten()
    }

    /// Removes the next element, waiting up to `timeout` for one to become
    /// eligible.
    pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<E>, QueueError> {
        let wait = match Instant::now().checked_add(timeout) {
            Some(deadline) => Wait::Until(deadline),
            None => Wait::Forever,
        };
        let mut guard = self.selector.lock();
        self.take_next(&mut guard, wait)
    }

    /// Like [`poll`](Self::poll) but fails with [`QueueError::NoSuchElement`].
    pub fn remove(&self) -> Result<E, QueueError> {
        self.poll().ok_or(QueueError::NoSuchElement)
    }

    /// Head of the next eligible bucket, left in place.
    ///
    /// Advances the round-robin cursor like a take would.
    pub fn peek(&self) -> Option<E>
    where
        E: Clone,
    {
        let mut guard = self.selector.lock();
        match self.selector.select(&mut guard, &self.registry, Wait::Never) {
            Ok(Some(bucket)) => bucket.peek(),
            _ => None,
        }
    }

    pub fn element(&self) -> Result<E, QueueError>
    where
        E: Clone,
    {
        self.peek().ok_or(QueueError::NoSuchElement)
    }

    /// Wakes every thread blocked in `take`, `poll_timeout`, or a bucket's
    /// `put`/`offer_timeout`; each returns [`QueueError::Interrupted`].
    pub fn interrupt(&self) {
        self.selector.interrupt();
        for bucket in self.registry.snapshot() {
            bucket.interrupt();
        }
        tracing::debug!(buckets = self.registry.len(), "interrupted waiters");
    }

    // -- collection -------------------------------------------------------

    /// Total elements across all buckets.
    pub fn len(&self) -> usize {
        self.registry.snapshot().iter().map(|bucket| bucket.len()).sum()
    }

    /// `true` iff every bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.registry.snapshot().iter().all(|bucket| bucket.is_empty())
    }

    pub fn contains(&self, element: &E) -> bool
    where
        E: PartialEq,
    {
        let key = (self.key_fn)(element);
        self.existing(&key)
            .is_some_and(|bucket| bucket.contains(element))
    }

    /// Removes one element equal to `element`.
    pub fn remove_item(&self, element: &E) -> bool
    where
        E: PartialEq,
    {
        let key = (self.key_fn)(element);
        let Some(bucket) = self.existing(&key) else {
            return false;
        };
        let removed = bucket.remove_where(|e| e == element).is_some();
        if removed {
            bucket.touch(self.clock.now_nanos());
        }
        removed
    }

    /// Removes every element equal to one of `elements`.
    pub fn remove_all(&self, elements: &[E]) -> bool
    where
        E: PartialEq,
    {
        let mut changed = false;
        for element in elements {
            while self.remove_item(element) {
                changed = true;
            }
        }
        changed
    }

    pub fn contains_all(&self, _elements: &[E]) -> Result<bool, QueueError> {
        Err(QueueError::NotImplemented("BucketedBlockingQueue::contains_all"))
    }

    pub fn retain_all(&self, _elements: &[E]) -> Result<bool, QueueError> {
        Err(QueueError::NotImplemented("BucketedBlockingQueue::retain_all"))
    }

    pub fn drain_to(&self, _sink: &mut Vec<E>) -> Result<usize, QueueError> {
        Err(QueueError::NotImplemented("BucketedBlockingQueue::drain_to"))
    }

    pub fn drain_to_max(&self, _sink: &mut Vec<E>, _max: usize) -> Result<usize, QueueError> {
        Err(QueueError::NotImplemented("BucketedBlockingQueue::drain_to_max"))
    }

    pub fn remaining_capacity(&self) -> Result<usize, QueueError> {
        Err(QueueError::NotImplemented("BucketedBlockingQueue::remaining_capacity"))
    }

    /// Snapshot iterator over every element, bucket by bucket.
    pub fn iter(&self) -> Iter<K, E>
    where
        E: Clone,
    {
        Iter::new(self.registry.snapshot())
    }

    pub fn to_vec(&self) -> Vec<E>
    where
        E: Clone,
    {
        self.iter().collect()
    }

    /// Empties every bucket. Buckets stay registered until they idle out.
    pub fn clear(&self) {
        for bucket in self.registry.snapshot() {
            bucket.clear();
        }
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.counters.snapshot()
    }
}

fn creation_failed(cause: BoxError) -> QueueError {
    tracing::warn!(error = %cause, "failed to create bucket");
    QueueError::illegal_state_caused_by("failed to create bucket", cause)
}

/// Keeps the registry in step with the cache.
fn removal_listener<K, E>(
    registry: Arc<Registry<K, E>>,
    counters: Arc<QueueCounters>,
) -> RemovalListener<K, BucketEntry<K, E>>
where
    K: Send + Sync + 'static,
    E: Send + 'static,
{
    Box::new(move |_key: &K, entry: &BucketEntry<K, E>, cause: RemovalCause| {
        entry.bucket.retire();
        registry.remove(entry.slot);
        match cause {
            RemovalCause::Expired => counters.record_bucket_expired(),
            RemovalCause::Explicit => counters.record_bucket_removed(),
        }
        tracing::debug!(
            slot = entry.slot.index(),
            ?cause,
            buckets = registry.len(),
            "removed bucket"
        );
    })
}

impl<K, E> fmt::Debug for BucketedBlockingQueue<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketedBlockingQueue")
            .field("buckets", &self.registry.len())
            .field("selector", &self.selector)
            .field("metrics", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;

    use crate::builder::BucketedQueueBuilder;

    #[derive(Debug, Clone)]
    enum Operation {
        Offer(u16),
        Poll,
        RemoveBucket(u16),
    }

    fn operation_strategy(keys: u16) -> impl Strategy<Value = Operation> {
        prop_oneof![
            4 => any::<u16>().prop_map(Operation::Offer),
            2 => Just(Operation::Poll),
            1 => (0..keys).prop_map(Operation::RemoveBucket),
        ]
    }

    proptest! {
        /// len() is the sum of bucket lengths and is_empty() agrees with it.
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_len_is_sum_of_buckets(
            keys in 1u16..8,
            ops in prop::collection::vec(operation_strategy(8), 0..200)
        ) {
            let queue = BucketedQueueBuilder::new(move |x: &u16| *x % keys).build();
            for op in ops {
                match op {
                    Operation::Offer(x) => { queue.offer(x).unwrap(); },
                    Operation::Poll => { queue.poll(); },
                    Operation::RemoveBucket(k) => { queue.remove_bucket(&k); },
                }
                let per_bucket: usize = queue
                    .keys()
                    .iter()
                    .filter_map(|k| queue.bucket_len(k))
                    .sum();
                prop_assert_eq!(queue.len(), per_bucket);
                prop_assert_eq!(queue.is_empty(), per_bucket == 0);
                prop_assert_eq!(queue.bucket_count(), queue.keys().len());
            }
        }

        /// Draining returns every element once, in insertion order per key.
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_drain_preserves_per_key_order(
            keys in 1u32..6,
            count in 0u32..150
        ) {
            let queue = BucketedQueueBuilder::new(move |x: &u32| *x % keys).build();
            for i in 0..count {
                queue.put(i).unwrap();
            }

            let drained: Vec<u32> = std::iter::from_fn(|| queue.poll()).collect();
            prop_assert_eq!(drained.len(), count as usize);
            for key in 0..keys {
                let seq: Vec<u32> = drained.iter().copied().filter(|x| x % keys == key).collect();
                prop_assert!(seq.windows(2).all(|w| w[0] < w[1]));
            }
            prop_assert!(queue.is_empty());
        }
    }
}
