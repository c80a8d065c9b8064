//! A single key's queue and its admission sensor.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────┐
//!   │ Bucket<K, E>                                              │
//!   │                                                           │
//!   │   key ─────────── identity of the partition               │
//!   │   sensor ──────── Box<dyn BucketSensor>                   │
//!   │   store ───────── Box<dyn BlockingQueue<E>>               │
//!   │   last_access ─── AtomicU64 (clock nanos)                 │
//!   │                                                           │
//!   │   insert:  sensor.can_offer*() ─▶ sensor.on_offer(n)      │
//!   │                                 ─▶ store insert           │
//!   │   remove:  sensor.on_take() ───▶ store remove             │
//!   └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operation Semantics
//!
//! | Operation        | Sensor denies           | Sensor permits                     |
//! |------------------|-------------------------|------------------------------------|
//! | `offer`          | `false`, store untouched| store result                       |
//! | `add`            | `IllegalState`          | `IllegalState` if the store is full|
//! | `add_all`        | `Ok(false)`             | `on_offer(n)` once, then each add  |
//! | `put`            | `Ok(false)` immediately | may block on capacity              |
//! | `offer_timeout`  | `Ok(false)` immediately | may block up to the timeout        |
//! | `poll`/`remove`  | n/a (`on_take` always)  | store result                       |
//! | `drain_to`       | `NotImplemented`        | `NotImplemented`                   |
//!
//! Removals notify `on_take` before delegating, whether or not an element is
//! actually present. Sensors therefore see attempted takes, not successful
//! ones.
//!
//! A bucket dropped from its queue is *retired*: every insert is refused as
//! if the sensor had denied it, and its store is closed so an insert already
//! past that check is refused under the store's own lock.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{BoxError, QueueError};
use crate::queue::BlockingQueue;
use crate::sensor::{BucketSensor, SensorFactory};
use crate::store::expiring::Expirable;

pub struct Bucket<K, E> {
    key: K,
    store: Box<dyn BlockingQueue<E>>,
    sensor: Box<dyn BucketSensor>,
    last_access: AtomicU64,
    pins: AtomicUsize,
    retired: AtomicBool,
}

impl<K, E> Bucket<K, E> {
    /// Builds a bucket, asking `sensors` for the sensor bound to `key`.
    pub fn new(
        key: K,
        store: Box<dyn BlockingQueue<E>>,
        sensors: &dyn SensorFactory<K, E>,
    ) -> Result<Self, BoxError> {
        let sensor = sensors.create(&key, store.as_ref())?;
        Ok(Self::from_parts(key, store, sensor))
    }

    pub fn from_parts(
        key: K,
        store: Box<dyn BlockingQueue<E>>,
        sensor: Box<dyn BucketSensor>,
    ) -> Self {
        Self {
            key,
            store,
            sensor,
            last_access: AtomicU64::new(0),
            pins: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn sensor(&self) -> &dyn BucketSensor {
        self.sensor.as_ref()
    }

    // -- inserts ----------------------------------------------------------

    #[inline]
    fn admits(&self) -> bool {
        !self.is_retired() && self.sensor.can_offer()
    }

    #[inline]
    fn admits_wait(&self, timeout: Option<Duration>) -> bool {
        !self.is_retired() && self.sensor.can_offer_wait(timeout)
    }

    pub fn offer(&self, element: E) -> bool {
        if !self.admits() {
            return false;
        }
        self.sensor.on_offer(1);
        self.store.offer(element)
    }

    /// Strict insert: either stores the element or fails.
    pub fn add(&self, element: E) -> Result<(), QueueError> {
        if self.is_retired() {
            return Err(QueueError::illegal_state("bucket has been removed"));
        }
        if !self.sensor.can_offer() {
            return Err(QueueError::illegal_state("bucket sensor has blocked the add"));
        }
        self.sensor.on_offer(1);
        self.store_strict(element)
    }

    #[inline]
    fn store_strict(&self, element: E) -> Result<(), QueueError> {
        if self.store.offer(element) {
            Ok(())
        } else if self.is_retired() {
            Err(QueueError::illegal_state("bucket has been removed"))
        } else {
            Err(QueueError::illegal_state("bucket is full"))
        }
    }

    /// Inserts a batch after a single admission check.
    ///
    /// Returns `Ok(false)` if the sensor denied the batch or it was empty.
    pub fn add_all(&self, elements: impl IntoIterator<Item = E>) -> Result<bool, QueueError> {
        if !self.admits() {
            return Ok(false);
        }
        let elements: Vec<E> = elements.into_iter().collect();
        if elements.is_empty() {
            return Ok(false);
        }
        self.sensor.on_offer(elements.len() as u64);
        for element in elements {
            self.store_strict(element)?;
        }
        Ok(true)
    }

    pub fn offer_timeout(&self, element: E, timeout: Duration) -> Result<bool, QueueError> {
        if !self.admits_wait(Some(timeout)) {
            return Ok(false);
        }
        self.sensor.on_offer(1);
        self.store.offer_timeout(element, timeout)
    }

    /// Blocking insert. `Ok(false)` means the sensor refused it.
    pub fn put(&self, element: E) -> Result<bool, QueueError> {
        if !self.admits_wait(None) {
            return Ok(false);
        }
        self.sensor.on_offer(1);
        self.store.put(element)?;
        Ok(true)
    }

    // -- removals ---------------------------------------------------------

    pub fn poll(&self) -> Option<E> {
        self.sensor.on_take();
        self.store.poll()
    }

    pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<E>, QueueError> {
        self.sensor.on_take();
        self.store.poll_timeout(timeout)
    }

    pub fn remove(&self) -> Result<E, QueueError> {
        self.poll().ok_or(QueueError::NoSuchElement)
    }

    /// Removes the first element matching `pred`.
    pub fn remove_where(&self, mut pred: impl FnMut(&E) -> bool) -> Option<E> {
        self.sensor.on_take();
        self.store.remove_first(&mut pred)
    }

    pub fn drain_to(&self, _sink: &mut Vec<E>) -> Result<usize, QueueError> {
        Err(QueueError::NotImplemented("Bucket::drain_to"))
    }

    // -- inspection -------------------------------------------------------

    pub fn can_take(&self) -> bool {
        self.sensor.can_take()
    }

    pub fn can_offer(&self) -> bool {
        self.sensor.can_offer()
    }

    /// Non-empty and currently permitted to give up its head.
    pub fn is_eligible(&self) -> bool {
        self.sensor.can_take() && !self.store.is_empty()
    }

    pub fn peek(&self) -> Option<E>
    where
        E: Clone,
    {
        let mut head = None;
        self.store.peek_with(&mut |e| head = Some(e.clone()));
        head
    }

    pub fn element(&self) -> Result<E, QueueError>
    where
        E: Clone,
    {
        self.peek().ok_or(QueueError::NoSuchElement)
    }

    pub fn contains(&self, element: &E) -> bool
    where
        E: PartialEq,
    {
        let mut found = false;
        self.store.for_each(&mut |e| found |= e == element);
        found
    }

    pub fn for_each(&self, mut f: impl FnMut(&E)) {
        self.store.for_each(&mut f);
    }

    pub fn to_vec(&self) -> Vec<E>
    where
        E: Clone,
    {
        let mut out = Vec::with_capacity(self.store.len());
        self.store.for_each(&mut |e| out.push(e.clone()));
        out
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.store.capacity()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Wakes threads blocked in this bucket's store.
    pub fn interrupt(&self) {
        self.store.interrupt();
    }

    /// Whether the bucket has left its queue and refuses inserts.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Refuses every later insert and releases blocked producers. Elements
    /// already stored can still be removed.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.store.close();
    }
}

impl<K, E> Expirable for Bucket<K, E> {
    fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Acquire)
    }

    fn touch(&self, now: u64) {
        self.last_access.fetch_max(now, Ordering::AcqRel);
    }

    /// Buckets holding elements, or with an insert in flight, are never
    /// dropped for idleness.
    fn can_expire(&self) -> bool {
        self.pins.load(Ordering::Acquire) == 0 && self.store.is_empty()
    }
}

/// Keeps a bucket from expiring while an insert into it is in flight.
///
/// Taken under the owning cache's lock, so an idle sweep either runs before
/// the pin (and the lookup recreates the bucket) or sees it.
pub(crate) struct BucketPin<K, E> {
    bucket: Arc<Bucket<K, E>>,
}

impl<K, E> BucketPin<K, E> {
    pub(crate) fn new(bucket: &Arc<Bucket<K, E>>) -> Self {
        bucket.pins.fetch_add(1, Ordering::AcqRel);
        Self {
            bucket: Arc::clone(bucket),
        }
    }
}

impl<K, E> Deref for BucketPin<K, E> {
    type Target = Bucket<K, E>;

    fn deref(&self) -> &Self::Target {
        &self.bucket
    }
}

impl<K, E> Drop for BucketPin<K, E> {
    fn drop(&mut self) {
        self.bucket.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<K: fmt::Debug, E> fmt::Debug for Bucket<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("key", &self.key)
            .field("len", &self.store.len())
            .field("sensor", &self.sensor)
            .finish()
    }
}
