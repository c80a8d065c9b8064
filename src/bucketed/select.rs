//! Round-robin bucket selection.
//!
//! ## Algorithm
//!
//! ```text
//! select(wait):
//!   iterations = 0
//!   loop:
//!     span = registry.span()                 // slot positions, vacant included
//!     if span > 0:
//!       idx = tick(span); iterations += 1
//!       bucket = registry[idx]               // vacant slot -> ineligible
//!       if bucket.is_eligible(): return bucket
//!       throttled |= !bucket.is_empty()
//!       if iterations < span: continue
//!     // full sweep found nothing
//!     wait == Never     -> return None
//!     wait == Forever   -> block on `available`
//!     wait == Until(t)  -> block until t, None once t has passed
//!     iterations = 0
//! ```
//!
//! `tick` increments a shared `i32` cursor and takes `|cursor| % span`. The
//! counter wraps from `i32::MAX` to `i32::MIN`; around the wrap (and around
//! zero) the absolute value briefly runs backwards, which costs at most one
//! out-of-turn visit every 2^31 selections.
//!
//! The consumer lock (`lock`) guards the scan-and-remove sequence and is the
//! same mutex producers take before signalling `available`, so a signal can
//! never fall between a consumer's last sweep and its wait.
//!
//! A rate window rolling over produces no signal, so a consumer that saw
//! throttled (non-empty, `can_take() == false`) buckets waits at most
//! `recheck` before sweeping again.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::bucket::Bucket;
use crate::ds::ConcurrentSlotArena;
use crate::error::QueueError;

/// What to do once a full sweep finds no eligible bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    Never,
    Forever,
    Until(Instant),
}

/// State guarded by the consumer lock.
#[derive(Debug, Default)]
pub(crate) struct ConsumerState {
    interrupts: u64,
}

#[derive(Debug)]
pub(crate) struct Selector {
    cursor: AtomicI32,
    lock: Mutex<ConsumerState>,
    available: Condvar,
    recheck: Duration,
}

pub(crate) type Registry<K, E> = ConcurrentSlotArena<Arc<Bucket<K, E>>>;

impl Selector {
    pub(crate) fn new(recheck: Duration) -> Self {
        Self {
            cursor: AtomicI32::new(0),
            lock: Mutex::new(ConsumerState::default()),
            available: Condvar::new(),
            recheck,
        }
    }

    /// Acquires the consumer lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ConsumerState> {
        self.lock.lock()
    }

    /// Next round-robin position in `[0, span)`. `span` must be non-zero.
    #[inline]
    pub(crate) fn tick(&self, span: usize) -> usize {
        let t = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        t.unsigned_abs() as usize % span
    }

    /// Wakes one waiting consumer after an insert.
    pub(crate) fn signal(&self) {
        let _guard = self.lock.lock();
        self.available.notify_one();
    }

    /// Fails every wait in progress with [`QueueError::Interrupted`].
    pub(crate) fn interrupt(&self) {
        let mut state = self.lock.lock();
        state.interrupts = state.interrupts.wrapping_add(1);
        drop(state);
        self.available.notify_all();
    }

    /// Finds the next eligible bucket. Must be called with the consumer lock
    /// held through `guard`; the lock is released only while waiting.
    pub(crate) fn select<K, E>(
        &self,
        guard: &mut MutexGuard<'_, ConsumerState>,
        registry: &Registry<K, E>,
        wait: Wait,
    ) -> Result<Option<Arc<Bucket<K, E>>>, QueueError> {
        let seen = guard.interrupts;
        let mut iterations = 0usize;
        let mut throttled = false;

        loop {
            let span = registry.span();
            if span > 0 {
                let idx = self.tick(span);
                iterations += 1;
                if let Some(bucket) = registry.get_at_with(idx, Arc::clone) {
                    if bucket.is_eligible() {
                        return Ok(Some(bucket));
                    }
                    throttled |= !bucket.is_empty();
                }
                if iterations < span {
                    continue;
                }
            }

            let pause = match wait {
                Wait::Never => {
                    tracing::trace!(
                        buckets = registry.len(),
                        throttled,
                        "exhausted all buckets, none are ready or have elements"
                    );
                    return Ok(None);
                },
                Wait::Forever => throttled.then_some(self.recheck),
                Wait::Until(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    let left = deadline - now;
                    Some(if throttled { left.min(self.recheck) } else { left })
                },
            };

            match pause {
                Some(pause) => {
                    self.available.wait_for(guard, pause);
                },
                None => self.available.wait(guard),
            }
            if guard.interrupts != seen {
                return Err(QueueError::Interrupted);
            }
            iterations = 0;
            throttled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::queue::BlockingDeque;
    use crate::sensor::{NullSensor, RateLimited};
    use crate::time::TestClock;

    fn registry_with(keys: &[u8]) -> Registry<u8, u8> {
        let registry = ConcurrentSlotArena::new();
        for &k in keys {
            registry.insert(Arc::new(Bucket::from_parts(
                k,
                Box::new(BlockingDeque::unbounded()),
                Box::new(NullSensor),
            )));
        }
        registry
    }

    #[test]
    fn tick_cycles_through_span() {
        let selector = Selector::new(Duration::from_millis(1));
        let seen: Vec<_> = (0..6).map(|_| selector.tick(3)).collect();
        assert_eq!(seen, vec![1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn tick_survives_counter_wrap() {
        let selector = Selector::new(Duration::from_millis(1));
        selector.cursor.store(i32::MAX - 1, Ordering::Relaxed);
        for _ in 0..4 {
            assert!(selector.tick(7) < 7);
        }
    }

    #[test]
    fn empty_registry_gives_up_without_waiting() {
        let selector = Selector::new(Duration::from_millis(1));
        let registry = registry_with(&[]);
        let mut guard = selector.lock();
        let picked = selector.select(&mut guard, &registry, Wait::Never).unwrap();
        assert!(picked.is_none());
    }

    #[test]
    fn empty_buckets_are_skipped() {
        let selector = Selector::new(Duration::from_millis(1));
        let registry = registry_with(&[1, 2, 3]);
        registry.get_at_with(2, |b| b.offer(30));

        let mut guard = selector.lock();
        for _ in 0..3 {
            let picked = selector
                .select(&mut guard, &registry, Wait::Never)
                .unwrap()
                .expect("bucket 3 holds an element");
            assert_eq!(*picked.key(), 3);
        }
    }

    #[test]
    fn throttled_bucket_is_rechecked_without_a_signal() {
        let clock = Arc::new(TestClock::new(0));
        let registry: Registry<u8, u8> = ConcurrentSlotArena::new();
        registry.insert(Arc::new(Bucket::from_parts(
            1,
            Box::new(BlockingDeque::unbounded()),
            Box::new(RateLimited::with_clock(1, Duration::from_secs(1), clock.clone())),
        )));
        registry.get_at_with(0, |b| b.offer(10));

        let selector = Selector::new(Duration::from_millis(2));
        let mut guard = selector.lock();
        let picked = selector.select(&mut guard, &registry, Wait::Never).unwrap();
        assert!(picked.is_none(), "bucket is over its rate");

        let roller = {
            let clock = clock.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                clock.advance(Duration::from_secs(1));
            })
        };
        let picked = selector.select(&mut guard, &registry, Wait::Forever).unwrap();
        assert_eq!(picked.map(|b| *b.key()), Some(1));
        roller.join().unwrap();
    }

    #[test]
    fn timed_wait_expires() {
        let selector = Selector::new(Duration::from_millis(1));
        let registry = registry_with(&[1]);
        let mut guard = selector.lock();
        let deadline = Instant::now() + Duration::from_millis(20);
        let picked = selector
            .select(&mut guard, &registry, Wait::Until(deadline))
            .unwrap();
        assert!(picked.is_none());
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn interrupt_ends_indefinite_wait() {
        let selector = Arc::new(Selector::new(Duration::from_millis(1)));
        let registry = Arc::new(registry_with(&[1]));

        let waiter = {
            let selector = selector.clone();
            let registry = registry.clone();
            thread::spawn(move || {
                let mut guard = selector.lock();
                selector
                    .select(&mut guard, &registry, Wait::Forever)
                    .map(|b| b.is_some())
            })
        };

        while !waiter.is_finished() {
            selector.interrupt();
            thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(
            waiter.join().unwrap(),
            Err(QueueError::Interrupted)
        ));
    }
}
