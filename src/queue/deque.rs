//! Mutex/condvar blocking deque.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │ BlockingDeque<E>                             │
//!   │                                              │
//!   │  state: Mutex<{ items: VecDeque<E>,          │
//!   │                 interrupts: u64 }>           │
//!   │  not_empty: Condvar   (takers wait here)     │
//!   │  not_full:  Condvar   (putters wait here)    │
//!   │                                              │
//!   │  insert ──▶ push_back                        │
//!   │  remove ◀── pop_front (Fifo) / pop_back (Lifo)│
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! A waiter snapshots `interrupts` before blocking; if the counter moved when
//! it wakes, the wait ends with [`QueueError::Interrupted`]. A closed deque
//! refuses inserts under the same lock: `offer` and `offer_timeout` report
//! `false`, `put` fails with [`QueueError::Interrupted`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{BoxError, ConfigError, QueueError};
use crate::queue::{BlockingQueue, QueueFactory};

/// Removal order of a [`BlockingDeque`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Oldest element first.
    #[default]
    Fifo,
    /// Newest element first.
    Lifo,
}

#[derive(Debug)]
struct DequeState<E> {
    items: VecDeque<E>,
    interrupts: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct BlockingDeque<E> {
    state: Mutex<DequeState<E>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
    order: Order,
}

impl<E> BlockingDeque<E> {
    pub fn unbounded() -> Self {
        Self::with_order(None, Order::Fifo)
    }

    /// Bounded FIFO deque.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Use [`try_bounded`](Self::try_bounded)
    /// for a non-panicking alternative.
    pub fn bounded(capacity: usize) -> Self {
        match Self::try_bounded(capacity) {
            Ok(deque) => deque,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn try_bounded(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new("bucket capacity must be > 0"));
        }
        Ok(Self::with_order(Some(capacity), Order::Fifo))
    }

    pub fn with_order(capacity: Option<usize>, order: Order) -> Self {
        Self {
            state: Mutex::new(DequeState {
                items: VecDeque::new(),
                interrupts: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            order,
        }
    }

    pub fn order(&self) -> Order {
        self.order
    }

    #[inline]
    fn is_full(&self, state: &DequeState<E>) -> bool {
        self.capacity.is_some_and(|cap| state.items.len() >= cap)
    }

    #[inline]
    fn pop(&self, state: &mut DequeState<E>) -> Option<E> {
        match self.order {
            Order::Fifo => state.items.pop_front(),
            Order::Lifo => state.items.pop_back(),
        }
    }

    #[inline]
    fn head<'a>(&self, state: &'a DequeState<E>) -> Option<&'a E> {
        match self.order {
            Order::Fifo => state.items.front(),
            Order::Lifo => state.items.back(),
        }
    }

    /// Bumps the interrupt counter, optionally closing, and wakes everyone.
    fn wake_all(&self, close: bool) {
        let mut state = self.state.lock();
        state.interrupts = state.interrupts.wrapping_add(1);
        state.closed |= close;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn push_and_signal(&self, mut state: MutexGuard<'_, DequeState<E>>, element: E) {
        state.items.push_back(element);
        drop(state);
        self.not_empty.notify_one();
    }

    fn pop_and_signal(&self, mut state: MutexGuard<'_, DequeState<E>>) -> Option<E> {
        let element = self.pop(&mut state);
        drop(state);
        if element.is_some() {
            self.not_full.notify_one();
        }
        element
    }

    /// Position of the `n`-th element in removal order.
    #[inline]
    fn position(&self, len: usize, n: usize) -> usize {
        match self.order {
            Order::Fifo => n,
            Order::Lifo => len - 1 - n,
        }
    }
}

/// Waits until `deadline`, or without limit when the deadline does not fit in
/// an `Instant`. Returns whether the wait timed out.
fn wait_deadline<T>(
    cv: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    deadline: Option<Instant>,
) -> bool {
    match deadline {
        Some(deadline) => cv.wait_until(guard, deadline).timed_out(),
        None => {
            cv.wait(guard);
            false
        },
    }
}

impl<E> Default for BlockingDeque<E> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<E: Send> BlockingQueue<E> for BlockingDeque<E> {
    fn offer(&self, element: E) -> bool {
        let state = self.state.lock();
        if state.closed || self.is_full(&state) {
            return false;
        }
        self.push_and_signal(state, element);
        true
    }

    fn offer_timeout(&self, element: E, timeout: Duration) -> Result<bool, QueueError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        if state.closed {
            return Ok(false);
        }
        let seen = state.interrupts;
        while self.is_full(&state) {
            let timed_out = wait_deadline(&self.not_full, &mut state, deadline);
            if state.interrupts != seen {
                return Err(QueueError::Interrupted);
            }
            if timed_out && self.is_full(&state) {
                return Ok(false);
            }
        }
        self.push_and_signal(state, element);
        Ok(true)
    }

    fn put(&self, element: E) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Interrupted);
        }
        let seen = state.interrupts;
        while self.is_full(&state) {
            self.not_full.wait(&mut state);
            if state.interrupts != seen {
                return Err(QueueError::Interrupted);
            }
        }
        self.push_and_signal(state, element);
        Ok(())
    }

    fn poll(&self) -> Option<E> {
        let state = self.state.lock();
        self.pop_and_signal(state)
    }

    fn poll_timeout(&self, timeout: Duration) -> Result<Option<E>, QueueError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        let seen = state.interrupts;
        while state.items.is_empty() {
            let timed_out = wait_deadline(&self.not_empty, &mut state, deadline);
            if state.interrupts != seen {
                return Err(QueueError::Interrupted);
            }
            if timed_out && state.items.is_empty() {
                return Ok(None);
            }
        }
        Ok(self.pop_and_signal(state))
    }

    fn take(&self) -> Result<E, QueueError> {
        let mut state = self.state.lock();
        let seen = state.interrupts;
        while state.items.is_empty() {
            self.not_empty.wait(&mut state);
            if state.interrupts != seen {
                return Err(QueueError::Interrupted);
            }
        }
        self.pop_and_signal(state).ok_or(QueueError::NoSuchElement)
    }

    fn peek_with(&self, f: &mut dyn FnMut(&E)) -> bool {
        let state = self.state.lock();
        match self.head(&state) {
            Some(head) => {
                f(head);
                true
            },
            None => false,
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(&E)) {
        let state = self.state.lock();
        let len = state.items.len();
        for n in 0..len {
            f(&state.items[self.position(len, n)]);
        }
    }

    fn remove_first(&self, pred: &mut dyn FnMut(&E) -> bool) -> Option<E> {
        let mut state = self.state.lock();
        let len = state.items.len();
        let idx = (0..len)
            .map(|n| self.position(len, n))
            .find(|&idx| pred(&state.items[idx]))?;
        let removed = state.items.remove(idx);
        drop(state);
        self.not_full.notify_one();
        removed
    }

    fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        drop(state);
        self.not_full.notify_all();
    }

    fn interrupt(&self) {
        self.wake_all(false);
    }

    fn close(&self) {
        self.wake_all(true);
    }
}

/// [`QueueFactory`] producing [`BlockingDeque`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DequeFactory {
    capacity: Option<usize>,
    order: Order,
}

impl DequeFactory {
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            order: Order::Fifo,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            order: Order::Fifo,
        }
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl<E: Send + 'static> QueueFactory<E> for DequeFactory {
    fn create(&self) -> Result<Box<dyn BlockingQueue<E>>, BoxError> {
        if self.capacity == Some(0) {
            return Err(Box::new(ConfigError::new("bucket capacity must be > 0")));
        }
        Ok(Box::new(BlockingDeque::with_order(self.capacity, self.order)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn fifo_removes_oldest_first() {
        let q = BlockingDeque::unbounded();
        for i in 1..=3 {
            assert!(q.offer(i));
        }
        assert_eq!(q.poll(), Some(1));
        assert_eq!(q.poll(), Some(2));
        assert_eq!(q.poll(), Some(3));
        assert_eq!(q.poll(), None);
    }

    #[test]
    fn lifo_removes_newest_first() {
        let q = BlockingDeque::with_order(None, Order::Lifo);
        for i in 1..=3 {
            assert!(q.offer(i));
        }
        let mut seen = Vec::new();
        q.for_each(&mut |e| seen.push(*e));
        assert_eq!(seen, vec![3, 2, 1]);

        assert_eq!(q.poll(), Some(3));
        assert_eq!(q.poll(), Some(2));
    }

    #[test]
    fn bounded_offer_rejects_when_full() {
        let q = BlockingDeque::bounded(1);
        assert!(q.offer("a"));
        assert!(!q.offer("b"));
        assert_eq!(q.len(), 1);
        assert_eq!(q.capacity(), Some(1));
    }

    #[test]
    fn try_bounded_rejects_zero() {
        assert!(BlockingDeque::<u8>::try_bounded(0).is_err());
    }

    #[test]
    fn offer_timeout_gives_up_when_full() {
        let q = BlockingDeque::bounded(1);
        q.offer(1);
        assert!(!q.offer_timeout(2, Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn poll_timeout_returns_none_when_empty() {
        let q = BlockingDeque::<u32>::unbounded();
        assert_eq!(q.poll_timeout(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn unrepresentable_timeout_waits_without_limit() {
        let q = Arc::new(BlockingDeque::bounded(1));
        assert!(q.offer_timeout(1, Duration::MAX).unwrap());

        let putter = {
            let q = q.clone();
            thread::spawn(move || q.offer_timeout(2, Duration::MAX))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.poll_timeout(Duration::MAX).unwrap(), Some(1));
        assert!(putter.join().unwrap().unwrap());
        assert_eq!(q.poll_timeout(Duration::MAX).unwrap(), Some(2));

        let taker = {
            let q = q.clone();
            thread::spawn(move || q.poll_timeout(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(q.offer(3));
        assert_eq!(taker.join().unwrap().unwrap(), Some(3));
    }

    #[test]
    fn take_waits_for_producer() {
        let q = Arc::new(BlockingDeque::unbounded());
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.offer(7)
            })
        };
        assert_eq!(q.take().unwrap(), 7);
        assert!(producer.join().unwrap());
    }

    #[test]
    fn put_waits_for_space() {
        let q = Arc::new(BlockingDeque::bounded(1));
        q.offer(1);
        let putter = {
            let q = q.clone();
            thread::spawn(move || q.put(2))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.poll(), Some(1));
        putter.join().unwrap().unwrap();
        assert_eq!(q.poll(), Some(2));
    }

    #[test]
    fn interrupt_wakes_blocked_taker() {
        let q = Arc::new(BlockingDeque::<u32>::unbounded());
        let taker = {
            let q = q.clone();
            thread::spawn(move || q.take())
        };
        thread::sleep(Duration::from_millis(20));
        q.interrupt();
        let result = taker.join().unwrap();
        assert!(matches!(result, Err(QueueError::Interrupted)));
    }

    #[test]
    fn closed_deque_refuses_inserts_but_drains() {
        let q = Arc::new(BlockingDeque::bounded(1));
        q.offer(1);
        let putter = {
            let q = q.clone();
            thread::spawn(move || q.put(2))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(matches!(putter.join().unwrap(), Err(QueueError::Interrupted)));

        assert_eq!(q.poll(), Some(1));
        assert!(!q.offer(3));
        assert!(!q.offer_timeout(4, Duration::from_millis(1)).unwrap());
        assert!(matches!(q.put(5), Err(QueueError::Interrupted)));
        assert!(q.is_empty());
    }

    #[test]
    fn remove_first_respects_order() {
        let q = BlockingDeque::unbounded();
        for i in [1, 2, 1, 3] {
            q.offer(i);
        }
        assert_eq!(q.remove_first(&mut |e| *e == 1), Some(1));
        let mut seen = Vec::new();
        q.for_each(&mut |e| seen.push(*e));
        assert_eq!(seen, vec![2, 1, 3]);
        assert_eq!(q.remove_first(&mut |e| *e == 9), None);
    }

    #[test]
    fn peek_does_not_remove() {
        let q = BlockingDeque::unbounded();
        assert!(!q.peek_with(&mut |_: &u8| {}));
        q.offer(4u8);
        let mut head = None;
        assert!(q.peek_with(&mut |e| head = Some(*e)));
        assert_eq!(head, Some(4));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn factory_creates_independent_stores() {
        let factory = DequeFactory::bounded(2);
        let a: Box<dyn BlockingQueue<u8>> = factory.create().unwrap();
        let b: Box<dyn BlockingQueue<u8>> = factory.create().unwrap();
        a.offer(1);
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
        assert_eq!(b.capacity(), Some(2));
    }

    #[test]
    fn zero_capacity_factory_fails() {
        let factory = DequeFactory::bounded(0);
        let created: Result<Box<dyn BlockingQueue<u8>>, _> = factory.create();
        assert!(created.is_err());
    }
}
