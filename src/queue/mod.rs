//! Backing stores for buckets.
//!
//! Every bucket delegates storage to its own [`BlockingQueue`], produced by a
//! [`QueueFactory`] when the bucket is created. The trait is object safe so
//! buckets hold a `Box<dyn BlockingQueue<E>>`; element access goes through
//! callbacks (`peek_with`, `for_each`, `remove_first`) rather than returning
//! references, which keeps the store's lock scoped to the call.
//!
//! ## Provided Stores
//!
//! | Type             | Order        | Bound              |
//! |------------------|--------------|--------------------|
//! | [`BlockingDeque`]| FIFO or LIFO | bounded/unbounded  |
//!
//! ## Example Usage
//!
//! ```
//! use bucketkit::queue::{BlockingDeque, BlockingQueue};
//!
//! let q = BlockingDeque::bounded(2);
//! assert!(q.offer(1));
//! assert!(q.offer(2));
//! assert!(!q.offer(3)); // full
//! assert_eq!(q.poll(), Some(1));
//! ```

pub mod deque;

use std::time::Duration;

pub use deque::{BlockingDeque, DequeFactory, Order};

use crate::error::{BoxError, QueueError};

/// Thread-safe blocking collection used as a bucket's storage.
///
/// Blocking methods return [`QueueError::Interrupted`] when
/// [`interrupt`](Self::interrupt) is called while they wait.
pub trait BlockingQueue<E>: Send + Sync {
    /// Inserts without blocking; `false` if the store is full.
    fn offer(&self, element: E) -> bool;

    /// Inserts, waiting up to `timeout` for space.
    fn offer_timeout(&self, element: E, timeout: Duration) -> Result<bool, QueueError>;

    /// Inserts, waiting as long as needed for space.
    fn put(&self, element: E) -> Result<(), QueueError>;

    /// Removes the head element without blocking.
    fn poll(&self) -> Option<E>;

    /// Removes the head element, waiting up to `timeout` for one to arrive.
    fn poll_timeout(&self, timeout: Duration) -> Result<Option<E>, QueueError>;

    /// Removes the head element, waiting as long as needed.
    fn take(&self) -> Result<E, QueueError>;

    /// Calls `f` with the head element, if any. Returns whether `f` ran.
    fn peek_with(&self, f: &mut dyn FnMut(&E)) -> bool;

    /// Visits elements in removal order.
    fn for_each(&self, f: &mut dyn FnMut(&E));

    /// Removes the first element (in removal order) matching `pred`.
    fn remove_first(&self, pred: &mut dyn FnMut(&E) -> bool) -> Option<E>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of elements, `None` if unbounded.
    fn capacity(&self) -> Option<usize>;

    fn clear(&self);

    /// Wakes every thread currently blocked in this store with
    /// [`QueueError::Interrupted`].
    fn interrupt(&self);

    /// Refuses every later insert and interrupts blocked threads. Removals
    /// keep working so whatever is left can still be drained.
    ///
    /// The default only interrupts; stores that can check a closed flag under
    /// their own lock should override it.
    fn close(&self) {
        self.interrupt();
    }
}

/// Supplies a fresh, independent store for each new bucket.
pub trait QueueFactory<E>: Send + Sync {
    fn create(&self) -> Result<Box<dyn BlockingQueue<E>>, BoxError>;
}

impl<E, F> QueueFactory<E> for F
where
    F: Fn() -> Result<Box<dyn BlockingQueue<E>>, BoxError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn BlockingQueue<E>>, BoxError> {
        self()
    }
}
