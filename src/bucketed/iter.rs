use std::sync::Arc;

use crate::bucket::Bucket;

/// Iterator over a queue's elements, bucket by bucket in registry order.
///
/// The bucket list is captured when the iterator is created; each bucket's
/// contents are cloned when the iterator reaches it. Elements inserted or
/// removed concurrently may or may not be observed.
pub struct Iter<K, E> {
    buckets: std::vec::IntoIter<Arc<Bucket<K, E>>>,
    current: std::vec::IntoIter<E>,
}

impl<K, E: Clone> Iter<K, E> {
    pub(crate) fn new(buckets: Vec<Arc<Bucket<K, E>>>) -> Self {
        Self {
            buckets: buckets.into_iter(),
            current: Vec::new().into_iter(),
        }
    }
}

impl<K, E: Clone> Iterator for Iter<K, E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        loop {
            if let Some(element) = self.current.next() {
                return Some(element);
            }
            let bucket = self.buckets.next()?;
            self.current = bucket.to_vec().into_iter();
        }
    }
}
