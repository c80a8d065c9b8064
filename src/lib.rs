//! bucketkit: a key-partitioned blocking queue with per-bucket admission
//! sensors and fair round-robin consumption.
//!
//! Elements are routed by a key function into per-key buckets. Consumers
//! visit non-empty, permitted buckets in turn, so one hot key cannot starve
//! the rest; sensors such as [`RateLimited`](sensor::RateLimited) decide
//! when a bucket may give up its head. Idle buckets are dropped
//! automatically.
//!
//! ```
//! use bucketkit::prelude::*;
//!
//! let queue = BucketedQueueBuilder::new(|job: &(u8, u32)| job.0).build();
//! queue.offer((1, 10)).unwrap();
//! queue.offer((1, 11)).unwrap();
//! queue.offer((2, 20)).unwrap();
//!
//! // Key 2 is served before key 1's second job.
//! let served: Vec<_> = std::iter::from_fn(|| queue.poll()).collect();
//! assert_eq!(served, vec![(2, 20), (1, 10), (1, 11)]);
//! ```

pub mod bucket;
pub mod bucketed;
pub mod builder;
pub mod ds;
pub mod error;
pub mod metrics;
pub mod prelude;
pub mod queue;
pub mod sensor;
pub mod store;
pub mod time;
