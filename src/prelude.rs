pub use crate::bucket::Bucket;
pub use crate::bucketed::BucketedBlockingQueue;
pub use crate::builder::BucketedQueueBuilder;
pub use crate::error::{BoxError, ConfigError, QueueError};
pub use crate::metrics::QueueMetricsSnapshot;
pub use crate::queue::{BlockingDeque, BlockingQueue, DequeFactory, Order, QueueFactory};
pub use crate::sensor::{
    BucketSensor, NullSensor, NullSensorFactory, RateLimited, RateLimitedFactory, SensorFactory,
};
pub use crate::time::{Clock, RateGauge, SystemClock, TestClock, TimeTicker};
