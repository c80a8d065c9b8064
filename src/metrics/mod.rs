mod counters;
pub mod snapshot;

pub(crate) use counters::QueueCounters;
pub use snapshot::QueueMetricsSnapshot;
