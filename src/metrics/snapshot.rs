/// Point-in-time copy of a queue's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    /// Elements accepted by a bucket.
    pub offers: u64,
    /// Inserts refused by a sensor or a full bucket.
    pub rejected_offers: u64,
    /// Elements handed to consumers.
    pub takes: u64,

    pub buckets_created: u64,
    /// Buckets dropped after idling.
    pub buckets_expired: u64,
    /// Buckets dropped through `remove_bucket`.
    pub buckets_removed: u64,
}

impl QueueMetricsSnapshot {
    /// Buckets created and not yet expired or removed.
    pub fn live_buckets(&self) -> u64 {
        self.buckets_created
            .saturating_sub(self.buckets_expired)
            .saturating_sub(self.buckets_removed)
    }
}
