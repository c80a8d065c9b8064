use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::snapshot::QueueMetricsSnapshot;

/// Relaxed atomic counters shared by producers, consumers and the eviction
/// listener.
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    offers: AtomicU64,
    rejected_offers: AtomicU64,
    takes: AtomicU64,
    buckets_created: AtomicU64,
    buckets_expired: AtomicU64,
    buckets_removed: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            offers: self.offers.load(Ordering::Relaxed),
            rejected_offers: self.rejected_offers.load(Ordering::Relaxed),
            takes: self.takes.load(Ordering::Relaxed),
            buckets_created: self.buckets_created.load(Ordering::Relaxed),
            buckets_expired: self.buckets_expired.load(Ordering::Relaxed),
            buckets_removed: self.buckets_removed.load(Ordering::Relaxed),
        }
    }

    /// Records the outcome of one insert attempt.
    pub(crate) fn record_offer(&self, accepted: bool) {
        if accepted {
            self.offers.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected_offers.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_take(&self) {
        self.takes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bucket_created(&self) {
        self.buckets_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bucket_expired(&self) {
        self.buckets_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bucket_removed(&self) {
        self.buckets_removed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let counters = QueueCounters::default();
        counters.record_offer(true);
        counters.record_offer(false);
        counters.record_take();
        counters.record_bucket_created();
        counters.record_bucket_expired();
        counters.record_bucket_removed();

        let snap = counters.snapshot();
        assert_eq!(snap.offers, 1);
        assert_eq!(snap.rejected_offers, 1);
        assert_eq!(snap.takes, 1);
        assert_eq!(snap.buckets_created, 1);
        assert_eq!(snap.buckets_expired, 1);
        assert_eq!(snap.buckets_removed, 1);
        assert_eq!(snap.live_buckets(), 0);
    }
}
