// ==============================================
// IDLE EVICTION TESTS (integration)
// ==============================================
//
// Buckets that stay empty and untouched past the idle timeout leave both
// the key cache and the selection registry. Time runs on a TestClock.

use std::sync::Arc;
use std::time::Duration;

use bucketkit::prelude::*;
use tracing_subscriber::EnvFilter;

const IDLE: Duration = Duration::from_secs(10);

/// Set `RUST_LOG=bucketkit=debug` to see bucket lifecycle events.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn queue_on(clock: &Arc<TestClock>) -> BucketedBlockingQueue<u32, u32> {
    init_tracing();
    BucketedQueueBuilder::new(|x: &u32| *x % 4)
        .clock(clock.clone())
        .idle_timeout(IDLE)
        .build()
}

#[test]
fn idle_bucket_leaves_registry() {
    let clock = Arc::new(TestClock::new(0));
    let queue = queue_on(&clock);

    queue.offer(1).unwrap();
    queue.offer(2).unwrap();
    assert!(queue.poll().is_some());
    assert!(queue.poll().is_some());
    assert_eq!(queue.bucket_count(), 2);

    clock.advance(IDLE + Duration::from_secs(1));
    assert_eq!(queue.cleanup(), 2);
    assert_eq!(queue.bucket_count(), 0);
    assert!(queue.keys().is_empty());
    assert_eq!(queue.metrics().buckets_expired, 2);
}

#[test]
fn producer_activity_sweeps_lazily() {
    let clock = Arc::new(TestClock::new(0));
    let queue = queue_on(&clock);

    queue.offer(1).unwrap();
    assert_eq!(queue.poll(), Some(1));

    clock.advance(IDLE * 2);
    // Offer under a different key; the due sweep drops key 1.
    queue.offer(2).unwrap();
    assert_eq!(queue.keys(), vec![2]);
    assert_eq!(queue.bucket_count(), 1);
}

#[test]
fn recreated_bucket_starts_with_fresh_sensor_state() {
    let clock = Arc::new(TestClock::new(0));
    let queue = BucketedQueueBuilder::new(|_: &u32| 0u8)
        .clock(clock.clone())
        .idle_timeout(IDLE)
        .rate_limited(2, Duration::from_secs(3600))
        .build();

    queue.offer(1).unwrap();
    queue.offer(2).unwrap();
    assert_eq!(queue.poll(), None, "throttled for the hour");

    // A backlogged bucket never idles out; drop it explicitly.
    assert!(queue.remove_bucket(&0));
    assert_eq!(queue.bucket_count(), 0);

    queue.offer(3).unwrap();
    assert_eq!(queue.poll(), Some(3), "new bucket has a new rate window");
    assert_eq!(queue.metrics().buckets_created, 2);
}

#[test]
fn backlogged_bucket_is_kept_past_idle_timeout() {
    let clock = Arc::new(TestClock::new(0));
    let queue = queue_on(&clock);

    queue.offer(5).unwrap();
    clock.advance(IDLE * 10);
    assert_eq!(queue.cleanup(), 0);
    assert_eq!(queue.bucket_len(&1), Some(1));
    assert_eq!(queue.poll(), Some(5));

    // Draining counts as access; the idle clock starts from the take.
    clock.advance(IDLE);
    assert_eq!(queue.cleanup(), 0);
    clock.advance(Duration::from_nanos(1));
    assert_eq!(queue.cleanup(), 1);
}

#[test]
fn access_resets_idle_clock() {
    let clock = Arc::new(TestClock::new(0));
    let queue = queue_on(&clock);

    for _ in 0..5 {
        queue.offer(3).unwrap();
        assert_eq!(queue.poll(), Some(3));
        clock.advance(IDLE - Duration::from_secs(1));
        assert_eq!(queue.cleanup(), 0);
    }
    assert_eq!(queue.metrics().buckets_created, 1);
}

#[test]
fn remove_bucket_discards_elements() {
    let clock = Arc::new(TestClock::new(0));
    let queue = queue_on(&clock);
    queue.add_all([1, 5, 9, 2]).unwrap();

    assert!(queue.remove_bucket(&1));
    assert_eq!(queue.len(), 1);
    assert!(!queue.contains(&5));
    assert_eq!(queue.poll(), Some(2));

    let m = queue.metrics();
    assert_eq!(m.buckets_removed, 1);
    assert_eq!(m.live_buckets(), 1);
}
