use heatlink::failure_cache::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL, FailureCache};
use heatlink::planner::BlockKey;
use std::time::Duration;
use tokio::time::Instant;

fn key(start: u32, end: u32) -> BlockKey {
    BlockKey { start, end }
}

#[tokio::test(start_paused = true)]
async fn failed_block_expires_after_one_hour() {
    let mut cache = FailureCache::new(DEFAULT_TTL, DEFAULT_SWEEP_INTERVAL);
    let t0 = Instant::now();
    cache.record(key(1000, 1050), t0);

    assert!(cache.is_failed(key(1000, 1050), t0 + Duration::from_secs(3599)));
    assert!(!cache.is_failed(key(1000, 1050), t0 + Duration::from_secs(3600)));
    // Only the exact range is demoted
    assert!(!cache.is_failed(key(1000, 1040), t0));
}

#[tokio::test(start_paused = true)]
async fn sweep_is_rate_limited_and_drops_only_expired_entries() {
    let mut cache = FailureCache::new(Duration::from_secs(60), Duration::from_secs(30));
    let t0 = Instant::now();
    cache.record(key(0, 10), t0);
    cache.record(key(20, 30), t0 + Duration::from_secs(50));

    // First sweep runs; nothing has expired yet
    assert_eq!(cache.sweep(t0 + Duration::from_secs(55)), 0);
    // Within the sweep interval: skipped even though (0, 10) expired
    assert_eq!(cache.sweep(t0 + Duration::from_secs(70)), 0);
    assert_eq!(cache.len(), 2);

    assert_eq!(cache.sweep(t0 + Duration::from_secs(90)), 1);
    assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec![key(20, 30)]);
}

#[tokio::test(start_paused = true)]
async fn recording_again_refreshes_the_timestamp() {
    let mut cache = FailureCache::new(Duration::from_secs(60), Duration::from_secs(30));
    let t0 = Instant::now();
    cache.record(key(5, 8), t0);
    cache.record(key(5, 8), t0 + Duration::from_secs(40));
    assert_eq!(cache.failed_at(key(5, 8)), Some(t0 + Duration::from_secs(40)));
    assert!(cache.is_failed(key(5, 8), t0 + Duration::from_secs(90)));

    cache.clear();
    assert!(cache.is_empty());
}
