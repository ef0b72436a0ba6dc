mod common;

use common::{MockAdapter, device};
use heatlink::connection::{BackoffPolicy, ConnectionManager, ConnectionState};
use std::time::Duration;

fn policy() -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_secs(1),
        max: Duration::from_secs(60),
        multiplier: 2.0,
    }
}

#[test]
fn delays_grow_monotonically_up_to_the_cap() {
    let policy = policy();
    let mut delay = policy.base;
    let mut seen = vec![delay];
    for _ in 0..10 {
        let next = policy.next_delay(delay);
        assert!(next >= delay);
        assert!(next <= policy.max);
        delay = next;
        seen.push(delay);
    }
    assert_eq!(&seen[..4], &[1, 2, 4, 8].map(Duration::from_secs));
    assert_eq!(*seen.last().unwrap(), Duration::from_secs(60));
}

#[test]
fn multiplier_below_one_never_shrinks_the_delay() {
    let policy = BackoffPolicy {
        multiplier: 0.5,
        ..policy()
    };
    assert_eq!(policy.next_delay(Duration::from_secs(4)), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn outage_backs_off_and_success_resets() {
    let dev = device();
    dev.lock().unwrap().reachable = false;
    let mut mgr = ConnectionManager::new(Box::new(MockAdapter::new(dev.clone())), policy());

    let mut expected = Duration::from_secs(1);
    for attempt in 1..=7u32 {
        assert!(!mgr.ensure_connection().await);
        expected = (expected * 2).min(Duration::from_secs(60));
        assert_eq!(mgr.current_delay(), expected);
        assert_eq!(mgr.consecutive_failures(), attempt);
        tokio::time::advance(mgr.current_delay()).await;
    }
    assert_eq!(mgr.current_delay(), Duration::from_secs(60));
    assert_eq!(dev.lock().unwrap().connects, 7);

    dev.lock().unwrap().reachable = true;
    assert!(mgr.ensure_connection().await);
    assert_eq!(mgr.current_delay(), Duration::from_secs(1));
    assert_eq!(mgr.consecutive_failures(), 0);
    assert_eq!(mgr.state(), ConnectionState::Connected);
    assert!(mgr.health().stats.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn no_attempt_inside_the_backoff_window() {
    let dev = device();
    dev.lock().unwrap().reachable = false;
    let mut mgr = ConnectionManager::new(Box::new(MockAdapter::new(dev.clone())), policy());

    assert!(!mgr.ensure_connection().await);
    tokio::time::advance(Duration::from_millis(1500)).await;
    assert!(!mgr.ensure_connection().await);
    assert_eq!(dev.lock().unwrap().connects, 1);

    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(!mgr.ensure_connection().await);
    assert_eq!(dev.lock().unwrap().connects, 2);
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_loss_is_counted() {
    let dev = device();
    let mut mgr = ConnectionManager::new(Box::new(MockAdapter::new(dev.clone())), policy());
    mgr.connect().await.unwrap();

    mgr.adapter().close().await;
    assert!(!mgr.is_connected());
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(mgr.ensure_connection().await);

    let health = mgr.health();
    assert_eq!(health.stats.total_connects, 1);
    assert_eq!(health.stats.total_disconnects, 1);
    assert_eq!(health.stats.total_reconnects, 1);
    assert_eq!(health.endpoint, "mock:502");
    assert_eq!(health.state, "connected");

    let json = serde_json::to_value(&health).unwrap();
    assert_eq!(json["total_reconnects"], 1);
    assert_eq!(json["is_connected"], true);
}
