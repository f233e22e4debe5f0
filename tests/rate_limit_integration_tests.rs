//! Integration Tests for Rate Limiting
//!
//! Drives limiters through the manager the way command dispatch does, with
//! tokio's paused clock standing in for wall time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use botcore::ratelimit::{LimiterConfig, RateLimitManager};
use botcore::Error;

// == Helper Functions ==

async fn create_test_manager(max_requests: u32) -> RateLimitManager {
    let manager = RateLimitManager::new();
    manager
        .create_limiter(
            "commands",
            LimiterConfig::new(Duration::from_secs(1), max_requests).with_key_prefix("cmd_"),
        )
        .await;
    manager
}

// == Quota Tests ==

#[tokio::test(start_paused = true)]
async fn test_quota_then_block() {
    let manager = create_test_manager(3).await;

    for expected_remaining in [2, 1, 0] {
        let info = assert_ok!(manager.consume_limit("commands", "user-1", &Value::Null).await);
        assert!(info.allowed);
        assert_eq!(info.remaining, expected_remaining);
    }

    let err = assert_err!(manager.consume_limit("commands", "user-1", &Value::Null).await);
    assert!(err.is_rate_limited());
    match err {
        Error::RateLimitExceeded { key, info } => {
            assert_eq!(key, "cmd_user-1");
            assert_eq!(info.remaining, 0);
            assert_eq!(info.total_hits, 4);
            assert!(info.time_to_reset <= Duration::from_secs(1));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_identifiers_are_independent() {
    let manager = create_test_manager(1).await;

    assert_ok!(manager.consume_limit("commands", "alice", &Value::Null).await);
    assert_err!(manager.consume_limit("commands", "alice", &Value::Null).await);

    let info = assert_ok!(manager.check_limit("commands", "bob", &Value::Null).await);
    assert!(info.allowed);
}

#[tokio::test(start_paused = true)]
async fn test_quota_restored_after_window() {
    let manager = create_test_manager(2).await;

    for _ in 0..3 {
        manager.check_limit("commands", "user-1", &Value::Null).await.ok();
    }
    let blocked = assert_ok!(manager.check_limit("commands", "user-1", &Value::Null).await);
    assert!(!blocked.allowed);

    tokio::time::advance(Duration::from_millis(1001)).await;

    let info = assert_ok!(manager.check_limit("commands", "user-1", &Value::Null).await);
    assert!(info.allowed);
    assert_eq!(info.total_hits, 1);
}

// == Reset Tests ==

#[tokio::test(start_paused = true)]
async fn test_reset_single_identifier() {
    let manager = create_test_manager(1).await;
    manager.check_limit("commands", "alice", &Value::Null).await.ok();
    manager.check_limit("commands", "bob", &Value::Null).await.ok();

    assert!(manager.reset_limiter("commands", Some("alice")).await);
    assert!(!manager.reset_limiter("commands", Some("carol")).await);

    let alice = assert_ok!(manager.check_limit("commands", "alice", &Value::Null).await);
    let bob = assert_ok!(manager.check_limit("commands", "bob", &Value::Null).await);
    assert!(alice.allowed);
    assert!(!bob.allowed);
}

#[tokio::test(start_paused = true)]
async fn test_reset_whole_limiter() {
    let manager = create_test_manager(1).await;
    manager.check_limit("commands", "alice", &Value::Null).await.ok();
    manager.check_limit("commands", "bob", &Value::Null).await.ok();

    assert!(manager.reset_limiter("commands", None).await);
    assert!(!manager.reset_limiter("missing", None).await);

    let stats = manager.limiter_stats("commands").await.unwrap();
    assert_eq!(stats.total_clients, 0);
}

// == Failure Path ==

#[tokio::test(start_paused = true)]
async fn test_unknown_limiter_is_an_error() {
    let manager = create_test_manager(5).await;

    let err = assert_err!(manager.check_limit("uploads", "alice", &Value::Null).await);
    assert!(matches!(err, Error::LimiterNotFound(name) if name == "uploads"));

    // The lookup still counts as a request
    assert_eq!(manager.global_stats().total_requests, 1);
}

// == Custom Key and Callback ==

#[tokio::test(start_paused = true)]
async fn test_context_key_and_callback() {
    let manager = RateLimitManager::new();
    let notified = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notified);

    manager
        .create_limiter(
            "messages",
            LimiterConfig::new(Duration::from_secs(30), 1)
                .key_generator(|id, ctx| {
                    let guild = ctx.get("guild").and_then(Value::as_str).unwrap_or("dm");
                    format!("{guild}:{id}")
                })
                .on_limit_reached(move |key, window, _| {
                    assert_eq!(key, "g1:alice");
                    assert_eq!(window.count, 2);
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await;

    let in_g1 = json!({"guild": "g1"});
    let in_g2 = json!({"guild": "g2"});

    assert_ok!(manager.consume_limit("messages", "alice", &in_g1).await);
    assert_ok!(manager.consume_limit("messages", "alice", &in_g2).await);
    assert_err!(manager.consume_limit("messages", "alice", &in_g1).await);

    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

// == Stats Tests ==

#[tokio::test(start_paused = true)]
async fn test_stats_reflect_traffic() {
    let manager = create_test_manager(1).await;
    manager
        .create_limiter("api", LimiterConfig::new(Duration::from_secs(10), 5))
        .await;

    manager.check_limit("commands", "alice", &Value::Null).await.ok();
    manager.check_limit("commands", "alice", &Value::Null).await.ok();
    manager.check_limit("commands", "bob", &Value::Null).await.ok();
    manager.check_limit("api", "alice", &Value::Null).await.ok();

    let stats = manager.stats().await;
    assert_eq!(stats.global.total_requests, 4);
    assert_eq!(stats.global.blocked_requests, 1);
    assert_eq!(stats.global.blocked_rate, 25.0);

    let commands = &stats.limiters["commands"];
    assert_eq!(commands.total_clients, 2);
    assert_eq!(commands.active_clients, 2);
    assert_eq!(commands.blocked_clients, 1);
    assert_eq!(commands.window_ms, 1000);
    assert_eq!(stats.limiters["api"].max_requests, 5);
}

#[tokio::test(start_paused = true)]
async fn test_background_cleanup_drops_idle_windows() {
    let manager = create_test_manager(5).await;
    manager.check_limit("commands", "alice", &Value::Null).await.ok();

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let stats = manager.limiter_stats("commands").await.unwrap();
    assert_eq!(stats.total_clients, 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_window_limiter_does_not_stall() {
    let manager = RateLimitManager::new();
    manager
        .create_limiter("burst", LimiterConfig::new(Duration::ZERO, 1))
        .await;

    assert_ok!(manager.consume_limit("burst", "alice", &Value::Null).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = manager.limiter_stats("burst").await.unwrap();
    assert_eq!(stats.total_clients, 0);
    manager.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_destroy_empties_registry() {
    let manager = create_test_manager(5).await;
    let limiter = manager.limiter("commands").await.unwrap();
    limiter.is_allowed("alice", &Value::Null).await;

    manager.destroy().await;

    assert!(manager.names().await.is_empty());
    assert_eq!(limiter.stats().await.total_clients, 0);
}
