//! Admission-control scenarios over the in-memory window store.

use std::sync::Arc;

use conductor::adapters::rate_limit::InMemoryRateLimitStore;
use conductor::application::{resolve_client_id, RateLimiter};
use conductor::config::RateLimitConfig;

fn limiter(per_minute: u32, per_hour: u32) -> RateLimiter {
    let config = RateLimitConfig {
        requests_per_minute: per_minute,
        requests_per_hour: per_hour,
        redis_url: None,
    };
    RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), &config)
}

#[tokio::test]
async fn sixty_first_request_in_a_minute_is_rejected() {
    let limiter = limiter(60, 1000);

    for i in 1..=60 {
        let (allowed, reason) = limiter.is_allowed("user:42").await;
        assert!(allowed, "request {i} should be admitted");
        assert!(reason.is_empty());
    }

    let (allowed, reason) = limiter.is_allowed("user:42").await;
    assert!(!allowed);
    assert_eq!(reason, "Rate limit exceeded: 60 requests per minute");

    let stats = limiter.stats("user:42").await;
    assert_eq!(stats.requests_last_minute, 60);
    assert_eq!(stats.limit_per_minute, 60);
    assert_eq!(stats.limit_per_hour, 1000);
}

#[tokio::test]
async fn exactly_n_requests_fit_the_window() {
    let limiter = limiter(5, 1000);

    for _ in 0..5 {
        assert!(limiter.is_allowed("client").await.0);
    }
    assert!(!limiter.is_allowed("client").await.0);
    // The rejected request is not recorded; the window still holds N.
    assert_eq!(limiter.stats("client").await.requests_last_minute, 5);
}

#[tokio::test]
async fn hour_window_rejects_after_its_own_limit() {
    let limiter = limiter(1000, 10);

    for _ in 0..10 {
        assert!(limiter.is_allowed("client").await.0);
    }
    let (allowed, reason) = limiter.is_allowed("client").await;
    assert!(!allowed);
    assert_eq!(reason, "Rate limit exceeded: 10 requests per hour");
}

#[tokio::test]
async fn different_clients_do_not_share_windows() {
    let limiter = limiter(2, 1000);

    assert!(limiter.is_allowed("ip:1.1.1.1").await.0);
    assert!(limiter.is_allowed("ip:1.1.1.1").await.0);
    assert!(!limiter.is_allowed("ip:1.1.1.1").await.0);

    assert!(limiter.is_allowed("ip:2.2.2.2").await.0);
}

#[tokio::test]
async fn identity_resolution_prefers_the_strongest_signal() {
    assert_eq!(
        resolve_client_id(Some(7), Some("abc"), None, Some("3.3.3.3"), Some("4.4.4.4")),
        "user:7"
    );
    assert_eq!(
        resolve_client_id(None, None, None, Some("3.3.3.3, 10.0.0.2"), Some("4.4.4.4")),
        "ip:3.3.3.3"
    );
    assert_eq!(resolve_client_id(None, None, None, None, Some("4.4.4.4")), "ip:4.4.4.4");
}
