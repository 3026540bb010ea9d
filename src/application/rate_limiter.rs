//! Request admission - dual sliding-window rate limiting.
//!
//! Every client is checked against a 60-second and a 3600-second window;
//! a request is admitted only when both are below their limits. Storage is
//! pluggable (in-memory or a shared Redis store). When the store is
//! unreachable, admission proceeds (fail-open) so a bricked backend never
//! bricks the system - the condition is logged for alerting.

use serde::Serialize;
use std::sync::Arc;

use crate::config::RateLimitConfig;
use crate::ports::rate_limit::RateLimitStore;

const MINUTE_WINDOW_SECS: u64 = 60;
const HOUR_WINDOW_SECS: u64 = 3600;

/// Current usage statistics for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    pub requests_last_minute: u32,
    pub requests_last_hour: u32,
    pub limit_per_minute: u32,
    pub limit_per_hour: u32,
}

/// Per-client admission gate over a pluggable window store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    requests_per_minute: u32,
    requests_per_hour: u32,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_minute", &self.requests_per_minute)
            .field("requests_per_hour", &self.requests_per_hour)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            requests_per_minute: config.requests_per_minute,
            requests_per_hour: config.requests_per_hour,
        }
    }

    /// Checks whether a request from `client_id` is admitted, recording it
    /// if so. Returns `(allowed, reason)`; the reason is empty on success.
    pub async fn is_allowed(&self, client_id: &str) -> (bool, String) {
        let minute_key = format!("{}:minute", client_id);
        match self
            .store
            .try_acquire(&minute_key, self.requests_per_minute, MINUTE_WINDOW_SECS)
            .await
        {
            Ok(decision) if !decision.allowed => {
                return (
                    false,
                    format!(
                        "Rate limit exceeded: {} requests per minute",
                        self.requests_per_minute
                    ),
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(client = %client_id, error = %e, "rate limit store error, admitting request");
                return (true, String::new());
            }
        }

        let hour_key = format!("{}:hour", client_id);
        match self
            .store
            .try_acquire(&hour_key, self.requests_per_hour, HOUR_WINDOW_SECS)
            .await
        {
            Ok(decision) if !decision.allowed => (
                false,
                format!(
                    "Rate limit exceeded: {} requests per hour",
                    self.requests_per_hour
                ),
            ),
            Ok(_) => (true, String::new()),
            Err(e) => {
                tracing::error!(client = %client_id, error = %e, "rate limit store error, admitting request");
                (true, String::new())
            }
        }
    }

    /// Current usage statistics for a client. Counts fall back to zero when
    /// the store is unreachable.
    pub async fn stats(&self, client_id: &str) -> RateLimitStats {
        let minute_key = format!("{}:minute", client_id);
        let hour_key = format!("{}:hour", client_id);

        let requests_last_minute = match self.store.count(&minute_key, MINUTE_WINDOW_SECS).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(client = %client_id, error = %e, "rate limit stats error");
                0
            }
        };
        let requests_last_hour = match self.store.count(&hour_key, HOUR_WINDOW_SECS).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(client = %client_id, error = %e, "rate limit stats error");
                0
            }
        };

        RateLimitStats {
            requests_last_minute,
            requests_last_hour,
            limit_per_minute: self.requests_per_minute,
            limit_per_hour: self.requests_per_hour,
        }
    }
}

/// Resolves the identity a request is rate limited under.
///
/// Priority: authenticated user > session > API-key prefix > client IP
/// (first `X-Forwarded-For` entry, else the remote address).
pub fn resolve_client_id(
    user_id: Option<i64>,
    session_id: Option<&str>,
    api_key: Option<&str>,
    forwarded_for: Option<&str>,
    remote_addr: Option<&str>,
) -> String {
    if let Some(user_id) = user_id {
        return format!("user:{}", user_id);
    }
    if let Some(session_id) = session_id {
        return format!("session:{}", session_id);
    }
    if let Some(api_key) = api_key {
        // Prefix only, for privacy.
        let prefix: String = api_key.chars().take(16).collect();
        return format!("apikey:{}", prefix);
    }
    if let Some(forwarded) = forwarded_for {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return format!("ip:{}", first);
            }
        }
    }
    match remote_addr {
        Some(addr) => format!("ip:{}", addr),
        None => "ip:unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rate_limit::InMemoryRateLimitStore;
    use crate::ports::rate_limit::{RateLimitStoreError, WindowDecision};
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn try_acquire(
            &self,
            _key: &str,
            _limit: u32,
            _window_secs: u64,
        ) -> Result<WindowDecision, RateLimitStoreError> {
            Err(RateLimitStoreError::Unavailable("connection refused".to_string()))
        }

        async fn count(&self, _key: &str, _window_secs: u64) -> Result<u32, RateLimitStoreError> {
            Err(RateLimitStoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn limiter(per_minute: u32, per_hour: u32) -> RateLimiter {
        let config = RateLimitConfig {
            requests_per_minute: per_minute,
            requests_per_hour: per_hour,
            redis_url: None,
        };
        RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), &config)
    }

    #[tokio::test]
    async fn admits_below_the_minute_limit() {
        let limiter = limiter(5, 1000);
        for _ in 0..5 {
            let (allowed, reason) = limiter.is_allowed("client-a").await;
            assert!(allowed);
            assert!(reason.is_empty());
        }
    }

    #[tokio::test]
    async fn rejects_the_request_after_the_minute_limit() {
        let limiter = limiter(3, 1000);
        for _ in 0..3 {
            assert!(limiter.is_allowed("client-a").await.0);
        }
        let (allowed, reason) = limiter.is_allowed("client-a").await;
        assert!(!allowed);
        assert_eq!(reason, "Rate limit exceeded: 3 requests per minute");
    }

    #[tokio::test]
    async fn hour_limit_applies_independently() {
        let limiter = limiter(100, 4);
        for _ in 0..4 {
            assert!(limiter.is_allowed("client-a").await.0);
        }
        let (allowed, reason) = limiter.is_allowed("client-a").await;
        assert!(!allowed);
        assert_eq!(reason, "Rate limit exceeded: 4 requests per hour");
    }

    #[tokio::test]
    async fn clients_are_isolated() {
        let limiter = limiter(1, 1000);
        assert!(limiter.is_allowed("client-a").await.0);
        assert!(!limiter.is_allowed("client-a").await.0);
        assert!(limiter.is_allowed("client-b").await.0);
    }

    #[tokio::test]
    async fn stats_reflect_usage_and_limits() {
        let limiter = limiter(60, 1000);
        for _ in 0..3 {
            limiter.is_allowed("client-a").await;
        }
        let stats = limiter.stats("client-a").await;
        assert_eq!(stats.requests_last_minute, 3);
        assert_eq!(stats.requests_last_hour, 3);
        assert_eq!(stats.limit_per_minute, 60);
        assert_eq!(stats.limit_per_hour, 1000);
    }

    #[tokio::test]
    async fn broken_store_fails_open() {
        let config = RateLimitConfig::default();
        let limiter = RateLimiter::new(Arc::new(BrokenStore), &config);
        let (allowed, reason) = limiter.is_allowed("client-a").await;
        assert!(allowed);
        assert!(reason.is_empty());

        let stats = limiter.stats("client-a").await;
        assert_eq!(stats.requests_last_minute, 0);
        assert_eq!(stats.limit_per_minute, 60);
    }

    #[test]
    fn client_identity_priority_order() {
        assert_eq!(
            resolve_client_id(Some(42), Some("s-1"), Some("key"), Some("1.2.3.4"), None),
            "user:42"
        );
        assert_eq!(
            resolve_client_id(None, Some("s-1"), Some("key"), None, None),
            "session:s-1"
        );
        assert_eq!(
            resolve_client_id(None, None, Some("sk-live-abcdefghijklmnop-rest"), None, None),
            "apikey:sk-live-abcdefgh"
        );
        assert_eq!(
            resolve_client_id(None, None, None, Some("9.8.7.6, 10.0.0.1"), Some("127.0.0.1")),
            "ip:9.8.7.6"
        );
        assert_eq!(
            resolve_client_id(None, None, None, None, Some("127.0.0.1")),
            "ip:127.0.0.1"
        );
        assert_eq!(resolve_client_id(None, None, None, None, None), "ip:unknown");
    }
}
