//! Redis-backed rate-limit store for multi-replica deployments.
//!
//! Each `(key, window)` pair is a sorted set `ratelimit:<key>:<window>`
//! whose member scores are request timestamps. Admission runs as one
//! atomic pipeline: trim members older than the window, add the current
//! request, count, and refresh the TTL to `window + 1`. When the count
//! exceeds the limit, the just-added member is removed and the request is
//! rejected.
//!
//! Members are `<millis>:<uuid>` so two admissions in the same second
//! never collapse into one sorted-set entry.
//!
//! Store errors surface to the caller, which fails open.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use uuid::Uuid;

use crate::domain::foundation::Timestamp;
use crate::ports::rate_limit::{RateLimitStore, RateLimitStoreError, WindowDecision};

/// Distributed sliding-window store over Redis sorted sets.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    conn: MultiplexedConnection,
}

impl RedisRateLimitStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Opens a connection from a Redis URL.
    pub async fn connect(url: &str) -> Result<Self, RateLimitStoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| RateLimitStoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| RateLimitStoreError::Unavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    fn window_key(key: &str, window_secs: u64) -> String {
        format!("ratelimit:{}:{}", key, window_secs)
    }
}

impl std::fmt::Debug for RedisRateLimitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimitStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<WindowDecision, RateLimitStoreError> {
        let redis_key = Self::window_key(key, window_secs);
        let now = Timestamp::now();
        let now_secs = now.as_unix_secs();
        let window_start = now_secs.saturating_sub(window_secs);
        let member = format!(
            "{}:{}",
            now.as_datetime().timestamp_millis(),
            Uuid::new_v4().simple()
        );

        let mut conn = self.conn.clone();

        let (_, _, count, _): (i64, i64, u32, i64) = redis::pipe()
            .atomic()
            .zrembyscore(&redis_key, 0, window_start as f64)
            .zadd(&redis_key, &member, now_secs as f64)
            .zcard(&redis_key)
            .expire(&redis_key, (window_secs + 1) as i64)
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| RateLimitStoreError::Unavailable(e.to_string()))?;

        if count > limit {
            // Over the limit: take back the member we just added.
            let _: i64 = redis::cmd("ZREM")
                .arg(&redis_key)
                .arg(&member)
                .query_async(&mut conn)
                .await
                .map_err(|e: redis::RedisError| RateLimitStoreError::Unavailable(e.to_string()))?;

            return Ok(WindowDecision {
                allowed: false,
                current_count: count.saturating_sub(1),
            });
        }

        Ok(WindowDecision {
            allowed: true,
            current_count: count,
        })
    }

    async fn count(&self, key: &str, window_secs: u64) -> Result<u32, RateLimitStoreError> {
        let redis_key = Self::window_key(key, window_secs);
        let now_secs = Timestamp::now().as_unix_secs();
        let window_start = now_secs.saturating_sub(window_secs);

        let mut conn = self.conn.clone();
        let count: u32 = redis::cmd("ZCOUNT")
            .arg(&redis_key)
            .arg(window_start as f64)
            .arg(now_secs as f64)
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| RateLimitStoreError::Unavailable(e.to_string()))?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Redis integration tests need a running instance and live in the
    // deployment environment's suite, not here.

    #[test]
    fn window_keys_embed_client_and_window() {
        assert_eq!(
            RedisRateLimitStore::window_key("user:42:minute", 60),
            "ratelimit:user:42:minute:60"
        );
    }
}
