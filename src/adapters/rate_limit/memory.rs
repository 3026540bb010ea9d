//! In-memory rate-limit store for tests and single-process deployments.
//!
//! One mutex-guarded bucket of request instants per key, trimmed to the
//! window on every operation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::ports::rate_limit::{RateLimitStore, RateLimitStoreError, WindowDecision};

/// Single-process sliding-window store.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    buckets: Mutex<HashMap<String, Vec<Instant>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn trim(bucket: &mut Vec<Instant>, window: Duration, now: Instant) {
    bucket.retain(|ts| now.duration_since(*ts) <= window);
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<WindowDecision, RateLimitStoreError> {
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(key.to_string()).or_default();
        trim(bucket, window, now);

        let current = bucket.len() as u32;
        if current >= limit {
            return Ok(WindowDecision {
                allowed: false,
                current_count: current,
            });
        }

        bucket.push(now);
        Ok(WindowDecision {
            allowed: true,
            current_count: current + 1,
        })
    }

    async fn count(&self, key: &str, window_secs: u64) -> Result<u32, RateLimitStoreError> {
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        let mut buckets = self.buckets.lock().await;
        let Some(bucket) = buckets.get_mut(key) else {
            return Ok(0);
        };
        trim(bucket, window, now);
        Ok(bucket.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_until_the_limit_then_rejects() {
        let store = InMemoryRateLimitStore::new();
        for i in 1..=3 {
            let decision = store.try_acquire("k", 3, 60).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.current_count, i);
        }
        let decision = store.try_acquire("k", 3, 60).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.current_count, 3);
    }

    #[tokio::test]
    async fn rejected_requests_are_not_recorded() {
        let store = InMemoryRateLimitStore::new();
        store.try_acquire("k", 1, 60).await.unwrap();
        store.try_acquire("k", 1, 60).await.unwrap();
        store.try_acquire("k", 1, 60).await.unwrap();
        assert_eq!(store.count("k", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_key_counts_zero() {
        let store = InMemoryRateLimitStore::new();
        assert_eq!(store.count("missing", 60).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        store.try_acquire("a", 1, 60).await.unwrap();
        let decision = store.try_acquire("b", 1, 60).await.unwrap();
        assert!(decision.allowed);
    }
}
