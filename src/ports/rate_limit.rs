//! Rate-limit storage port.
//!
//! A store keeps one sliding window of request timestamps per key. The
//! admission operation is trim-then-count: entries older than the window
//! are discarded, the current request is recorded only when admitted, and
//! the post-decision count is returned.

use async_trait::async_trait;
use thiserror::Error;

/// Outcome of a window admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    pub allowed: bool,
    /// Requests in the window after the decision.
    pub current_count: u32,
}

/// Errors from the rate-limit store. Callers fail open on these.
#[derive(Debug, Error)]
pub enum RateLimitStoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// Port for sliding-window rate-limit storage.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Attempts to admit one request for `key` under `limit` within the
    /// trailing `window_secs` window.
    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<WindowDecision, RateLimitStoreError>;

    /// Current request count for `key` within the trailing window.
    async fn count(&self, key: &str, window_secs: u64) -> Result<u32, RateLimitStoreError>;
}
