//! Rate-limit store adapters.
//!
//! - [`InMemoryRateLimitStore`] - single-process, for tests and dev.
//! - [`RedisRateLimitStore`] - shared sorted-set windows for production
//!   multi-replica deployments.

mod memory;
mod redis;

pub use memory::InMemoryRateLimitStore;
pub use redis::RedisRateLimitStore;
