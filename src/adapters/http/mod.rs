//! HTTP edge adapters. Only the rate-limit middleware lives here; the full
//! HTTP surface is the wrapper's concern.

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiterState, RequestIdentity};
