//! Adapters - concrete implementations of the ports.

pub mod analytics;
pub mod events;
pub mod http;
pub mod rate_limit;
pub mod tools;
