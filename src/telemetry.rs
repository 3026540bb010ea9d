//! Tracing initialization for hosting processes.
//!
//! The HTTP wrapper owns `main`; it calls [`init`] once at startup. The
//! filter honors `RUST_LOG` and defaults to `info` for this crate.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber. Safe to call once per
/// process; subsequent calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,conductor=info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// JSON-formatted variant for structured log shipping.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,conductor=info"));

    let _ = fmt().json().with_env_filter(filter).try_init();
}
