//! Conductor - query orchestration core for a multi-domain personal
//! assistant backend.
//!
//! Routes natural-language queries across heterogeneous data-source tools
//! (email, tasks, calendar, notion): domain detection with routing
//! validation and auto-correction, query decomposition into a dependency
//! DAG, level-parallel execution with context synthesis between levels,
//! cross-domain fan-out, durable routing analytics, and distributed rate
//! limiting in front of it all.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
