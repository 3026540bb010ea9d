//! Foundational value objects shared across the domain layer.

mod ids;
mod timestamp;

pub use ids::StepId;
pub use timestamp::Timestamp;
