//! Routing analytics domain model.
//!
//! Record shapes stored by the analytics store, the aggregate metrics
//! derived from them, and the text report renderer.

mod records;
mod report;

pub use records::{
    pattern_hash, CorrectionRecord, DailyRollup, MisroutingPattern, ParseOutcomeError,
    RoutingMetrics, RoutingOutcome, RoutingRecord,
};
pub use report::render_report;
