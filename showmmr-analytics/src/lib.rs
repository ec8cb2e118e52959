#![deny(missing_docs)]

//! Statistics and plot series computed over a merged match dataset.

/// The aggregation pass over a dataset.
pub mod engine;
/// Report types produced by the engine.
pub mod report;

/// Re-export of the engine for convenience.
pub use crate::engine::AnalyticsEngine;
/// Re-export of the report types.
pub use crate::report::{DoubleDownStats, HeroStanding, QueueTotals, Report, SeriesPoint};
