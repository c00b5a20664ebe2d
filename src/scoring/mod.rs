//! C12: converts a monthly panel into percentile-ranked, quality-gated
//! community-health scores.

pub mod aggregate;
pub mod dimensions;
pub mod engine;

pub use aggregate::{attenuated_mean, AggregateResult, OUTLIER_DOWNWEIGHT};
pub use dimensions::Dimension;
pub use engine::{ScoringConfig, ScoringEngine};
