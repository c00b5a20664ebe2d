//! Crawl/alignment pipeline: metric + text sources, pacing, heat selection,
//! and resumable progress tracking.

pub mod heat_selector;
pub mod metric_source;
pub mod progress;
pub mod rate_governor;
pub mod text_source;

pub use heat_selector::HeatSelector;
pub use metric_source::{MetricSource, MockMetricSource, OpenDiggerMetricSource};
pub use progress::{ProgressStore, Stream};
pub use rate_governor::RateGovernor;
pub use text_source::{GithubTextSource, MockTextSource, TextSource};
