//! Core error kinds the crawl/forecast/score pipeline distinguishes.
//!
//! Hand-rolled `Display`/`std::error::Error` rather than a derive macro,
//! matching the rest of the crate's error types.

use std::fmt;

#[derive(Debug, Clone)]
pub enum CoreError {
    /// Network/timeout/5xx/429. Recovered locally by the caller via
    /// `RateGovernor` + retry; a caller that sees this exhausted its
    /// retry budget.
    IngestionTransient { repo: String, reason: String },
    /// Auth failure, repository missing, or private without access.
    /// Surfaced immediately, no retry.
    IngestionPermanent { repo: String, reason: String },
    /// Fewer than `H` months of history when a forecast is requested.
    DataInsufficient { repo: String, have_months: usize, need_months: usize },
    /// A scoring month's data-quality fraction fell below the skip
    /// threshold; the month was skipped, not an aborted request.
    QualityDegraded { repo: String, month: String, quality: f64 },
    /// Checkpoint missing or incompatible with the channel list.
    ModelUnavailable { reason: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::IngestionTransient { repo, reason } => {
                write!(f, "transient ingestion error for {repo}: {reason}")
            }
            CoreError::IngestionPermanent { repo, reason } => {
                write!(f, "permanent ingestion error for {repo}: {reason}")
            }
            CoreError::DataInsufficient { repo, have_months, need_months } => write!(
                f,
                "insufficient history for {repo}: have {have_months} months, need {need_months}"
            ),
            CoreError::QualityDegraded { repo, month, quality } => write!(
                f,
                "quality degraded for {repo} at {month}: data-quality fraction {quality:.2}"
            ),
            CoreError::ModelUnavailable { reason } => write!(f, "model unavailable: {reason}"),
        }
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_repo_and_reason() {
        let e = CoreError::IngestionPermanent {
            repo: "octo/cat".to_string(),
            reason: "401".to_string(),
        };
        let s = e.to_string();
        assert!(s.contains("octo/cat"));
        assert!(s.contains("401"));
    }
}
