//! C1: pulls a repository's monthly numeric panel from an external
//! metrics provider.
//!
//! Grounded on `scrapers/dome_rest.rs`'s typed `reqwest::Client` wrapper
//! and `scrapers/hashdive_api.rs`'s retry-with-backoff helper.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::CoreError;
use crate::models::{Channel, MonthKey, MonthlyPanel};

const OPENDIGGER_BASE: &str = "https://oss.open-digger.cn";

#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Pulls the full monthly numeric panel for `repo`. Idempotent with
    /// respect to the external provider; truncated responses surface as
    /// `IngestionTransient`, never silently zero-filled.
    async fn fetch_metrics(&self, repo: &str) -> Result<MonthlyPanel, CoreError>;
}

/// Production implementation against an OpenDigger-shaped metrics API:
/// one JSON document per (repo, channel) keyed by month.
pub struct OpenDiggerMetricSource {
    client: Client,
    base_url: String,
    max_retry_attempts: u32,
}

impl OpenDiggerMetricSource {
    pub fn new(per_attempt_timeout: Duration, max_retry_attempts: u32) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(per_attempt_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| CoreError::IngestionPermanent {
                repo: String::new(),
                reason: format!("failed to build metrics HTTP client: {e}"),
            })?;

        Ok(Self { client, base_url: OPENDIGGER_BASE.to_string(), max_retry_attempts })
    }

    fn channel_url(&self, repo: &str, channel: Channel) -> String {
        format!("{}/github/{}/{}.json", self.base_url, repo, channel_endpoint(channel))
    }

    async fn fetch_channel(
        &self,
        repo: &str,
        channel: Channel,
    ) -> Result<BTreeMap<String, Option<f64>>, CoreError> {
        let url = self.channel_url(repo, channel);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let resp = self.client.get(&url).send().await;
            match resp {
                Ok(r) if r.status().is_success() => {
                    let expected_len = r.content_length();
                    let text = r.text().await.map_err(|e| CoreError::IngestionTransient {
                        repo: repo.to_string(),
                        reason: format!("failed to read body for {channel}: {e}"),
                    })?;
                    if let Some(expected) = expected_len {
                        if (text.len() as u64) < expected {
                            return Err(CoreError::IngestionTransient {
                                repo: repo.to_string(),
                                reason: format!("truncated response for {channel}"),
                            });
                        }
                    }
                    let parsed: OpenDiggerSeries =
                        serde_json::from_str(&text).map_err(|e| CoreError::IngestionTransient {
                            repo: repo.to_string(),
                            reason: format!("malformed JSON for {channel}: {e}"),
                        })?;
                    return Ok(parsed.into_map());
                }
                Ok(r) if r.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= self.max_retry_attempts {
                        return Err(CoreError::IngestionTransient {
                            repo: repo.to_string(),
                            reason: "quota exceeded after max retries".to_string(),
                        });
                    }
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Ok(r) if r.status().is_client_error() => {
                    return Err(CoreError::IngestionPermanent {
                        repo: repo.to_string(),
                        reason: format!("{} for channel {channel}", r.status()),
                    });
                }
                Ok(_) | Err(_) => {
                    if attempt >= self.max_retry_attempts {
                        return Err(CoreError::IngestionTransient {
                            repo: repo.to_string(),
                            reason: format!("exhausted retries fetching {channel}"),
                        });
                    }
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }
}

#[async_trait]
impl MetricSource for OpenDiggerMetricSource {
    async fn fetch_metrics(&self, repo: &str) -> Result<MonthlyPanel, CoreError> {
        let mut per_channel: Vec<(Channel, BTreeMap<String, Option<f64>>)> = Vec::new();
        for channel in Channel::ALL {
            let series = self.fetch_channel(repo, channel).await?;
            per_channel.push((channel, series));
        }

        let mut months: Vec<MonthKey> = per_channel
            .iter()
            .flat_map(|(_, series)| series.keys())
            .filter_map(|m| m.parse::<MonthKey>().ok())
            .collect();
        months.sort();
        months.dedup();

        if months.is_empty() {
            return Ok(MonthlyPanel::new(Vec::new()));
        }
        let axis = months[0].axis_to(months.last().unwrap());
        let mut panel = MonthlyPanel::new(axis.clone());
        for (channel, series) in per_channel {
            for (i, month) in axis.iter().enumerate() {
                if let Some(v) = series.get(&month.to_string()) {
                    panel.set(channel, i, *v);
                }
            }
        }
        Ok(panel)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let capped = attempt.min(6);
    Duration::from_millis(200u64 * 2u64.pow(capped))
}

fn channel_endpoint(channel: Channel) -> &'static str {
    match channel {
        Channel::OpenRank => "openrank",
        Channel::Activity => "activity",
        Channel::Stars => "stars",
        Channel::Forks => "technical_fork",
        Channel::Attention => "attention",
        Channel::Participants => "participants",
        Channel::NewContributors => "new_contributors",
        Channel::Contributors => "contributors",
        Channel::InactiveContributors => "inactive_contributors",
        Channel::BusFactor => "bus_factor",
        Channel::NewIssues => "issues_new",
        Channel::ClosedIssues => "issues_closed",
        Channel::IssueComments => "issue_comments",
        Channel::ChangeRequests => "change_requests",
        Channel::AcceptedChangeRequests => "change_requests_accepted",
        Channel::ChangeRequestReviews => "change_requests_reviews",
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OpenDiggerSeries {
    Flat(BTreeMap<String, f64>),
    Nullable(BTreeMap<String, Option<f64>>),
}

impl OpenDiggerSeries {
    fn into_map(self) -> BTreeMap<String, Option<f64>> {
        match self {
            OpenDiggerSeries::Flat(m) => m.into_iter().map(|(k, v)| (k, Some(v))).collect(),
            OpenDiggerSeries::Nullable(m) => m,
        }
    }
}

/// Hand-rolled fake used by unit and integration tests; never hits the
/// network. Counts calls so resume-idempotence tests can assert zero
/// external requests on a completed repository.
pub struct MockMetricSource {
    pub panel: parking_lot::Mutex<MonthlyPanel>,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl MockMetricSource {
    pub fn new(panel: MonthlyPanel) -> Self {
        Self { panel: parking_lot::Mutex::new(panel), calls: std::sync::atomic::AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricSource for MockMetricSource {
    async fn fetch_metrics(&self, _repo: &str) -> Result<MonthlyPanel, CoreError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.panel.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_source_counts_calls() {
        let panel = MonthlyPanel::new(vec![MonthKey::new(2023, 1)]);
        let src = MockMetricSource::new(panel);
        src.fetch_metrics("octo/cat").await.unwrap();
        src.fetch_metrics("octo/cat").await.unwrap();
        assert_eq!(src.call_count(), 2);
    }

    #[test]
    fn channel_endpoints_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for c in Channel::ALL {
            assert!(seen.insert(channel_endpoint(c)), "duplicate endpoint for {c}");
        }
    }
}
