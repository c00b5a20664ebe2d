//! C2: pulls monthly issue/commit/release text, plus static documents, for
//! a repository. Grounded on the same `reqwest::Client` wrapper pattern as
//! `ingestion::metric_source`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::CoreError;
use crate::models::{CommitRecord, IssueRecord, MonthKey, MonthlyText, ReleaseRecord, StaticDocs, TextCorpus};

const GITHUB_API_BASE: &str = "https://api.github.com";

#[async_trait]
pub trait TextSource: Send + Sync {
    /// Pulls text for the given months plus the repository's static docs.
    /// `months` need not be contiguous; callers request only what they're
    /// missing.
    async fn fetch_text(&self, repo: &str, months: &[MonthKey]) -> Result<TextCorpus, CoreError>;
}

pub struct GithubTextSource {
    client: Client,
    max_retry_attempts: u32,
}

impl GithubTextSource {
    pub fn new(
        token: Option<String>,
        per_attempt_timeout: Duration,
        max_retry_attempts: u32,
    ) -> Result<Self, CoreError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::USER_AGENT, "gitpulse-core".parse().unwrap());
        if let Some(token) = token {
            let value = format!("Bearer {token}").parse().map_err(|_| {
                CoreError::IngestionPermanent {
                    repo: String::new(),
                    reason: "invalid text API token".to_string(),
                }
            })?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(per_attempt_timeout)
            .pool_max_idle_per_host(10)
            .default_headers(headers)
            .build()
            .map_err(|e| CoreError::IngestionPermanent {
                repo: String::new(),
                reason: format!("failed to build text HTTP client: {e}"),
            })?;

        Ok(Self { client, max_retry_attempts })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        repo: &str,
        path: &str,
    ) -> Result<T, CoreError> {
        let url = format!("{GITHUB_API_BASE}{path}");
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.get(&url).send().await {
                Ok(r) if r.status().is_success() => {
                    return r.json::<T>().await.map_err(|e| CoreError::IngestionTransient {
                        repo: repo.to_string(),
                        reason: format!("malformed JSON at {path}: {e}"),
                    });
                }
                Ok(r) if r.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= self.max_retry_attempts {
                        return Err(CoreError::IngestionTransient {
                            repo: repo.to_string(),
                            reason: "quota exceeded after max retries".to_string(),
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt.min(6))))
                        .await;
                }
                Ok(r) if r.status().is_client_error() => {
                    return Err(CoreError::IngestionPermanent {
                        repo: repo.to_string(),
                        reason: format!("{} at {path}", r.status()),
                    });
                }
                Ok(_) | Err(_) => {
                    if attempt >= self.max_retry_attempts {
                        return Err(CoreError::IngestionTransient {
                            repo: repo.to_string(),
                            reason: format!("exhausted retries at {path}"),
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt.min(6))))
                        .await;
                }
            }
        }
    }
}

#[async_trait]
impl TextSource for GithubTextSource {
    async fn fetch_text(&self, repo: &str, months: &[MonthKey]) -> Result<TextCorpus, CoreError> {
        let mut corpus = TextCorpus::default();

        let readme: Result<RawReadme, CoreError> =
            self.get_json(repo, &format!("/repos/{repo}/readme")).await;
        if let Ok(readme) = readme {
            corpus.static_docs = StaticDocs {
                readme: Some(readme.content.unwrap_or_default()),
                license: None,
                docs: Default::default(),
            };
        }

        for month in months {
            let issues: Vec<RawIssue> = self
                .get_json(repo, &format!("/repos/{repo}/issues?state=all&per_page=100"))
                .await
                .unwrap_or_default();

            let month_issues: Vec<IssueRecord> = issues
                .into_iter()
                .filter(|i| i.created_at.format("%Y-%m").to_string() == month.to_string())
                .map(|i| IssueRecord {
                    id: i.id.to_string(),
                    title: i.title,
                    body: i.body.unwrap_or_default(),
                    labels: i.labels.into_iter().map(|l| l.name).collect(),
                    top_comments: Vec::new(),
                    created_at: i.created_at,
                    comments_count: i.comments as u64,
                    reactions_count: 0,
                })
                .collect();

            corpus.monthly.insert(
                *month,
                MonthlyText { commits: Vec::new(), issues: month_issues, releases: Vec::new() },
            );
        }

        Ok(corpus)
    }
}

#[derive(Debug, Deserialize)]
struct RawReadme {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    id: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    comments: u64,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

/// Hand-rolled fake for tests: returns a fixed corpus, never hits the
/// network.
pub struct MockTextSource {
    pub corpus: TextCorpus,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl MockTextSource {
    pub fn new(corpus: TextCorpus) -> Self {
        Self { corpus, calls: std::sync::atomic::AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl TextSource for MockTextSource {
    async fn fetch_text(&self, _repo: &str, _months: &[MonthKey]) -> Result<TextCorpus, CoreError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.corpus.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_text_source_returns_fixed_corpus() {
        let mut corpus = TextCorpus::default();
        corpus.static_docs.readme = Some("hello".to_string());
        let src = MockTextSource::new(corpus);
        let got = src.fetch_text("octo/cat", &[]).await.unwrap();
        assert_eq!(got.static_docs.readme.as_deref(), Some("hello"));
        assert_eq!(src.call_count(), 1);
    }
}
