//! C13: the request/response boundary. Coordinates crawl → align →
//! normalize → encode → predict / → score and owns the durable cache.
//!
//! A thin struct holding the shared collaborators (HTTP clients, rate
//! governor, model) that request handlers call into, in the shape of an
//! axum `AppState` generalized to a library-level orchestrator with no
//! HTTP framework dependency.

use std::sync::Arc;

use chrono::{Datelike, Utc};

use crate::config::Config;
use crate::error::CoreError;
use crate::ingestion::progress::Stream;
use crate::ingestion::{HeatSelector, MetricSource, RateGovernor, TextSource};
use crate::ingestion::rate_governor::RateGovernorConfig;
use crate::model::{GitPulseModel, ModelCheckpoint, TextEncoder};
use crate::models::{Channel, ForecastRecord, MonthKey, Sample, ScoreRecord};
use crate::panel::{Normalizer, PanelBuilder};
use crate::scoring::{ScoringConfig, ScoringEngine};
use crate::storage::RepoStore;

pub const MODEL_VERSION: &str = "gitpulse-core-0.1";

pub struct Orchestrator {
    config: Config,
    metric_source: Arc<dyn MetricSource>,
    text_source: Arc<dyn TextSource>,
    rate_governor: Arc<RateGovernor>,
    store: Arc<RepoStore>,
    text_encoder: TextEncoder,
    model: GitPulseModel,
    scoring: ScoringEngine,
    heat_selector: HeatSelector,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        metric_source: Arc<dyn MetricSource>,
        text_source: Arc<dyn TextSource>,
    ) -> Result<Self, CoreError> {
        let rate_governor = Arc::new(RateGovernor::new(RateGovernorConfig {
            requests_per_hour: config.requests_per_hour,
            min_interval: std::time::Duration::from_millis(config.min_interval_ms),
            per_host: config.rate_governor_per_host,
        }));
        let store = Arc::new(RepoStore::new(config.cache_root.clone()));
        let model = Self::load_model(&config)?;
        let d = model.fusion.d();
        let text_encoder =
            TextEncoder::load_or_seeded(config.text_encoder_weights_path.as_deref(), d);
        if text_encoder.output_dim() != d {
            return Err(CoreError::ModelUnavailable {
                reason: format!(
                    "text encoder output_dim {} does not match model d {d}",
                    text_encoder.output_dim()
                ),
            });
        }
        let scoring = ScoringEngine::new(ScoringConfig::default());
        let heat_selector = HeatSelector::new(config.heat_selector_top_k);

        Ok(Self {
            config,
            metric_source,
            text_source,
            rate_governor,
            store,
            text_encoder,
            model,
            scoring,
            heat_selector,
        })
    }

    fn load_model(config: &Config) -> Result<GitPulseModel, CoreError> {
        match &config.forecaster_checkpoint_path {
            None => {
                let d = crate::model::series_encoder::DEFAULT_D;
                Ok(GitPulseModel::seeded(
                    Channel::COUNT,
                    config.history_window,
                    config.prediction_horizon,
                    d,
                    0,
                ))
            }
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| CoreError::ModelUnavailable {
                    reason: format!("failed to read checkpoint at {}: {e}", path.display()),
                })?;
                let ckpt: ModelCheckpoint =
                    serde_json::from_str(&json).map_err(|e| CoreError::ModelUnavailable {
                        reason: format!("malformed checkpoint at {}: {e}", path.display()),
                    })?;
                GitPulseModel::from_checkpoint(&ckpt, Channel::COUNT, config.history_window)
                    .map_err(|reason| CoreError::ModelUnavailable { reason })
            }
        }
    }

    /// Runs C1→C5, resumable. A repository whose on-disk panel already
    /// covers every month recorded as done in `progress.json` performs
    /// zero external requests (property 8).
    pub async fn ingest(&self, repo: &str) -> Result<(), CoreError> {
        let lock = self.store.lock(repo);
        let _guard = lock.lock();

        let mut progress = self.store.progress(repo);

        if let Some(existing) = self.store.load_panel(repo) {
            let fully_done = !existing.axis.is_empty()
                && existing.axis.iter().all(|m| {
                    progress.is_done(repo, *m, Stream::Metrics) && progress.is_done(repo, *m, Stream::Text)
                });
            if fully_done {
                return Ok(());
            }
        }

        self.rate_governor.await_slot("metrics").await;
        let raw_metrics = self.metric_source.fetch_metrics(repo).await?;
        if raw_metrics.axis.is_empty() {
            return Err(CoreError::IngestionPermanent {
                repo: repo.to_string(),
                reason: "metrics provider returned no months".to_string(),
            });
        }

        let repo_created_month = raw_metrics.axis[0];
        let now = Utc::now();
        let today = MonthKey::new(now.year(), now.month());
        let panel = PanelBuilder::build(raw_metrics, repo_created_month, today);
        if panel.is_empty() {
            return Err(CoreError::IngestionPermanent {
                repo: repo.to_string(),
                reason: "no months remain after aligning to repository creation and today"
                    .to_string(),
            });
        }

        self.rate_governor.await_slot("text").await;
        let mut corpus = self.text_source.fetch_text(repo, panel.axis()).await?;

        // C4: cap each month's issues to the top-K by heat before anything
        // is persisted, so the stored corpus never holds more than the
        // configured `heat_selector_top_k`.
        for text in corpus.monthly.values_mut() {
            text.issues = self.heat_selector.select(&text.issues).into_iter().cloned().collect();
        }

        self.store.save_panel(repo, &panel)?;
        self.store.save_static_docs(repo, &corpus.static_docs).map_err(|e| {
            CoreError::IngestionTransient { repo: repo.to_string(), reason: e.to_string() }
        })?;
        for (month, text) in &corpus.monthly {
            self.store.save_monthly_text(repo, *month, text).map_err(|e| {
                CoreError::IngestionTransient { repo: repo.to_string(), reason: e.to_string() }
            })?;
            progress.mark_done(repo, *month, Stream::Text);
        }
        for month in panel.axis() {
            progress.mark_done(repo, *month, Stream::Metrics);
        }

        let stats = Normalizer::fit(&panel, panel.len());
        self.store.save_stats(repo, &stats).map_err(|e| CoreError::IngestionTransient {
            repo: repo.to_string(),
            reason: e.to_string(),
        })?;

        progress.save().map_err(|e| CoreError::IngestionTransient {
            repo: repo.to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Runs C6–C11 against the most recently ingested panel.
    pub fn forecast(&self, repo: &str, horizon: usize) -> Result<ForecastRecord, CoreError> {
        let panel = self.store.load_panel(repo).ok_or_else(|| CoreError::DataInsufficient {
            repo: repo.to_string(),
            have_months: 0,
            need_months: self.config.history_window,
        })?;

        if panel.len() < self.config.history_window {
            return Err(CoreError::DataInsufficient {
                repo: repo.to_string(),
                have_months: panel.len(),
                need_months: self.config.history_window,
            });
        }

        let stats = self.store.load_stats(repo).unwrap_or_else(|| Normalizer::fit(&panel, panel.len()));
        let corpus = self.store.load_corpus(repo);

        let hist_start = panel.len() - self.config.history_window;
        let mut hist = vec![Vec::new(); Channel::COUNT];
        let mut hist_mask = vec![Vec::new(); Channel::COUNT];
        for channel in Channel::ALL {
            let series = panel.channel_series(channel);
            let slice = &series[hist_start..];
            let (standardized, mask) = Normalizer::apply(slice, channel, &stats);
            let idx = channel.as_index();
            hist[idx] = standardized;
            hist_mask[idx] = mask;
        }

        let hist_axis = panel.axis()[hist_start..].to_vec();
        let last_month = *hist_axis.last().expect("history_window > 0");
        let text = corpus.flatten_month(&last_month);

        let mut target_axis = Vec::with_capacity(horizon);
        let mut cursor = last_month;
        for _ in 0..horizon {
            cursor = cursor.succ();
            target_axis.push(cursor);
        }

        let sample = Sample {
            hist,
            hist_mask,
            text,
            target: vec![Vec::new(); Channel::COUNT],
            hist_axis,
            target_axis: target_axis.clone(),
        };

        // The forecaster head emits a fixed P steps (the horizon it was
        // trained/seeded at); a caller-requested horizon only narrows it.
        let out = self.model.predict(&self.text_encoder, &sample);
        let pred: Vec<Vec<f64>> = out.pred.into_iter().take(horizon).collect();

        let mut predictions: std::collections::BTreeMap<
            String,
            std::collections::BTreeMap<String, f64>,
        > = std::collections::BTreeMap::new();
        for (step_idx, step_values) in pred.iter().enumerate() {
            let month = target_axis[step_idx];
            for channel in Channel::ALL {
                let z = step_values[channel.as_index()];
                let value = Normalizer::invert(&[z], channel, &stats)[0];
                predictions
                    .entry(channel.as_str().to_string())
                    .or_default()
                    .insert(month.to_string(), value);
            }
        }

        let confidence = self.model.forecaster.confidence(
            out.fusion_weight,
            self.model.fusion.w_min(),
            self.model.fusion.w_max(),
        );

        Ok(ForecastRecord {
            horizon_months: pred.len(),
            predictions,
            confidence,
            model_version: MODEL_VERSION.to_string(),
        })
    }

    /// Runs C12 against the most recently ingested panel.
    pub fn score(&self, repo: &str) -> Result<ScoreRecord, CoreError> {
        let panel = self.store.load_panel(repo).ok_or_else(|| CoreError::DataInsufficient {
            repo: repo.to_string(),
            have_months: 0,
            need_months: 1,
        })?;
        Ok(self.scoring.score(&panel))
    }

    pub fn heat_selector(&self) -> &HeatSelector {
        &self.heat_selector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{MockMetricSource, MockTextSource};
    use crate::models::{MonthlyPanel, TextCorpus};

    fn config_with_root(root: &std::path::Path) -> Config {
        Config {
            metrics_api_key: None,
            text_api_key: None,
            requests_per_hour: 360_000,
            min_interval_ms: 0,
            rate_governor_per_host: false,
            text_encoder_weights_path: None,
            forecaster_checkpoint_path: None,
            cache_root: root.to_path_buf(),
            history_window: 4,
            prediction_horizon: 2,
            window_stride: 1,
            data_delay_months: 0,
            heat_selector_top_k: 3,
            per_attempt_timeout_secs: 5,
            max_retry_attempts: 2,
            log_format: crate::config::LogFormat::Pretty,
        }
    }

    fn sample_panel() -> MonthlyPanel {
        let axis: Vec<MonthKey> = (1..=6).map(|m| MonthKey::new(2023, m)).collect();
        let mut panel = MonthlyPanel::new(axis);
        for channel in Channel::ALL {
            for i in 0..6 {
                panel.set(channel, i, Some(10.0 + i as f64));
            }
        }
        panel
    }

    #[tokio::test]
    async fn ingest_is_idempotent_and_makes_no_second_round_of_requests() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_root(dir.path());
        let metric_source = Arc::new(MockMetricSource::new(sample_panel()));
        let text_source = Arc::new(MockTextSource::new(TextCorpus::default()));
        let orchestrator =
            Orchestrator::new(config, metric_source.clone(), text_source.clone()).unwrap();

        orchestrator.ingest("octo/cat").await.unwrap();
        let first_metric_calls = metric_source.call_count();
        let first_text_calls = text_source.call_count();
        assert_eq!(first_metric_calls, 1);
        assert_eq!(first_text_calls, 1);

        orchestrator.ingest("octo/cat").await.unwrap();
        assert_eq!(metric_source.call_count(), first_metric_calls);
        assert_eq!(text_source.call_count(), first_text_calls);
    }

    #[tokio::test]
    async fn scenario_a_data_insufficient_on_short_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_root(dir.path());
        config.history_window = 128;

        let axis: Vec<MonthKey> = (1..=12).map(|m| MonthKey::new(2023, m)).collect();
        let mut panel = MonthlyPanel::new(axis);
        for i in 0..12 {
            panel.set(Channel::Stars, i, Some(100.0 + 10.0 * i as f64));
        }
        let metric_source = Arc::new(MockMetricSource::new(panel));
        let text_source = Arc::new(MockTextSource::new(TextCorpus::default()));
        let orchestrator = Orchestrator::new(config, metric_source, text_source).unwrap();

        orchestrator.ingest("octo/cat").await.unwrap();
        let result = orchestrator.forecast("octo/cat", 3);
        assert!(matches!(result, Err(CoreError::DataInsufficient { .. })));
    }

    #[tokio::test]
    async fn forecast_after_ingest_returns_requested_horizon() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_root(dir.path());
        let metric_source = Arc::new(MockMetricSource::new(sample_panel()));
        let text_source = Arc::new(MockTextSource::new(TextCorpus::default()));
        let orchestrator = Orchestrator::new(config, metric_source, text_source).unwrap();

        orchestrator.ingest("octo/cat").await.unwrap();
        let forecast = orchestrator.forecast("octo/cat", 2).unwrap();
        assert_eq!(forecast.horizon_months, 2);
        assert_eq!(forecast.predictions.len(), Channel::COUNT);
        assert!(forecast.confidence >= 0.0 && forecast.confidence <= 1.0);
    }

    #[tokio::test]
    async fn score_after_ingest_produces_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_root(dir.path());
        let metric_source = Arc::new(MockMetricSource::new(sample_panel()));
        let text_source = Arc::new(MockTextSource::new(TextCorpus::default()));
        let orchestrator = Orchestrator::new(config, metric_source, text_source).unwrap();

        orchestrator.ingest("octo/cat").await.unwrap();
        let record = orchestrator.score("octo/cat").unwrap();
        assert!(record.overall >= 0.0);
    }
}
