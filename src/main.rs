//! GitPulse CLI: ingest a repository's history, then request a forecast
//! or a community-health score against the cached panel.
//!
//! Startup sequence: tracing init, env load, then dispatch. Reduced to
//! a CLI dispatcher rather than an HTTP server since the frontend here
//! is an external collaborator, not part of this crate.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitpulse_core::config::{Config, LogFormat};
use gitpulse_core::ingestion::{GithubTextSource, OpenDiggerMetricSource};
use gitpulse_core::Orchestrator;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gitpulse", about = "Multimodal GitHub repository health forecaster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl and align a repository's monthly panel and text corpus.
    /// Safe to re-run: a repository already fully ingested makes no
    /// further external requests.
    Ingest { repo: String },
    /// Forecast a repository's channels `horizon` months past its last
    /// ingested month.
    Forecast {
        repo: String,
        #[arg(long, default_value_t = 12)]
        horizon: usize,
    },
    /// Score a repository's community-health dimensions over its
    /// ingested history.
    Score { repo: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_format);

    let cli = Cli::parse();

    let metric_source = Arc::new(
        OpenDiggerMetricSource::new(
            std::time::Duration::from_secs(config.per_attempt_timeout_secs),
            config.max_retry_attempts,
        )
        .context("failed to build metrics source")?,
    );
    let text_source = Arc::new(
        GithubTextSource::new(
            config.text_api_key.clone(),
            std::time::Duration::from_secs(config.per_attempt_timeout_secs),
            config.max_retry_attempts,
        )
        .context("failed to build text source")?,
    );

    let orchestrator = Orchestrator::new(config, metric_source, text_source)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    match cli.command {
        Command::Ingest { repo } => {
            info!(repo = %repo, "ingesting");
            orchestrator.ingest(&repo).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("ingested {repo}");
        }
        Command::Forecast { repo, horizon } => {
            let record = orchestrator
                .forecast(&repo, horizon)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Score { repo } => {
            let record = orchestrator.score(&repo).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gitpulse_core=info".into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
