//! Runtime configuration, populated from the environment.
//!
//! Uses the `env::var(..).ok().and_then(|v| v.parse().ok()).unwrap_or(default)`
//! pattern uniformly instead of introducing a config-file parser.

use std::path::PathBuf;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_path_or(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the metrics provider (e.g. an OpenDigger-style API).
    pub metrics_api_key: Option<String>,
    /// Credential for the text-host provider (e.g. a GitHub-style API).
    pub text_api_key: Option<String>,

    pub requests_per_hour: u32,
    pub min_interval_ms: u64,
    pub rate_governor_per_host: bool,

    pub text_encoder_weights_path: Option<PathBuf>,
    pub forecaster_checkpoint_path: Option<PathBuf>,
    pub cache_root: PathBuf,

    /// History window H, default 128.
    pub history_window: usize,
    /// Default prediction horizon P, default 32.
    pub prediction_horizon: usize,
    /// Sliding-window stride S, default 6.
    pub window_stride: usize,
    /// Open Question resolution 1: off (0) unless explicitly configured.
    pub data_delay_months: usize,

    pub heat_selector_top_k: usize,

    pub per_attempt_timeout_secs: u64,
    pub max_retry_attempts: u32,

    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let log_format = match std::env::var("GITPULSE_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            metrics_api_key: std::env::var("GITPULSE_METRICS_API_KEY").ok(),
            text_api_key: std::env::var("GITPULSE_TEXT_API_KEY").ok(),

            requests_per_hour: env_or("GITPULSE_REQUESTS_PER_HOUR", 3600),
            min_interval_ms: env_or("GITPULSE_MIN_INTERVAL_MS", 1000),
            rate_governor_per_host: env_or("GITPULSE_RATE_GOVERNOR_PER_HOST", false),

            text_encoder_weights_path: std::env::var("GITPULSE_TEXT_ENCODER_WEIGHTS")
                .ok()
                .map(PathBuf::from),
            forecaster_checkpoint_path: std::env::var("GITPULSE_FORECASTER_CHECKPOINT")
                .ok()
                .map(PathBuf::from),
            cache_root: env_path_or("GITPULSE_CACHE_ROOT", "./gitpulse-cache"),

            history_window: env_or("GITPULSE_HISTORY_WINDOW", 128),
            prediction_horizon: env_or("GITPULSE_PREDICTION_HORIZON", 32),
            window_stride: env_or("GITPULSE_WINDOW_STRIDE", 6),
            data_delay_months: env_or("GITPULSE_DATA_DELAY_MONTHS", 0),

            heat_selector_top_k: env_or("GITPULSE_HEAT_TOP_K", 3),

            per_attempt_timeout_secs: env_or("GITPULSE_PER_ATTEMPT_TIMEOUT_SECS", 30),
            max_retry_attempts: env_or("GITPULSE_MAX_RETRY_ATTEMPTS", 5),

            log_format,
        }
    }
}
