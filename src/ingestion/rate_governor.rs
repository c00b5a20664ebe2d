//! C3: process-wide leaky-bucket pacing so crawl tasks never collectively
//! exceed the external provider's quota.
//!
//! Grounded on `middleware/rate_limit.rs`'s sliding-window state held
//! behind a `parking_lot::Mutex`, generalized from per-IP to a single
//! global (or per-host) bucket, and on `scrapers/hashdive_api.rs`'s
//! `RateLimiter` minimum-interval spacing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone)]
pub struct RateGovernorConfig {
    pub requests_per_hour: u32,
    pub min_interval: Duration,
    pub per_host: bool,
}

impl Default for RateGovernorConfig {
    fn default() -> Self {
        Self { requests_per_hour: 3600, min_interval: Duration::from_secs(1), per_host: false }
    }
}

struct Bucket {
    last_request: Option<Instant>,
    /// Timestamps of `await_slot` returns within the trailing hour, oldest
    /// first, used to enforce the rolling-window invariant.
    recent: Vec<Instant>,
}

impl Bucket {
    fn new() -> Self {
        Self { last_request: None, recent: Vec::new() }
    }
}

/// Single central governor; the FIFO queue guard (`AsyncMutex`) ensures
/// concurrent callers are served in arrival order rather than racing on
/// wakeup. The governor never sleeps while holding anything but its own
/// state.
pub struct RateGovernor {
    config: RateGovernorConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
    fifo: AsyncMutex<()>,
}

const GLOBAL_KEY: &str = "__global__";

impl RateGovernor {
    pub fn new(config: RateGovernorConfig) -> Self {
        Self { config, buckets: Mutex::new(HashMap::new()), fifo: AsyncMutex::new(()) }
    }

    fn interval(&self) -> Duration {
        let per_rate = Duration::from_secs_f64(3600.0 / self.config.requests_per_hour.max(1) as f64);
        per_rate.max(self.config.min_interval)
    }

    /// Returns no earlier than the wall-clock instant the caller is
    /// permitted to issue its next external request for `host`.
    pub async fn await_slot(&self, host: &str) {
        let _order = self.fifo.lock().await;

        let key = if self.config.per_host { host } else { GLOBAL_KEY };
        let interval = self.interval();

        let wait_until = {
            let mut buckets = self.buckets.lock();
            let bucket = buckets.entry(key.to_string()).or_insert_with(Bucket::new);
            let now = Instant::now();

            let cutoff = now.checked_sub(Duration::from_secs(3600)).unwrap_or(now);
            bucket.recent.retain(|t| *t >= cutoff);

            let target = match bucket.last_request {
                Some(last) => last + interval,
                None => now,
            };
            target.max(now)
        };

        if wait_until > Instant::now() {
            tokio::time::sleep(wait_until - Instant::now()).await;
        }

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert_with(Bucket::new);
        let now = Instant::now();
        bucket.last_request = Some(now);
        bucket.recent.push(now);
    }

    /// Number of `await_slot` returns within the trailing hour for `host`,
    /// used by the rolling-window test property.
    pub fn recent_count(&self, host: &str) -> usize {
        let key = if self.config.per_host { host } else { GLOBAL_KEY };
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert_with(Bucket::new);
        let cutoff = Instant::now().checked_sub(Duration::from_secs(3600)).unwrap_or_else(Instant::now);
        bucket.recent.retain(|t| *t >= cutoff);
        bucket.recent.len()
    }
}
