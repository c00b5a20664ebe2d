//! C6: fits and applies per-channel z-score standardization.
//!
//! Small stateless-computation structs over `&[f64]` returning typed
//! results, with named `const` floors instead of magic numbers.

use statrs::statistics::Statistics;

use crate::models::{Channel, ChannelStats, MonthlyPanel, NormalizationStats};

/// Floor on standard deviation to prevent division by zero.
const STD_FLOOR: f64 = 1e-6;

pub struct Normalizer;

impl Normalizer {
    /// Computes mean/std per channel from `panel` restricted to
    /// `[0, train_window)` months — the training window only, never
    /// touching the prediction window.
    pub fn fit(panel: &MonthlyPanel, train_window: usize) -> NormalizationStats {
        let mut per_channel = std::collections::BTreeMap::new();
        for channel in Channel::ALL {
            let series = panel.channel_series(channel);
            let window_end = train_window.min(series.len());
            let observed: Vec<f64> = series[..window_end].iter().filter_map(|v| *v).collect();

            let stats = if observed.len() < 2 {
                ChannelStats { mean: 0.0, std: 1.0 }
            } else {
                let mean = observed.as_slice().mean();
                let std = observed.as_slice().std_dev();
                ChannelStats { mean, std: std.max(STD_FLOOR) }
            };
            per_channel.insert(channel.as_str().to_string(), stats);
        }
        NormalizationStats { per_channel }
    }

    /// Standardizes `values` (one entry per axis position, aligned to
    /// `channel`). Absent cells are imputed to the channel mean *after*
    /// standardization (i.e. to zero), and a parallel observed-mask is
    /// returned so downstream code can distinguish observed zeros from
    /// imputed absences.
    pub fn apply(
        values: &[Option<f64>],
        channel: Channel,
        stats: &NormalizationStats,
    ) -> (Vec<f64>, Vec<bool>) {
        let cs = stats
            .per_channel
            .get(channel.as_str())
            .copied()
            .unwrap_or(ChannelStats { mean: 0.0, std: 1.0 });
        let mut out = Vec::with_capacity(values.len());
        let mut mask = Vec::with_capacity(values.len());
        for v in values {
            match v {
                Some(x) => {
                    out.push((x - cs.mean) / cs.std);
                    mask.push(true);
                }
                None => {
                    out.push(0.0);
                    mask.push(false);
                }
            }
        }
        (out, mask)
    }

    /// Inverse transform at the inference boundary.
    pub fn invert(standardized: &[f64], channel: Channel, stats: &NormalizationStats) -> Vec<f64> {
        let cs = stats
            .per_channel
            .get(channel.as_str())
            .copied()
            .unwrap_or(ChannelStats { mean: 0.0, std: 1.0 });
        standardized.iter().map(|z| z * cs.std + cs.mean).collect()
    }
}
