//! C12: turns a repository's monthly panel into per-month dimension
//! scores and a window-aggregated `ScoreRecord`.
//!
//! Each channel's raw value is converted to a 0-100 percentile rank
//! against its own full history before being folded into a dimension;
//! this keeps dimensions comparable across repositories of wildly
//! different absolute scale (a 10-star repo and a 10,000-star repo both
//! rank their own `Stars` series against themselves).

use std::collections::BTreeMap;

use crate::models::{Channel, MonthKey, MonthlyPanel, ScoreRecord};

use super::aggregate::attenuated_mean;
use super::dimensions::{is_growth_type, Dimension};

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Minimum a computed dimension score is clamped up to.
    pub soft_floor: f64,
    /// Below this per-dimension data-quality fraction, a multiplicative
    /// penalty applies.
    pub quality_penalty_threshold: f64,
    /// Below this fraction, the dimension is skipped for the month
    /// entirely rather than merely penalized.
    pub quality_skip_threshold: f64,
    /// How many of the most recent scored months feed window aggregation.
    pub window_months: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            soft_floor: 30.0,
            quality_penalty_threshold: 0.7,
            quality_skip_threshold: 0.3,
            window_months: 12,
        }
    }
}

pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, panel: &MonthlyPanel) -> ScoreRecord {
        let axis = panel.axis();
        let n = axis.len();

        // Percentile-ranked, growth-substituted series per channel.
        let mut ranked: BTreeMap<Channel, Vec<Option<f64>>> = BTreeMap::new();
        for channel in Channel::ALL {
            let raw = panel.channel_series(channel);
            let substituted = if is_growth_type(channel) { substitute_growth(&raw) } else { raw };
            ranked.insert(channel, percentile_rank(&substituted));
        }

        let mut per_month: BTreeMap<MonthKey, BTreeMap<Dimension, f64>> = BTreeMap::new();
        let mut observed_cells = 0usize;
        let mut total_cells = 0usize;

        for i in 0..n {
            let mut month_scores = BTreeMap::new();
            for dim in Dimension::ALL {
                let weights = dim.channel_weights();
                let mut weighted_sum = 0.0;
                let mut weight_total = 0.0;
                let mut present = 0usize;
                for (channel, weight) in weights {
                    total_cells += 1;
                    if let Some(score) = ranked[channel][i] {
                        observed_cells += 1;
                        present += 1;
                        weighted_sum += weight * score;
                        weight_total += weight;
                    }
                }
                if weight_total <= 0.0 {
                    continue;
                }
                let quality = present as f64 / weights.len() as f64;
                if quality < self.config.quality_skip_threshold {
                    continue;
                }
                let mut score = weighted_sum / weight_total;
                if quality < self.config.quality_penalty_threshold {
                    let penalty = 1.0 - 0.3 * (self.config.quality_penalty_threshold - quality);
                    score *= penalty;
                }
                score = score.max(self.config.soft_floor);
                month_scores.insert(dim, score);
            }
            per_month.insert(axis[i], month_scores);
        }

        let window_start = n.saturating_sub(self.config.window_months);
        let window_months: Vec<MonthKey> = axis[window_start..].to_vec();

        let mut aggregate = BTreeMap::new();
        let mut outliers_attenuated = BTreeMap::new();
        for dim in Dimension::ALL {
            let series: Vec<f64> = window_months
                .iter()
                .filter_map(|m| per_month.get(m).and_then(|scores| scores.get(&dim)).copied())
                .collect();
            if series.is_empty() {
                continue;
            }
            let result = attenuated_mean(&series, dim.iqr_c());
            aggregate.insert(dim.as_str().to_string(), result.mean);
            outliers_attenuated.insert(dim.as_str().to_string(), result.outliers);
        }

        let overall = if aggregate.is_empty() {
            0.0
        } else {
            aggregate.values().sum::<f64>() / aggregate.len() as f64
        };

        let per_month_out = per_month
            .into_iter()
            .map(|(month, scores)| {
                let dims = scores.into_iter().map(|(d, v)| (d.as_str().to_string(), v)).collect();
                (month.to_string(), dims)
            })
            .collect();

        let data_quality_fraction =
            if total_cells == 0 { 0.0 } else { observed_cells as f64 / total_cells as f64 };

        ScoreRecord {
            per_month: per_month_out,
            aggregate,
            overall,
            months_evaluated: window_months.len(),
            outliers_attenuated,
            data_quality_fraction,
        }
    }
}

/// Substitutes each present value with `max(current, mean of the trailing
/// 3-month window ending at that month)`, so a transient single-month dip
/// in an otherwise growing channel doesn't drag its percentile rank down.
fn substitute_growth(series: &[Option<f64>]) -> Vec<Option<f64>> {
    series
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let current = (*v)?;
            let start = i.saturating_sub(2);
            let window: Vec<f64> = series[start..=i].iter().filter_map(|x| *x).collect();
            let trailing_mean = window.iter().sum::<f64>() / window.len() as f64;
            Some(current.max(trailing_mean))
        })
        .collect()
}

/// Converts a channel's series to 0-100 percentile ranks against its own
/// observed values, using mid-rank (average rank for ties) so repeated
/// values share a score rather than breaking arbitrarily on index order.
fn percentile_rank(series: &[Option<f64>]) -> Vec<Option<f64>> {
    let observed: Vec<f64> = series.iter().filter_map(|v| *v).collect();
    if observed.len() < 2 {
        return series.iter().map(|v| v.map(|_| 50.0)).collect();
    }
    let n = observed.len() as f64;
    series
        .iter()
        .map(|v| {
            v.map(|x| {
                let less = observed.iter().filter(|&&o| o < x).count() as f64;
                let equal = observed.iter().filter(|&&o| o == x).count() as f64;
                ((less + 0.5 * equal) / n) * 100.0
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel_with_channel(channel: Channel, values: &[Option<f64>]) -> MonthlyPanel {
        let axis: Vec<MonthKey> =
            (1..=values.len() as u32).map(|m| MonthKey::new(2023, ((m - 1) % 12) + 1)).collect();
        let mut panel = MonthlyPanel::new(axis);
        for (i, v) in values.iter().enumerate() {
            panel.set(channel, i, *v);
        }
        panel
    }

    #[test]
    fn scenario_d_quality_penalty() {
        // Quality-penalty arithmetic per spec: a dimension scoring 80 with
        // a data-quality fraction of 0.4 is penalized to
        // 80 * (1 - 0.3*(0.7-0.4)) = 72.8.
        let config = ScoringConfig::default();
        let quality = 0.4;
        let penalty = 1.0 - 0.3 * (config.quality_penalty_threshold - quality);
        let penalized = 80.0 * penalty;
        assert!((penalized - 72.8).abs() < 1e-9);
    }

    #[test]
    fn percentile_rank_orders_low_to_high() {
        let series = vec![Some(10.0), Some(20.0), Some(30.0)];
        let ranks = percentile_rank(&series);
        let a = ranks[0].unwrap();
        let b = ranks[1].unwrap();
        let c = ranks[2].unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn sparse_dimension_is_skipped_below_quality_floor() {
        // ChangeRequestReviews present in only 2 of 12 months: quality
        // 2/12 = 0.167, below the skip threshold, so Quality is absent
        // from every month's per-dimension map.
        let mut values = vec![None; 12];
        values[0] = Some(5.0);
        values[6] = Some(7.0);
        let panel = panel_with_channel(Channel::ChangeRequestReviews, &values);
        let engine = ScoringEngine::new(ScoringConfig::default());
        let record = engine.score(&panel);
        for dims in record.per_month.values() {
            assert!(!dims.contains_key("Quality"));
        }
    }

    #[test]
    fn fully_observed_dimension_has_no_penalty() {
        let values: Vec<Option<f64>> = (0..12).map(|i| Some(50.0 + i as f64)).collect();
        let panel = panel_with_channel(Channel::BusFactor, &values);
        let engine = ScoringEngine::new(ScoringConfig::default());
        let record = engine.score(&panel);
        assert!(record.aggregate.contains_key("Risk"));
        assert!(record.overall > 0.0);
    }
}
