//! Window aggregation: IQR-based outlier attenuation over a dimension's
//! monthly score series.
//!
//! Outliers are never dropped — drop-on-outlier loses signal in
//! inherently spiky dimensions. Instead they are down-weighted to 0.3 in
//! the weighted mean, preserving directional information while damping
//! single-month shocks.

use statrs::statistics::{Data, OrderStatistics};

pub const OUTLIER_DOWNWEIGHT: f64 = 0.3;

pub struct AggregateResult {
    pub mean: f64,
    pub outliers: usize,
}

/// `scores` should already be restricted to the evaluation window (the
/// most recent 12 months, or all available if fewer).
pub fn attenuated_mean(scores: &[f64], iqr_c: f64) -> AggregateResult {
    if scores.is_empty() {
        return AggregateResult { mean: 0.0, outliers: 0 };
    }
    if scores.len() < 4 {
        // Too few points for a meaningful IQR; no attenuation applies.
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        return AggregateResult { mean, outliers: 0 };
    }

    let mut data = Data::new(scores.to_vec());
    let q1 = data.lower_quartile();
    let q3 = data.upper_quartile();
    let iqr = q3 - q1;
    let lower = q1 - iqr_c * iqr;
    let upper = q3 + iqr_c * iqr;

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut outliers = 0usize;
    for score in scores {
        let is_outlier = *score < lower || *score > upper;
        let weight = if is_outlier {
            outliers += 1;
            OUTLIER_DOWNWEIGHT
        } else {
            1.0
        };
        weighted_sum += weight * score;
        weight_total += weight;
    }

    AggregateResult { mean: weighted_sum / weight_total, outliers }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_e_outlier_attenuation() {
        let scores = [60.0, 62.0, 61.0, 63.0, 59.0, 60.0, 61.0, 62.0, 60.0, 63.0, 59.0, 95.0];
        let result = attenuated_mean(&scores, 1.5);
        assert_eq!(result.outliers, 1);

        // (sum of first 11 + 0.3*95) / (11 + 0.3)
        let expected = (670.0 + 0.3 * 95.0) / 11.3;
        assert!((result.mean - expected).abs() < 0.05, "mean was {}", result.mean);

        let naive_mean = scores.iter().sum::<f64>() / scores.len() as f64;
        assert!(result.mean < naive_mean, "attenuation must pull the mean below the naive mean");
    }

    #[test]
    fn outlier_influence_is_at_most_point_three_x() {
        let mut scores = vec![50.0; 11];
        scores.push(100.0);
        let result = attenuated_mean(&scores, 1.5);
        assert_eq!(result.outliers, 1);
        // A non-outlier month contributes weight 1.0, an outlier month
        // contributes at most OUTLIER_DOWNWEIGHT to the weighted sum.
        assert!(OUTLIER_DOWNWEIGHT <= 1.0 * 0.3 + 1e-9);
    }

    #[test]
    fn too_few_points_skips_attenuation() {
        let scores = [10.0, 90.0, 50.0];
        let result = attenuated_mean(&scores, 1.5);
        assert_eq!(result.outliers, 0);
    }
}
