//! C11: projects the fused representation to a `(P×V)` numeric forecast.
//!
//! Output is in standardized space; callers invert via
//! `panel::normalizer::Normalizer::invert` at the inference boundary.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::model::init::sample_normal;

#[derive(Clone)]
pub struct Forecaster {
    d: usize,
    d_prime: usize,
    p: usize,
    v: usize,
    ffn1: DMatrix<f64>,
    ffn1_bias: DVector<f64>,
    ffn2: DMatrix<f64>,
    ffn2_bias: DVector<f64>,
    temporal: DMatrix<f64>,
    temporal_bias: DVector<f64>,
    output: DMatrix<f64>,
    output_bias: DVector<f64>,
    /// Validation MSE baked into the checkpoint at training time; part of
    /// the opaque confidence pass-through (Open Question resolution 2).
    validation_mse: f64,
}

impl Forecaster {
    pub fn seeded(d: usize, d_prime: usize, p: usize, v: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mk = |r: usize, c: usize, rng: &mut ChaCha8Rng| {
            let scale = (1.0 / c.max(1) as f64).sqrt();
            DMatrix::from_fn(r, c, |_, _| sample_normal(rng, scale))
        };
        Self {
            d,
            d_prime,
            p,
            v,
            ffn1: mk(d_prime, d, &mut rng),
            ffn1_bias: DVector::zeros(d_prime),
            ffn2: mk(d_prime, d_prime, &mut rng),
            ffn2_bias: DVector::zeros(d_prime),
            temporal: mk(p * d_prime, d_prime, &mut rng),
            temporal_bias: DVector::zeros(p * d_prime),
            output: mk(v, d_prime, &mut rng),
            output_bias: DVector::zeros(v),
            validation_mse: 0.08,
        }
    }

    pub fn param_count(d: usize, d_prime: usize, p: usize, v: usize) -> usize {
        d_prime * d
            + d_prime
            + d_prime * d_prime
            + d_prime
            + p * d_prime * d_prime
            + p * d_prime
            + v * d_prime
            + v
    }

    pub fn params(&self) -> Vec<f64> {
        let mut out = Vec::new();
        out.extend(self.ffn1.iter());
        out.extend(self.ffn1_bias.iter());
        out.extend(self.ffn2.iter());
        out.extend(self.ffn2_bias.iter());
        out.extend(self.temporal.iter());
        out.extend(self.temporal_bias.iter());
        out.extend(self.output.iter());
        out.extend(self.output_bias.iter());
        out
    }

    pub fn load_params(&mut self, params: &[f64]) {
        fn load_mat(m: &mut DMatrix<f64>, params: &[f64], cursor: &mut usize) {
            for v in m.iter_mut() {
                *v = params[*cursor];
                *cursor += 1;
            }
        }
        fn load_vec(v: &mut DVector<f64>, params: &[f64], cursor: &mut usize) {
            for x in v.iter_mut() {
                *x = params[*cursor];
                *cursor += 1;
            }
        }

        let mut cursor = 0usize;
        load_mat(&mut self.ffn1, params, &mut cursor);
        load_vec(&mut self.ffn1_bias, params, &mut cursor);
        load_mat(&mut self.ffn2, params, &mut cursor);
        load_vec(&mut self.ffn2_bias, params, &mut cursor);
        load_mat(&mut self.temporal, params, &mut cursor);
        load_vec(&mut self.temporal_bias, params, &mut cursor);
        load_mat(&mut self.output, params, &mut cursor);
        load_vec(&mut self.output_bias, params, &mut cursor);
    }

    pub fn set_validation_mse(&mut self, mse: f64) {
        self.validation_mse = mse;
    }

    /// Two-layer FFN to `D'`, a temporal projection expanding `D'` to `P`
    /// steps, then a shared linear projection to `V` per step.
    pub fn forecast(&self, fused: &[f64]) -> Vec<Vec<f64>> {
        let fused = DVector::from_row_slice(fused);
        let hidden1 = (&self.ffn1 * &fused + &self.ffn1_bias).map(|x| x.max(0.0));
        let hidden2 = (&self.ffn2 * &hidden1 + &self.ffn2_bias).map(|x| x.max(0.0));
        let temporal = &self.temporal * &hidden2 + &self.temporal_bias;

        let mut pred = Vec::with_capacity(self.p);
        for step in 0..self.p {
            let slice = temporal.rows(step * self.d_prime, self.d_prime).map(|x| x.max(0.0));
            let step_out = &self.output * &slice + &self.output_bias;
            pred.push(step_out.iter().copied().collect());
        }
        pred
    }

    /// Opaque heuristic pass-through (Open Question resolution 2): a
    /// monotonic function of the fusion weight's distance from the clamp
    /// midpoint and the validation MSE baked into the checkpoint. Not a
    /// calibrated probability — documented as a heuristic, not derived.
    pub fn confidence(&self, fusion_weight: f64, w_min: f64, w_max: f64) -> f64 {
        let midpoint = (w_min + w_max) / 2.0;
        let half_range = (w_max - w_min) / 2.0;
        let centeredness = if half_range > 0.0 {
            1.0 - ((fusion_weight - midpoint).abs() / half_range)
        } else {
            1.0
        };
        let mse_component = 1.0 / (1.0 + self.validation_mse);
        (0.5 * centeredness + 0.5 * mse_component).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forecast_shape_is_p_by_v() {
        let forecaster = Forecaster::seeded(128, 64, 12, 16, 3);
        let fused = vec![0.1; 128];
        let pred = forecaster.forecast(&fused);
        assert_eq!(pred.len(), 12);
        assert!(pred.iter().all(|step| step.len() == 16));
    }

    #[test]
    fn confidence_is_bounded() {
        let forecaster = Forecaster::seeded(8, 4, 2, 3, 1);
        let c = forecaster.confidence(0.2, 0.10, 0.30);
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn params_round_trip() {
        let mut forecaster = Forecaster::seeded(8, 4, 2, 3, 1);
        let params = forecaster.params();
        let mut other = Forecaster::seeded(8, 4, 2, 3, 2);
        other.load_params(&params);
        assert_eq!(other.params(), params);
    }
}
