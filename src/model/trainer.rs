//! Fits `GitPulseModel`'s thin head (`SeriesEncoder` + `AdaptiveFusion` +
//! `Forecaster`) by central-difference numerical gradients wrapped in an
//! Adam-family optimizer with decoupled weight decay.
//!
//! No autodiff/tensor crate appears in the aligned dependency stack (the
//! teacher and the rest of the pack carry none), so a hand-derived
//! backprop through the attention stack would be unverifiable without
//! running the toolchain. Numerical gradients trade compute for
//! correctness that can be reasoned about directly from the loss
//! function. Moment-update shape grounded on the wider pack's
//! `knhk-neural::optimizer`, adapted to this crate's plain-struct style.

use rayon::prelude::*;

use crate::models::Sample;

use super::text_encoder::TextEncoder;
use super::GitPulseModel;

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    /// Step size for the central-difference approximation.
    pub grad_epsilon: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-5,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 1e-4,
            grad_epsilon: 1e-4,
        }
    }
}

struct AdamState {
    m: Vec<f64>,
    v: Vec<f64>,
    step: u64,
}

impl AdamState {
    fn new(n: usize) -> Self {
        Self { m: vec![0.0; n], v: vec![0.0; n], step: 0 }
    }
}

pub struct Trainer {
    config: TrainerConfig,
    adam: AdamState,
}

impl Trainer {
    pub fn new(config: TrainerConfig, param_count: usize) -> Self {
        Self { adam: AdamState::new(param_count), config }
    }

    /// Central-difference gradient of `loss_fn` at `params`, one forward
    /// pair per parameter. Deliberately not parallelized internally —
    /// `fit_many` is where this crate's data parallelism lives, across
    /// repositories rather than across parameters.
    fn numerical_gradient(params: &[f64], eps: f64, loss_fn: impl Fn(&[f64]) -> f64) -> Vec<f64> {
        let mut grad = vec![0.0; params.len()];
        let mut probe = params.to_vec();
        for i in 0..params.len() {
            let original = probe[i];
            probe[i] = original + eps;
            let plus = loss_fn(&probe);
            probe[i] = original - eps;
            let minus = loss_fn(&probe);
            probe[i] = original;
            grad[i] = (plus - minus) / (2.0 * eps);
        }
        grad
    }

    /// One Adam update given a precomputed gradient.
    fn apply_gradient(&mut self, params: &mut [f64], grad: &[f64]) {
        self.adam.step += 1;
        let t = self.adam.step as f64;
        let bias_correction1 = 1.0 - self.config.beta1.powf(t);
        let bias_correction2 = 1.0 - self.config.beta2.powf(t);

        for i in 0..params.len() {
            self.adam.m[i] = self.config.beta1 * self.adam.m[i] + (1.0 - self.config.beta1) * grad[i];
            self.adam.v[i] =
                self.config.beta2 * self.adam.v[i] + (1.0 - self.config.beta2) * grad[i] * grad[i];

            let m_hat = self.adam.m[i] / bias_correction1;
            let v_hat = self.adam.v[i] / bias_correction2;

            // Decoupled weight decay (AdamW-style): applied directly to the
            // parameter, not folded into the gradient.
            params[i] -= self.config.learning_rate * self.config.weight_decay * params[i];
            params[i] -= self.config.learning_rate * m_hat / (v_hat.sqrt() + self.config.eps);
        }
    }

    /// One training step against a single repository's samples.
    pub fn step(&mut self, model: &mut GitPulseModel, text_encoder: &TextEncoder, samples: &[Sample]) -> f64 {
        let mut params = model.params();
        let grad = Self::numerical_gradient(&params, self.config.grad_epsilon, |p| {
            let mut trial = model.clone();
            trial.load_params(p);
            trial.loss(text_encoder, samples)
        });
        self.apply_gradient(&mut params, &grad);
        model.load_params(&params);
        model.loss(text_encoder, samples)
    }

    /// Data-parallel training across repositories: computes each
    /// repository's gradient concurrently via `rayon`, then applies
    /// their mean as one Adam step — avoiding the anti-pattern of N
    /// independent optimizer states drifting apart.
    pub fn fit_many(
        &mut self,
        model: &mut GitPulseModel,
        text_encoder: &TextEncoder,
        per_repo_samples: &[Vec<Sample>],
    ) -> f64 {
        let params = model.params();
        let grads: Vec<Vec<f64>> = per_repo_samples
            .par_iter()
            .filter(|samples| !samples.is_empty())
            .map(|samples| {
                Self::numerical_gradient(&params, self.config.grad_epsilon, |p| {
                    let mut trial = model.clone();
                    trial.load_params(p);
                    trial.loss(text_encoder, samples)
                })
            })
            .collect();

        if grads.is_empty() {
            return model.loss(text_encoder, &per_repo_samples.concat());
        }

        let n = params.len();
        let mut mean_grad = vec![0.0; n];
        for g in &grads {
            for i in 0..n {
                mean_grad[i] += g[i] / grads.len() as f64;
            }
        }

        let mut params = params;
        self.apply_gradient(&mut params, &mean_grad);
        model.load_params(&params);
        model.loss(text_encoder, &per_repo_samples.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonthKey;

    fn tiny_sample() -> Sample {
        let v = 2usize;
        let h = 4usize;
        let p = 1usize;
        Sample {
            hist: (0..v).map(|_| vec![0.1; h]).collect(),
            hist_mask: (0..v).map(|_| vec![true; h]).collect(),
            text: None,
            target: (0..v).map(|_| vec![0.2; p]).collect(),
            hist_axis: (1..=h as u32).map(|m| MonthKey::new(2023, m)).collect(),
            target_axis: vec![MonthKey::new(2024, 1)],
        }
    }

    #[test]
    fn training_step_does_not_increase_loss_catastrophically() {
        let mut model = GitPulseModel::seeded(2, 4, 1, 4, 1);
        let text_encoder = TextEncoder::seeded_with_dim(4, 1);
        let samples = vec![tiny_sample()];
        let before = model.loss(&text_encoder, &samples);

        let mut trainer = Trainer::new(
            TrainerConfig { learning_rate: 1e-3, grad_epsilon: 1e-3, ..Default::default() },
            model.params().len(),
        );
        let after = trainer.step(&mut model, &text_encoder, &samples);
        assert!(after.is_finite());
        assert!((before - after).abs() < 10.0);
    }
}
