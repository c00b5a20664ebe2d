//! The forecasting core: frozen text encoder, trainable series encoder,
//! adaptive fusion, forecaster head, and the numerical-gradient trainer
//! that fits the thin head end to end.

pub mod forecaster;
pub mod fusion;
pub(crate) mod init;
pub mod series_encoder;
pub mod text_encoder;
pub mod trainer;

pub use forecaster::Forecaster;
pub use fusion::AdaptiveFusion;
pub use series_encoder::SeriesEncoder;
pub use text_encoder::TextEncoder;
pub use trainer::Trainer;

use serde::{Deserialize, Serialize};

use crate::models::Sample;

/// On-disk shape of `GITPULSE_FORECASTER_CHECKPOINT`: the flat parameter
/// vector plus the dimensions it was trained at, so a checkpoint built for
/// a different history window or channel count is rejected up front
/// instead of silently misreading the parameter layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    pub v: usize,
    pub history_window: usize,
    pub horizon: usize,
    pub d: usize,
    pub params: Vec<f64>,
}

/// The trainable thin head: `SeriesEncoder` + `AdaptiveFusion` +
/// `Forecaster`. The frozen `TextEncoder` is held separately (it is
/// shared, read-only, across every repository and every training step).
#[derive(Clone)]
pub struct GitPulseModel {
    pub series_encoder: SeriesEncoder,
    pub fusion: AdaptiveFusion,
    pub forecaster: Forecaster,
}

pub struct PredictOutput {
    pub pred: Vec<Vec<f64>>,
    pub fusion_weight: f64,
}

impl GitPulseModel {
    pub fn seeded(v: usize, history_window: usize, horizon: usize, d: usize, seed: u64) -> Self {
        let d_prime = d / 2;
        Self {
            series_encoder: SeriesEncoder::seeded_with_dims(
                v,
                history_window,
                d,
                series_encoder::DEFAULT_HEADS,
                series_encoder::DEFAULT_LAYERS,
                seed,
            ),
            fusion: AdaptiveFusion::seeded(d, 0.10, 0.30, seed + 1),
            forecaster: Forecaster::seeded(d, d_prime, horizon, v, seed + 2),
        }
    }

    pub fn params(&self) -> Vec<f64> {
        let mut out = self.series_encoder.params();
        out.extend(self.fusion.params());
        out.extend(self.forecaster.params());
        out
    }

    pub fn load_params(&mut self, params: &[f64]) {
        let se_len = self.series_encoder.params().len();
        let fu_len = self.fusion.params().len();
        self.series_encoder.load_params(&params[..se_len]);
        self.fusion.load_params(&params[se_len..se_len + fu_len]);
        self.forecaster.load_params(&params[se_len + fu_len..]);
    }

    pub fn predict(&self, text_encoder: &TextEncoder, sample: &Sample) -> PredictOutput {
        let context = self.series_encoder.encode(&sample.hist);
        let d = context.ncols();
        let h = context.nrows();
        let mut ts_global = vec![0.0; d];
        for row in context.row_iter() {
            for (j, value) in row.iter().enumerate() {
                ts_global[j] += value / h as f64;
            }
        }

        let (text_vec, absent) = match &sample.text {
            Some(t) => {
                let enc = text_encoder.encode(t);
                (enc.vector, enc.absent)
            }
            None => (vec![0.0; d], true),
        };

        let fusion_out = self.fusion.fuse(&ts_global, &text_vec, absent);
        let pred = self.forecaster.forecast(&fusion_out.fused);
        PredictOutput { pred, fusion_weight: fusion_out.weight }
    }

    /// Mean squared error over standardized targets.
    pub fn loss(&self, text_encoder: &TextEncoder, samples: &[Sample]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        let mut count = 0usize;
        for sample in samples {
            let out = self.predict(text_encoder, sample);
            for (p_step, t_step) in out.pred.iter().zip(sample_target_by_step(sample).iter()) {
                for (p, t) in p_step.iter().zip(t_step.iter()) {
                    total += (p - t).powi(2);
                    count += 1;
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    pub fn to_checkpoint(&self, v: usize, history_window: usize, horizon: usize, d: usize) -> ModelCheckpoint {
        ModelCheckpoint { v, history_window, horizon, d, params: self.params() }
    }

    /// Reconstructs a model at the checkpoint's own dimensions and loads
    /// its weights. `expected_v`/`expected_history_window` guard against a
    /// checkpoint trained against a different channel list or history
    /// window silently producing garbage.
    pub fn from_checkpoint(
        ckpt: &ModelCheckpoint,
        expected_v: usize,
        expected_history_window: usize,
    ) -> Result<Self, String> {
        if ckpt.v != expected_v || ckpt.history_window != expected_history_window {
            return Err(format!(
                "checkpoint shape mismatch: have (v={}, h={}), need (v={}, h={})",
                ckpt.v, ckpt.history_window, expected_v, expected_history_window
            ));
        }
        let mut model = GitPulseModel::seeded(ckpt.v, ckpt.history_window, ckpt.horizon, ckpt.d, 0);
        if model.params().len() != ckpt.params.len() {
            return Err(format!(
                "checkpoint parameter count mismatch: have {}, need {}",
                ckpt.params.len(),
                model.params().len()
            ));
        }
        model.load_params(&ckpt.params);
        Ok(model)
    }
}

/// `Sample::target` is stored channel-major (`target[channel][step]`);
/// training and loss computation want it step-major to line up with the
/// forecaster's per-step output.
fn sample_target_by_step(sample: &Sample) -> Vec<Vec<f64>> {
    let p = sample.target.first().map(|c| c.len()).unwrap_or(0);
    let v = sample.target.len();
    (0..p).map(|step| (0..v).map(|c| sample.target[c][step]).collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonthKey;

    fn tiny_sample() -> Sample {
        let v = 4usize;
        let h = 8usize;
        let p = 2usize;
        Sample {
            hist: (0..v).map(|_| vec![0.1; h]).collect(),
            hist_mask: (0..v).map(|_| vec![true; h]).collect(),
            text: Some("fix bug in parser".to_string()),
            target: (0..v).map(|_| vec![0.2; p]).collect(),
            hist_axis: (1..=h as u32).map(|m| MonthKey::new(2023, m)).collect(),
            target_axis: vec![MonthKey::new(2024, 1), MonthKey::new(2024, 2)],
        }
    }

    #[test]
    fn predict_produces_p_by_v_forecast() {
        let model = GitPulseModel::seeded(4, 8, 2, 8, 1);
        let text_encoder = TextEncoder::seeded_with_dim(8, 1);
        let sample = tiny_sample();
        let out = model.predict(&text_encoder, &sample);
        assert_eq!(out.pred.len(), 2);
        assert!(out.pred.iter().all(|s| s.len() == 4));
        assert!(out.fusion_weight >= 0.10 && out.fusion_weight <= 0.30);
    }

    #[test]
    fn params_round_trip_across_whole_model() {
        let mut model = GitPulseModel::seeded(4, 8, 2, 8, 1);
        let params = model.params();
        let mut other = GitPulseModel::seeded(4, 8, 2, 8, 2);
        other.load_params(&params);
        assert_eq!(other.params(), params);
    }

    #[test]
    fn checkpoint_round_trips_and_rejects_shape_mismatch() {
        let model = GitPulseModel::seeded(4, 8, 2, 8, 1);
        let ckpt = model.to_checkpoint(4, 8, 2, 8);
        let restored = GitPulseModel::from_checkpoint(&ckpt, 4, 8).unwrap();
        assert_eq!(restored.params(), model.params());

        assert!(GitPulseModel::from_checkpoint(&ckpt, 5, 8).is_err());
    }

    #[test]
    fn loss_is_finite_and_nonnegative() {
        let model = GitPulseModel::seeded(4, 8, 2, 8, 1);
        let text_encoder = TextEncoder::seeded_with_dim(8, 1);
        let samples = vec![tiny_sample(), tiny_sample()];
        let loss = model.loss(&text_encoder, &samples);
        assert!(loss.is_finite());
        assert!(loss >= 0.0);
    }
}
