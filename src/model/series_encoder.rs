//! C9: multi-head self-attention stack over time, turning a `(H×V)`
//! numeric history into a `(H×D)` contextual representation.
//!
//! Self-attention was chosen over recurrence: it outperformed recurrent
//! alternatives by roughly 20% R² in ablation, the one architectural
//! choice pinned directly rather than left to implementer judgment.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::model::init::sample_normal;

pub const DEFAULT_D: usize = 128;
pub const DEFAULT_HEADS: usize = 4;
pub const DEFAULT_LAYERS: usize = 2;

#[derive(Clone)]
struct AttentionLayer {
    wq: DMatrix<f64>,
    wk: DMatrix<f64>,
    wv: DMatrix<f64>,
    wo: DMatrix<f64>,
    ffn1: DMatrix<f64>,
    ffn1_bias: DVector<f64>,
    ffn2: DMatrix<f64>,
    ffn2_bias: DVector<f64>,
}

impl AttentionLayer {
    fn seeded(d: usize, rng: &mut ChaCha8Rng) -> Self {
        let scale = (1.0 / d as f64).sqrt();
        let mk = |r: usize, c: usize, rng: &mut ChaCha8Rng| {
            DMatrix::from_fn(r, c, |_, _| sample_normal(rng, scale))
        };
        Self {
            wq: mk(d, d, rng),
            wk: mk(d, d, rng),
            wv: mk(d, d, rng),
            wo: mk(d, d, rng),
            ffn1: mk(d * 4, d, rng),
            ffn1_bias: DVector::zeros(d * 4),
            ffn2: mk(d, d * 4, rng),
            ffn2_bias: DVector::zeros(d),
        }
    }

    fn param_count(d: usize) -> usize {
        d * d * 4 + d * 4 * d + d * 4 + d * 4 * d + d
    }

    fn flatten_into(&self, out: &mut Vec<f64>) {
        out.extend(self.wq.iter());
        out.extend(self.wk.iter());
        out.extend(self.wv.iter());
        out.extend(self.wo.iter());
        out.extend(self.ffn1.iter());
        out.extend(self.ffn1_bias.iter());
        out.extend(self.ffn2.iter());
        out.extend(self.ffn2_bias.iter());
    }

    fn load_from(&mut self, params: &[f64], cursor: &mut usize) {
        let load_mat = |m: &mut DMatrix<f64>, params: &[f64], cursor: &mut usize| {
            for v in m.iter_mut() {
                *v = params[*cursor];
                *cursor += 1;
            }
        };
        let load_vec = |v: &mut DVector<f64>, params: &[f64], cursor: &mut usize| {
            for x in v.iter_mut() {
                *x = params[*cursor];
                *cursor += 1;
            }
        };
        load_mat(&mut self.wq, params, cursor);
        load_mat(&mut self.wk, params, cursor);
        load_mat(&mut self.wv, params, cursor);
        load_mat(&mut self.wo, params, cursor);
        load_mat(&mut self.ffn1, params, cursor);
        load_vec(&mut self.ffn1_bias, params, cursor);
        load_mat(&mut self.ffn2, params, cursor);
        load_vec(&mut self.ffn2_bias, params, cursor);
    }

    /// One pre-norm transformer encoder block: multi-head self-attention
    /// with a residual connection, then a feed-forward block with a
    /// residual connection. `x` is `(H×D)`.
    fn forward(&self, x: &DMatrix<f64>, heads: usize) -> DMatrix<f64> {
        let (h, d) = x.shape();
        let head_dim = d / heads;
        let normed = layer_norm(x);

        let q = &normed * self.wq.transpose();
        let k = &normed * self.wk.transpose();
        let v = &normed * self.wv.transpose();

        let mut attn_out = DMatrix::zeros(h, d);
        for head in 0..heads {
            let cols = head * head_dim..(head + 1) * head_dim;
            let qh = q.columns(cols.start, head_dim);
            let kh = k.columns(cols.start, head_dim);
            let vh = v.columns(cols.start, head_dim);

            let scores = qh * kh.transpose() / (head_dim as f64).sqrt();
            let attn = row_softmax(&scores);
            let out_h = attn * vh;
            attn_out.columns_mut(cols.start, head_dim).copy_from(&out_h);
        }
        let attn_proj = &attn_out * self.wo.transpose();
        let residual1 = x + attn_proj;

        let normed2 = layer_norm(&residual1);
        let ffn_hidden = (&normed2 * self.ffn1.transpose()).map(|v| v.max(0.0));
        let ffn_hidden = ffn_hidden.row_iter().enumerate().fold(
            DMatrix::zeros(h, self.ffn1.nrows()),
            |mut acc, (i, row)| {
                acc.set_row(i, &(row + self.ffn1_bias.transpose()));
                acc
            },
        );
        let ffn_hidden = ffn_hidden.map(|v| v.max(0.0));
        let ffn_out = &ffn_hidden * self.ffn2.transpose();
        let ffn_out = ffn_out.row_iter().enumerate().fold(
            DMatrix::zeros(h, d),
            |mut acc, (i, row)| {
                acc.set_row(i, &(row + self.ffn2_bias.transpose()));
                acc
            },
        );

        residual1 + ffn_out
    }
}

fn layer_norm(x: &DMatrix<f64>) -> DMatrix<f64> {
    let (h, d) = x.shape();
    let mut out = DMatrix::zeros(h, d);
    for i in 0..h {
        let row = x.row(i);
        let mean = row.mean();
        let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / d as f64;
        let std = (var + 1e-6).sqrt();
        for j in 0..d {
            out[(i, j)] = (x[(i, j)] - mean) / std;
        }
    }
    out
}

fn row_softmax(scores: &DMatrix<f64>) -> DMatrix<f64> {
    let (h, w) = scores.shape();
    let mut out = DMatrix::zeros(h, w);
    for i in 0..h {
        let row = scores.row(i);
        let max = row.max();
        let exp: Vec<f64> = row.iter().map(|s| (s - max).exp()).collect();
        let sum: f64 = exp.iter().sum();
        for j in 0..w {
            out[(i, j)] = exp[j] / sum;
        }
    }
    out
}

#[derive(Clone)]
pub struct SeriesEncoder {
    d: usize,
    heads: usize,
    history_window: usize,
    lift: DMatrix<f64>,
    lift_bias: DVector<f64>,
    pos_embedding: DMatrix<f64>,
    layers: Vec<AttentionLayer>,
}

impl SeriesEncoder {
    pub fn seeded(v: usize, history_window: usize, seed: u64) -> Self {
        Self::seeded_with_dims(v, history_window, DEFAULT_D, DEFAULT_HEADS, DEFAULT_LAYERS, seed)
    }

    pub fn seeded_with_dims(
        v: usize,
        history_window: usize,
        d: usize,
        heads: usize,
        num_layers: usize,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let scale = (1.0 / v as f64).sqrt();
        let lift = DMatrix::from_fn(d, v, |_, _| sample_normal(&mut rng, scale));
        let lift_bias = DVector::zeros(d);
        let pos_embedding = DMatrix::from_fn(history_window, d, |_, _| sample_normal(&mut rng, 0.02));
        let layers = (0..num_layers).map(|_| AttentionLayer::seeded(d, &mut rng)).collect();
        Self { d, heads, history_window, lift, lift_bias, pos_embedding, layers }
    }

    pub fn param_count(v: usize, history_window: usize, d: usize, num_layers: usize) -> usize {
        d * v + d + history_window * d + num_layers * AttentionLayer::param_count(d)
    }

    pub fn params(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(Self::param_count(
            self.lift.ncols(),
            self.history_window,
            self.d,
            self.layers.len(),
        ));
        out.extend(self.lift.iter());
        out.extend(self.lift_bias.iter());
        out.extend(self.pos_embedding.iter());
        for layer in &self.layers {
            layer.flatten_into(&mut out);
        }
        out
    }

    pub fn load_params(&mut self, params: &[f64]) {
        let mut cursor = 0usize;
        for v in self.lift.iter_mut() {
            *v = params[cursor];
            cursor += 1;
        }
        for v in self.lift_bias.iter_mut() {
            *v = params[cursor];
            cursor += 1;
        }
        for v in self.pos_embedding.iter_mut() {
            *v = params[cursor];
            cursor += 1;
        }
        for layer in &mut self.layers {
            layer.load_from(params, &mut cursor);
        }
    }

    /// `hist` is `V` channels each of length `H` (as produced by
    /// `panel::windower`). Returns the `(H×D)` contextual representation.
    pub fn encode(&self, hist: &[Vec<f64>]) -> DMatrix<f64> {
        let v = hist.len();
        let h = hist.first().map(|s| s.len()).unwrap_or(0);
        let mut input = DMatrix::zeros(h, v);
        for (channel_idx, series) in hist.iter().enumerate() {
            for (t, value) in series.iter().enumerate() {
                input[(t, channel_idx)] = *value;
            }
        }

        let mut x = &input * self.lift.transpose();
        for i in 0..h {
            let mut row = x.row_mut(i);
            row += self.lift_bias.transpose();
        }
        x += &self.pos_embedding;

        for layer in &self.layers {
            x = layer.forward(&x, self.heads);
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_shape_matches_h_by_d() {
        let encoder = SeriesEncoder::seeded(16, 8, 42);
        let hist: Vec<Vec<f64>> = (0..16).map(|_| vec![0.1; 8]).collect();
        let context = encoder.encode(&hist);
        assert_eq!(context.shape(), (8, DEFAULT_D));
    }

    #[test]
    fn params_round_trip() {
        let mut encoder = SeriesEncoder::seeded(16, 8, 1);
        let params = encoder.params();
        let mut zeroed = SeriesEncoder::seeded(16, 8, 2);
        zeroed.load_params(&params);
        assert_eq!(zeroed.params(), params);
    }
}
