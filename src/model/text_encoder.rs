//! C8: a fixed-width embedding of a text string via a frozen pretrained
//! transformer approximation with attention pooling.
//!
//! No transformer-training library is assumed available, so this takes
//! the pragmatic route: a frozen embedding table (loaded from a
//! checkpoint file when one is configured, deterministically seeded
//! otherwise — "pretrained" in the sense of being a fixed, never-updated
//! artifact) plus an attention pooling head whose weights are fixed at
//! construction time, never touched by `model::trainer`.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::model::init::sample_normal;

const VOCAB_SIZE: usize = 8192;
const BASE_DIM: usize = 64;
const HIDDEN_DIM: usize = 96;
/// Output width E, after projection, when no model `d` is threaded in
/// (e.g. standalone tests).
pub const DEFAULT_OUTPUT_DIM: usize = 128;
const SEED: u64 = 0x6769_7470_756c_7365; // "gitpulse" ascii bytes, fixed and reproducible

pub struct TextEncoding {
    pub vector: Vec<f64>,
    pub absent: bool,
}

/// Frozen weights: embedding table, attention-pooling query, and the two
/// projection layers. Never mutated after construction. `output_dim` is
/// threaded in at construction so it can be matched to the series
/// encoder's `d` — `AdaptiveFusion::fuse` requires both to agree.
pub struct TextEncoder {
    output_dim: usize,
    embedding: DMatrix<f64>,
    pool_query: DVector<f64>,
    proj1: DMatrix<f64>,
    bias1: DVector<f64>,
    proj2: DMatrix<f64>,
    bias2: DVector<f64>,
}

impl TextEncoder {
    /// Loads a checkpoint if `weights_path` is given, readable, and its
    /// projection width matches `output_dim`; otherwise falls back to
    /// deterministic seeded initialization at `output_dim`, per the
    /// design note's "pretrained or frozen-seeded" duality. A checkpoint
    /// built for a different `d` is rejected rather than silently used,
    /// since a width mismatch would otherwise surface as a panic deep in
    /// `AdaptiveFusion::fuse`.
    pub fn load_or_seeded(weights_path: Option<&std::path::Path>, output_dim: usize) -> Self {
        if let Some(path) = weights_path {
            if let Ok(bytes) = std::fs::read(path) {
                if let Ok(checkpoint) = serde_json::from_slice::<TextEncoderCheckpoint>(&bytes) {
                    let encoder = checkpoint.into_encoder();
                    if encoder.output_dim == output_dim {
                        return encoder;
                    }
                }
            }
        }
        Self::seeded_with_dim(output_dim, SEED)
    }

    pub fn seeded(seed: u64) -> Self {
        Self::seeded_with_dim(DEFAULT_OUTPUT_DIM, seed)
    }

    pub fn seeded_with_dim(output_dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let embedding = DMatrix::from_fn(VOCAB_SIZE, BASE_DIM, |_, _| sample_normal(&mut rng, 0.02));
        let pool_query = DVector::from_fn(BASE_DIM, |_, _| sample_normal(&mut rng, 0.02));
        let proj1 = DMatrix::from_fn(HIDDEN_DIM, BASE_DIM, |_, _| sample_normal(&mut rng, 0.02));
        let bias1 = DVector::zeros(HIDDEN_DIM);
        let proj2 = DMatrix::from_fn(output_dim, HIDDEN_DIM, |_, _| sample_normal(&mut rng, 0.02));
        let bias2 = DVector::zeros(output_dim);
        Self { output_dim, embedding, pool_query, proj1, bias1, proj2, bias2 }
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Deterministic whitespace/punctuation tokenizer with a fixed-seed
    /// hash into `[0, VOCAB_SIZE)` — never `HashMap`'s randomized default
    /// hasher, so the same text always yields the same token ids.
    fn tokenize(text: &str) -> Vec<usize> {
        text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|t| !t.is_empty())
            .map(|tok| fnv1a(tok.to_ascii_lowercase().as_bytes()) as usize % VOCAB_SIZE)
            .collect()
    }

    pub fn encode(&self, text: &str) -> TextEncoding {
        if text.trim().is_empty() {
            return TextEncoding { vector: vec![0.0; self.output_dim], absent: true };
        }

        let tokens = Self::tokenize(text);
        if tokens.is_empty() {
            return TextEncoding { vector: vec![0.0; self.output_dim], absent: true };
        }

        let token_vecs: Vec<DVector<f64>> =
            tokens.iter().map(|&t| self.embedding.row(t).transpose()).collect();

        let scores: Vec<f64> = token_vecs.iter().map(|v| v.dot(&self.pool_query)).collect();
        let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp_scores: Vec<f64> = scores.iter().map(|s| (s - max_score).exp()).collect();
        let sum: f64 = exp_scores.iter().sum();
        let weights: Vec<f64> = exp_scores.iter().map(|e| e / sum).collect();

        let mut pooled = DVector::zeros(BASE_DIM);
        for (w, v) in weights.iter().zip(token_vecs.iter()) {
            pooled += v * *w;
        }

        let hidden = (&self.proj1 * &pooled + &self.bias1).map(|x| x.tanh());
        let output = &self.proj2 * &hidden + &self.bias2;

        TextEncoding { vector: output.iter().copied().collect(), absent: false }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[derive(serde::Serialize, serde::Deserialize)]
struct TextEncoderCheckpoint {
    embedding: Vec<Vec<f64>>,
    pool_query: Vec<f64>,
    proj1: Vec<Vec<f64>>,
    bias1: Vec<f64>,
    proj2: Vec<Vec<f64>>,
    bias2: Vec<f64>,
}

impl TextEncoderCheckpoint {
    fn into_encoder(self) -> TextEncoder {
        let rows = |m: Vec<Vec<f64>>| -> DMatrix<f64> {
            let nrows = m.len();
            let ncols = m.first().map(|r| r.len()).unwrap_or(0);
            DMatrix::from_fn(nrows, ncols, |r, c| m[r][c])
        };
        let proj2 = rows(self.proj2);
        let output_dim = proj2.nrows();
        TextEncoder {
            output_dim,
            embedding: rows(self.embedding),
            pool_query: DVector::from_vec(self.pool_query),
            proj1: rows(self.proj1),
            bias1: DVector::from_vec(self.bias1),
            proj2,
            bias2: DVector::from_vec(self.bias2),
        }
    }
}
