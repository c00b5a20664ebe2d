//! Shared seeded-initialization helper for the model subsystem. `rand_distr`
//! isn't in the aligned dependency stack, so weight initialization uses a
//! small Box–Muller transform over `rand`'s uniform sampler directly.

use rand::Rng;

pub fn sample_normal(rng: &mut impl Rng, std: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std
}
