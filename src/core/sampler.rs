//! Seeded sampling for the three stochastic model inputs.
//!
//! The generator is a xorshift64* stream with splitmix64 seed mixing, owned
//! by this crate so that a fixed seed reproduces identical draws across runs
//! and across ports of the model. Triangular variates come from the
//! closed-form inverse CDF (one uniform per draw); beta variates are the
//! ratio of two gamma draws produced with the Marsaglia-Tsang squeeze method
//! (shape >= 1) and the u^(1/shape) boost for shape < 1.

use std::f64::consts::PI;

use super::types::{BetaShape, ModelError, Triangular};

pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derives an independent substream seed for one Monte Carlo trial. Keyed by
/// trial index so the draws for trial k do not depend on how many trials ran
/// before it or on which worker ran it.
pub fn derive_trial_seed(base_seed: u64, trial_index: u32) -> u64 {
    splitmix64(base_seed ^ ((trial_index as u64) << 1 | 1))
}

pub struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        // xorshift locks up on the all-zero state.
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self {
            state,
            cached_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform draw in the open interval (0, 1).
    pub fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    /// Standard normal via Box-Muller, second variate cached.
    pub fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }
}

/// Inverse-CDF triangular variate. For `u` uniform in (0, 1):
/// `min + sqrt(u (max-min)(mode-min))` when `u` falls below the mode's CDF
/// value, otherwise `max - sqrt((1-u)(max-min)(max-mode))`.
pub fn sample_triangular(dist: Triangular, rng: &mut Rng) -> f64 {
    let span = dist.max - dist.min;
    if span <= 0.0 {
        return dist.min;
    }

    let u = rng.next_f64();
    let cut = (dist.mode - dist.min) / span;
    if u < cut {
        dist.min + (u * span * (dist.mode - dist.min)).sqrt()
    } else {
        dist.max - ((1.0 - u) * span * (dist.max - dist.mode)).sqrt()
    }
}

/// Beta variate as `ga / (ga + gb)` over two unit-scale gamma draws.
pub fn sample_beta(shape: BetaShape, rng: &mut Rng) -> f64 {
    let ga = sample_gamma(shape.alpha, rng);
    let gb = sample_gamma(shape.beta, rng);
    let sum = ga + gb;
    if sum > 0.0 { ga / sum } else { shape.mean() }
}

pub fn triangular(dist: Triangular, n: usize, rng: &mut Rng) -> Result<Vec<f64>, ModelError> {
    dist.validate("triangular")?;
    Ok((0..n).map(|_| sample_triangular(dist, rng)).collect())
}

pub fn beta(shape: BetaShape, n: usize, rng: &mut Rng) -> Result<Vec<f64>, ModelError> {
    shape.validate("beta")?;
    Ok((0..n).map(|_| sample_beta(shape, rng)).collect())
}

/// Marsaglia-Tsang gamma variate with unit scale. Shapes below 1 are boosted
/// through `gamma(shape + 1) * u^(1/shape)`.
fn sample_gamma(shape: f64, rng: &mut Rng) -> f64 {
    if shape < 1.0 {
        let boost = rng.next_f64().powf(1.0 / shape);
        return sample_gamma(shape + 1.0, rng) * boost;
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = rng.standard_normal();
        let v = 1.0 + c * x;
        if v <= 0.0 {
            continue;
        }
        let v = v * v * v;
        let u = rng.next_f64();
        if u < 1.0 - 0.0331 * x * x * x * x {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}
