//! Injectable randomness for blink scheduling

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the random draws used by procedural animation
pub trait RandomSource: Send {
    /// Uniform draw in `[min, max]`
    fn uniform(&mut self, min: f64, max: f64) -> f64;

    /// `true` with the given probability
    fn chance(&mut self, probability: f64) -> bool;
}

/// [`RandomSource`] backed by `rand`'s standard generator
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    /// Deterministic generator, for tests and reproducible runs
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator seeded from the operating system
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.rng.random_bool(probability.clamp(0.0, 1.0))
    }
}
