//! Random sampling utilities.
//!
//! Builds never touch a global generator: every `build_index()` call creates
//! its own [`RandomSampler`] from the index's seed and threads it through the
//! build by `&mut`, so concurrent builds stay independent and reproducible.

use rand::prelude::*;
use rand::seq::SliceRandom;

/// Seeded random source for index construction.
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    /// Create a new sampler with a random seed.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a new sampler with a specific seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when `seed` is set, entropy-backed otherwise.
    pub fn from_option(seed: Option<u64>) -> Self {
        match seed {
            Some(s) => Self::with_seed(s),
            None => Self::new(),
        }
    }

    /// Seed for an independently seeded build.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Sample k unique indices from [0, n).
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        if k >= n {
            return (0..n).collect();
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.partial_shuffle(&mut self.rng, k);
        indices.truncate(k);
        indices
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Uniform index in [0, n). `n` must be non-zero.
    pub fn random_index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Get a random double in [0, 1).
    pub fn random_f64(&mut self) -> f64 {
        self.rng.gen()
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}
