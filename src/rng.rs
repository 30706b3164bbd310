//! Program-scoped random number generation.
//!
//! All randomized primitives (`Prob`, `RandomElement`, `PickRandomly`) draw
//! from one seedable generator owned by the program, never from process-wide
//! state. Given the same seed and the same extensional input, two runs of the
//! update loop make identical draws.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_SEED: u64 = 0x5DEE_CE66_D1CE_5EED;

/// Seedable RNG facade owned by a [`crate::Program`].
#[derive(Debug)]
pub struct EngineRng {
    seed: u64,
    rng: StdRng,
}

impl EngineRng {
    pub fn new() -> EngineRng {
        EngineRng::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> EngineRng {
        EngineRng {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Reset the generator to a fresh stream for `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Spawn a child generator seeded from this one. Specialized routines
    /// hold their own child so their draws stay stable no matter how many
    /// draws other call sites make in between.
    pub fn fork(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.rng.gen())
    }

    /// Uniform draw in `[0, 1)`.
    pub fn f64(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Uniform index in `[0, n)`. `n` must be non-zero.
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }
}

impl Default for EngineRng {
    fn default() -> Self {
        Self::new()
    }
}
