//! Randomness sources used for proxy and user-agent selection.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks an index uniformly from `0..len`.
///
/// Injected into the fetcher so tests can drive selection deterministically.
pub trait Chooser: Send + Sync {
    /// Return an index in `0..len`. Callers never pass `len == 0`.
    fn index(&self, len: usize) -> usize;
}

/// Chooser backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl Chooser for ThreadRandom {
    fn index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Chooser backed by a seeded RNG, reproducible across runs.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Chooser for SeededRandom {
    fn index(&self, len: usize) -> usize {
        self.rng.lock().random_range(0..len)
    }
}
