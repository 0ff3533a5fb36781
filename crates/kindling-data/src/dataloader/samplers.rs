//! Sampling Strategies
//!
//! Index orderings for map-style inputs.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Trait for sampling strategies
pub trait Sampler: Send + Sync {
    /// Generate an iterator over sample indices
    fn sample_indices(&self, len: usize) -> Box<dyn Iterator<Item = usize> + Send>;

    /// Check if this sampler produces indices in random order
    fn is_random(&self) -> bool;

    /// Set random seed if applicable
    fn set_seed(&mut self, _seed: Option<u64>) {}
}

/// Sequential sampler that iterates through indices in order
#[derive(Debug, Clone, Default)]
pub struct SequentialSampler {
    start: usize,
    end: Option<usize>,
}

impl SequentialSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }
}

impl Sampler for SequentialSampler {
    fn sample_indices(&self, len: usize) -> Box<dyn Iterator<Item = usize> + Send> {
        let end = self.end.unwrap_or(len).min(len);
        Box::new(self.start.min(end)..end)
    }

    fn is_random(&self) -> bool {
        false
    }
}

/// Shuffles every index once per pass; seeded samplers repeat the same order
#[derive(Debug, Clone, Default)]
pub struct RandomSampler {
    seed: Option<u64>,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl Sampler for RandomSampler {
    fn sample_indices(&self, len: usize) -> Box<dyn Iterator<Item = usize> + Send> {
        let mut indices: Vec<usize> = (0..len).collect();
        match self.seed {
            Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => indices.shuffle(&mut rand::rng()),
        }
        Box::new(indices.into_iter())
    }

    fn is_random(&self) -> bool {
        true
    }

    fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }
}
