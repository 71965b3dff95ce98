//! An endless, reshuffled minibatch feed over a fixed training set.

use rand::prelude::*;
use rand::rngs::SmallRng;

/// Yields index minibatches over `0..n` forever.
///
/// Every pass visits each index exactly once in a fresh random order, split into batches of
/// `batch_size` (the final batch of a pass may be smaller). When a pass is exhausted the
/// indices are reshuffled and the next pass starts, so the iterator never returns `None`.
#[derive(Debug, Clone)]
pub struct InfiniteBatches {
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    rng: SmallRng,
}

impl InfiniteBatches {
    /// Creates a feed over `n` examples. `batch_size` is clamped to at least one.
    pub fn new(n: usize, batch_size: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        Self {
            order,
            batch_size: batch_size.max(1),
            cursor: 0,
            rng,
        }
    }

    /// Number of batches per pass over the data.
    pub fn batches_per_pass(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }
}

impl Iterator for InfiniteBatches {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.order.is_empty() {
            return Some(Vec::new());
        }
        if self.cursor >= self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(batch)
    }
}
