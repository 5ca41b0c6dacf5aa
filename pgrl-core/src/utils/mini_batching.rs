use super::batch::Batch;
use crate::rng::RNG;
use anyhow::Result;
use rand::seq::SliceRandom;

/// Walks a batch in shuffled mini-batches. The final mini-batch holds the remainder and may be
/// smaller than `mini_batch_size`.
pub struct MiniBatchIterator<'a> {
    batch: &'a Batch,
    indices: Vec<usize>,
    mini_batch_size: usize,
    current: usize,
}

impl<'a> MiniBatchIterator<'a> {
    pub fn new(batch: &'a Batch, mini_batch_size: usize) -> Self {
        let mut indices: Vec<usize> = (0..batch.len()).collect();
        RNG.with_borrow_mut(|rng| indices.shuffle(rng));
        Self {
            batch,
            indices,
            mini_batch_size: mini_batch_size.max(1),
            current: 0,
        }
    }
}

impl Iterator for MiniBatchIterator<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.indices.len() {
            return None;
        }
        let end = (self.current + self.mini_batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.current..end];
        self.current = end;
        Some(self.batch.select(batch_indices))
    }
}
