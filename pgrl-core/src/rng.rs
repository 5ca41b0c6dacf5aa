// Every random decision in the crate (action sampling, env reset seeds, mini-batch shuffling)
// goes through this generator so that a single `seed` call makes a run reproducible.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;
use std::cell::RefCell;

thread_local! {
    pub static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
}

pub fn seed(seed: u64) {
    RNG.with_borrow_mut(|rng| *rng = StdRng::seed_from_u64(seed));
}

pub fn random_seed() -> u64 {
    RNG.with_borrow_mut(|rng| rng.random::<u64>())
}

/// Standard normal samples drawn from the crate generator.
pub fn standard_normal(n: usize) -> Vec<f32> {
    RNG.with_borrow_mut(|rng| {
        rng.sample_iter::<f32, _>(StandardNormal)
            .take(n)
            .collect()
    })
}
