// crates/meshlora-rs-sim/src/rng.rs

use meshlora_rs::RandomSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded `RandomSource`; the same seed replays the same backoffs and hops.
#[derive(Debug, Clone)]
pub struct SimRandom {
    rng: StdRng,
}

impl SimRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SimRandom {
    fn random_range(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}
