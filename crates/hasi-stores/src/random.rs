//! Random values for `[random_<n>]` variables

use hasi_core::ParseError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Draws a uniform integer in `[0, n)` for every `[random_<n>]` read
pub struct RandomManager {
    rng: StdRng,
}

impl RandomManager {
    /// Seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence for tests and replays
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Parse the range of `[random_<n>]`; `n` must be a positive integer
    pub fn validate(name: &str) -> Result<u64, ParseError> {
        match name.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ParseError::InvalidRandomVariable {
                name: name.to_string(),
            }),
        }
    }

    /// Value of `[random_<name>]`; invalid ranges read as 0
    pub fn get_random(&mut self, name: &str) -> f64 {
        match Self::validate(name) {
            Ok(n) => self.rng.gen_range(0..n) as f64,
            Err(_) => 0.0,
        }
    }
}

impl Default for RandomManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RandomManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomManager").finish_non_exhaustive()
    }
}
