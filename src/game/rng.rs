//! Per-match deterministic random stream
//!
//! Each match owns its own stream; nothing here is global. The seed bytes are
//! hashed into a ChaCha8 key so seeds of any length are accepted.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use super::fixed::Q16_ONE;

#[derive(Debug, Clone)]
pub struct RngStream {
    rng: ChaCha8Rng,
    draws: u64,
}

impl RngStream {
    pub fn from_seed_bytes(seed: &[u8]) -> Self {
        let key: [u8; 32] = Sha256::digest(seed).into();
        Self {
            rng: ChaCha8Rng::from_seed(key),
            draws: 0,
        }
    }

    /// Next value in `[0, 1)`
    pub fn next_unit(&mut self) -> f64 {
        self.draws += 1;
        self.rng.gen::<f64>()
    }

    /// Next value in `[0, Q16_ONE)`. Exact: the f64 draw is a multiple of
    /// 2^-53, so scaling by 2^16 and truncating loses nothing platform-specific.
    pub fn next_q16(&mut self) -> i64 {
        (self.next_unit() * Q16_ONE as f64) as i64
    }

    /// Number of values drawn so far
    pub fn draws(&self) -> u64 {
        self.draws
    }
}
