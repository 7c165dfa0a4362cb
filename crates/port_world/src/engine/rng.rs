//! Deterministic per-tick random stream.
//!
//! Every tick derives one splitmix64 stream from `(world_seed, tick)`.
//! Components draw from it in resolution order, so two runs with the same
//! seed and submissions consume identical values.

use super::types::WorldTime;

#[derive(Debug, Clone)]
pub struct TickRng {
    state: u64,
}

impl TickRng {
    pub fn new(world_seed: u64, tick: WorldTime) -> Self {
        let mut x = world_seed ^ 0x9E37_79B9_7F4A_7C15;
        x ^= tick.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        Self {
            state: splitmix64(x),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = splitmix64(self.state);
        self.state
    }

    /// Uniform value in [0, 1).
    pub fn next_fraction(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// True with the given probability.
    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_fraction() < probability
    }

    /// Uniform value in [low, high] (inclusive).
    pub fn range_u32(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        let span = (high - low + 1) as u64;
        low + (self.next_u64() % span) as u32
    }

    /// Uniform value in [low, high).
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + self.next_fraction() * (high - low)
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}
