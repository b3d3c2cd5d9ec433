//! Lottery PRNG
//!
//! A deterministic 31-bit linear congruential generator. A lottery draw
//! consumes one value, or two when more than 2^31 tickets are in play, so
//! a fixed seed replays the same sequence of scheduling decisions.

use crate::config::RAND_SEED;

const MULTIPLIER: u32 = 0x0138_D395;
const INCREMENT: u32 = 12_345;
const MASK: u32 = 0x7FFF_FFFF;

/// Number of distinct outputs.
const SPAN: u64 = 1 << 31;

/// Linear congruential generator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    /// Create a generator starting from `seed`.
    pub const fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Advance and return the next value in `[0, 2^31)`.
    pub fn next_u31(&mut self) -> u32 {
        self.state = MULTIPLIER.wrapping_mul(self.state).wrapping_add(INCREMENT) & MASK;
        self.state
    }

    /// Draw a value in `[0, bound)`. `bound` must be non-zero and at most
    /// 2^62.
    ///
    /// Bounds above 2^31 pick a 2^31-wide chunk from the high bits of a
    /// second output; the low bits of consecutive states are correlated.
    pub fn below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0 && bound <= 1 << 62);
        let low = u64::from(self.next_u31());
        if bound <= SPAN {
            return low % bound;
        }
        let chunks = bound.div_ceil(SPAN);
        let chunk = (u64::from(self.next_u31()) * chunks) >> 31;
        (chunk * SPAN + low) % bound
    }
}

impl Default for Lcg {
    fn default() -> Self {
        Self::new(RAND_SEED)
    }
}
