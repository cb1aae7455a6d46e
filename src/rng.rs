//! Shared random source
//!
//! Every random decision the server makes (delay draws, chaos trials, error
//! codes, generated payloads) goes through one [`RandomSource`] owned by the
//! server state, so tests can substitute a seeded or scripted source.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::VecDeque;

/// Source of randomness shared by all request handlers
pub trait RandomSource: Send + Sync {
    /// Uniform integer in `[0, bound)`. Returns 0 when `bound` is 0 or 1.
    fn below(&self, bound: u64) -> u64;

    /// Fill `dest` with random bytes
    fn fill(&self, dest: &mut [u8]);
}

/// Uniform integer in the inclusive range `[lo, hi]`
pub fn uniform_inclusive(rng: &dyn RandomSource, lo: i64, hi: i64) -> i64 {
    if hi <= lo {
        return lo;
    }
    let span = (hi as i128 - lo as i128 + 1).min(u64::MAX as i128) as u64;
    (lo as i128 + rng.below(span) as i128) as i64
}

/// Pick one element of a non-empty slice uniformly
pub fn choose<T: Copy>(rng: &dyn RandomSource, items: &[T]) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    Some(items[rng.below(items.len() as u64) as usize])
}

/// Process-wide generator guarded by a lock
pub struct SharedRng {
    inner: Mutex<StdRng>,
}

impl SharedRng {
    /// Generator seeded from the operating system
    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for SharedRng {
    fn below(&self, bound: u64) -> u64 {
        if bound <= 1 {
            return 0;
        }
        self.inner.lock().gen_range(0..bound)
    }

    fn fill(&self, dest: &mut [u8]) {
        self.inner.lock().fill_bytes(dest);
    }
}

/// Replays a fixed list of draws.
///
/// Each call to [`RandomSource::below`] takes the next scripted value modulo
/// the bound; once the script is exhausted every draw returns 0. Byte fills
/// use the repeated `fill_byte`.
pub struct ScriptedRng {
    draws: Mutex<VecDeque<u64>>,
    fill_byte: u8,
}

impl ScriptedRng {
    pub fn new(draws: impl IntoIterator<Item = u64>) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
            fill_byte: 0xAB,
        }
    }

    pub fn with_fill_byte(mut self, byte: u8) -> Self {
        self.fill_byte = byte;
        self
    }

    /// Draws not yet consumed
    pub fn remaining(&self) -> usize {
        self.draws.lock().len()
    }
}

impl RandomSource for ScriptedRng {
    fn below(&self, bound: u64) -> u64 {
        let next = self.draws.lock().pop_front().unwrap_or(0);
        if bound == 0 {
            0
        } else {
            next % bound
        }
    }

    fn fill(&self, dest: &mut [u8]) {
        dest.fill(self.fill_byte);
    }
}
