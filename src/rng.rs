// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fast, non-cryptographic PRNG used for weighted-random next-hop selection
//! and gossip timer jitter. Seeded once from a cryptographic entropy source
//! so that two process instances never produce the same sequence, but the
//! per-call generator itself is a cheap xorshift32, not a CSPRNG.

use parking_lot::Mutex;
use ring::rand::{SecureRandom, SystemRandom};

/// A xorshift32 generator. Never constructed with a zero state: `seeded()`
/// retries until it draws a nonzero seed, and `next_u32` cannot reach zero
/// from a nonzero input.
pub struct XorShiftRng {
    state: u32,
}

impl XorShiftRng {
    /// Seed from the process-wide cryptographic entropy source.
    pub fn seeded() -> Self {
        let rng = SystemRandom::new();
        let mut seed = 0u32;
        while seed == 0 {
            let mut bytes = [0u8; 4];
            rng.fill(&mut bytes)
                .expect("system entropy source unavailable");
            seed = u32::from_le_bytes(bytes);
        }
        XorShiftRng { state: seed }
    }

    /// Construct directly from a known nonzero state. Used by tests that
    /// need deterministic sequences; panics on a zero seed since xorshift32
    /// is absorbing at zero.
    pub fn from_seed(seed: u32) -> Self {
        assert_ne!(seed, 0, "xorshift32 seed must be nonzero");
        XorShiftRng { state: seed }
    }

    /// Draw the next pseudo-random u32.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Draw a float in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() as f64 / (u32::MAX as f64 + 1.0)) as f32
    }

    /// Draw an index in `[0, bound)`. Returns 0 if `bound` is 0.
    pub fn gen_range(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        (self.next_u32() as usize) % bound
    }
}

/// Thread-shared handle around a single `XorShiftRng`, matching the
/// reference implementation's one-PRNG-per-process convention while
/// giving callers interior mutability without unsafe.
pub struct SharedRng(Mutex<XorShiftRng>);

impl SharedRng {
    pub fn seeded() -> Self {
        SharedRng(Mutex::new(XorShiftRng::seeded()))
    }

    pub fn next_u32(&self) -> u32 {
        self.0.lock().next_u32()
    }

    pub fn next_f32(&self) -> f32 {
        self.0.lock().next_f32()
    }

    pub fn gen_range(&self, bound: usize) -> usize {
        self.0.lock().gen_range(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rng_is_never_zero_state() {
        for _ in 0..16 {
            let mut rng = XorShiftRng::seeded();
            assert_ne!(rng.next_u32(), 0);
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = XorShiftRng::from_seed(12345);
        let mut b = XorShiftRng::from_seed(12345);
        for _ in 0..8 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn gen_range_stays_in_bounds() {
        let mut rng = XorShiftRng::from_seed(777);
        for _ in 0..1000 {
            assert!(rng.gen_range(7) < 7);
        }
    }

    #[test]
    fn gen_range_zero_bound_is_zero() {
        let mut rng = XorShiftRng::from_seed(1);
        assert_eq!(rng.gen_range(0), 0);
    }
}
