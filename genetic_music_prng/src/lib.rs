// Seeded random numbers for the genetic music engine.
//
// xoshiro256++ (Blackman & Vigna, 2019), state expanded from a single u64
// with SplitMix64. No RNG crate is involved, so a seed names the same
// evolutionary run on every platform and toolchain.
//
// The controller (`genetic_music::evolution`) builds one master generator
// from the config seed and forks a private stream for each stage that draws:
// population generation, selection and mutation. Extra draws in one stage
// therefore never shift the numbers another stage sees.
//
// Integer samplers are exact (rejection sampling, no modulo bias). Floats
// come from the top bits of the integer stream divided by a power of two.

use serde::{Deserialize, Serialize};

const F32_SCALE: f32 = (1u64 << 24) as f32;
const F64_SCALE: f64 = (1u64 << 53) as f64;

/// xoshiro256++ state. Serializable so a paused run can be resumed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvoRng {
    s: [u64; 4],
}

impl EvoRng {
    /// Equal seeds give equal streams.
    pub fn new(seed: u64) -> Self {
        let mut state = seed;
        let mut s = [0u64; 4];
        for word in &mut s {
            *word = splitmix64(&mut state);
        }
        EvoRng { s }
    }

    /// Split off a child generator. Takes one draw from `self`, so the
    /// children forked in a fixed order from one seed are always the same.
    pub fn fork(&mut self) -> Self {
        let mut state = self.next_u64();
        Self::new(splitmix64(&mut state))
    }

    pub fn next_u64(&mut self) -> u64 {
        let [s0, s1, s2, s3] = self.s;
        let out = s0.wrapping_add(s3).rotate_left(23).wrapping_add(s0);

        let t = s1 << 17;
        let s2 = s2 ^ s0;
        let s3 = s3 ^ s1;
        let s1 = s1 ^ s2;
        let s0 = s0 ^ s3;
        self.s = [s0, s1, s2 ^ t, s3.rotate_left(45)];

        out
    }

    /// High half of the next u64.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in [0, 1), 24 bits of precision.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / F32_SCALE
    }

    /// Uniform in [0, 1), 53 bits of precision.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / F64_SCALE
    }

    /// Uniform in `[0, bound)`. `bound` must be nonzero.
    fn below(&mut self, bound: u64) -> u64 {
        if bound.is_power_of_two() {
            return self.next_u64() & (bound - 1);
        }
        // Draws under this threshold would favour small results.
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return r % bound;
            }
        }
    }

    /// Uniform in `[low, high)`. Panics on an empty range.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "empty range {low}..{high}");
        low + self.below(high - low)
    }

    /// Uniform in `[low, high)`. Panics on an empty range.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Uniform in `[low, high]`.
    pub fn range_usize_inclusive(&mut self, low: usize, high: usize) -> usize {
        assert!(low <= high, "empty range {low}..={high}");
        low + self.below((high - low) as u64 + 1) as usize
    }

    /// Uniform in `[low, high]`; either bound may be negative.
    pub fn range_i32_inclusive(&mut self, low: i32, high: i32) -> i32 {
        assert!(low <= high, "empty range {low}..={high}");
        let span = (i64::from(high) - i64::from(low)) as u64 + 1;
        (i64::from(low) + self.below(span) as i64) as i32
    }

    /// Uniform in `[low, high]`. Used for MIDI pitches.
    pub fn range_u8_inclusive(&mut self, low: u8, high: u8) -> u8 {
        assert!(low <= high, "empty range {low}..={high}");
        low + self.below(u64::from(high - low) + 1) as u8
    }

    /// Index drawn with probability `weights[i] / sum(weights)`.
    ///
    /// `None` if there is nothing to draw (empty slice or all weights zero).
    pub fn weighted_index(&mut self, weights: &[u32]) -> Option<usize> {
        let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
        if total == 0 {
            return None;
        }
        let mut roll = self.below(total);
        for (i, &w) in weights.iter().enumerate() {
            let w = u64::from(w);
            if roll < w {
                return Some(i);
            }
            roll -= w;
        }
        None
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
