//! Park-Miller Victim Selection
//!
//! Minimal standard LCG (`seed * 16807 mod 2^31 - 1`) computed with
//! Schrage's method so that no intermediate overflows 32 bits. Each stealing
//! worker keeps its own state.

const A: i32 = 16807;
const M: i32 = 2_147_483_647;
const Q: i32 = 127_773; // M / A
const R: i32 = 2_836; // M % A

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParkMiller {
    seed: i32,
}

impl ParkMiller {
    pub const DEFAULT_SEED: i32 = 17;

    pub fn new(seed: i32) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> i32 {
        self.seed
    }

    /// Next value in `1..M`
    pub fn next_value(&mut self) -> i32 {
        let hi = self.seed / Q;
        let lo = self.seed % Q;
        let test = A * lo - R * hi;
        self.seed = if test > 0 { test } else { test + M };
        self.seed
    }

    /// Next value reduced to `0..n`
    pub fn next_below(&mut self, n: usize) -> usize {
        self.next_value() as usize % n
    }
}

impl Default for ParkMiller {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_sequence() {
        let mut rng = ParkMiller::new(1);
        assert_eq!(rng.next_value(), 16807);
        assert_eq!(rng.next_value(), 282_475_249);
        assert_eq!(rng.next_value(), 1_622_650_073);
    }

    #[test]
    fn test_default_seed() {
        let mut rng = ParkMiller::default();
        assert_eq!(rng.seed(), 17);
        assert_eq!(rng.next_value(), 17 * 16807);
    }

    #[test]
    fn test_matches_wide_arithmetic() {
        proptest!(|(seed in 1i32..M)| {
            let mut rng = ParkMiller::new(seed);
            let expected = (seed as i64 * A as i64) % M as i64;
            prop_assert_eq!(rng.next_value() as i64, expected);
        });
    }

    #[test]
    fn test_next_below_in_range() {
        proptest!(|(seed in 1i32..M, n in 1usize..64)| {
            let mut rng = ParkMiller::new(seed);
            for _ in 0..16 {
                prop_assert!(rng.next_below(n) < n);
            }
        });
    }
}
