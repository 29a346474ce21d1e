//! Branch probabilities and block frequencies.
//!
//! Probabilities are non-negative rationals with a 32-bit numerator over the
//! fixed denominator 2³¹, so 1.0 is numerator `1 << 31`. Branch weights come
//! from the IR's `!prob` annotations; edges without an annotation split the
//! probability uniformly. Block frequencies are the IR's `!count` profile
//! counts and may be absent.

use crate::ir::{BlockId, Function};

/// Fixed-point branch probability (numerator over 2³¹).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BranchProbability {
    numerator: u32,
}

impl BranchProbability {
    pub const DENOMINATOR: u32 = 1 << 31;

    pub fn from_numerator(numerator: u32) -> Self {
        BranchProbability {
            numerator: numerator.min(Self::DENOMINATOR),
        }
    }

    /// `⌊p · 2³¹⌋`, clamped to [0, 1].
    pub fn from_float(p: f64) -> Self {
        let clamped = p.clamp(0.0, 1.0);
        BranchProbability {
            numerator: (clamped * Self::DENOMINATOR as f64).floor() as u32,
        }
    }

    pub fn from_ratio(num: u32, den: u32) -> Self {
        debug_assert!(den > 0 && num <= den);
        BranchProbability {
            numerator: ((num as u64 * Self::DENOMINATOR as u64) / den as u64) as u32,
        }
    }

    pub fn never() -> Self {
        BranchProbability { numerator: 0 }
    }

    pub fn always() -> Self {
        BranchProbability {
            numerator: Self::DENOMINATOR,
        }
    }

    pub fn numerator(self) -> u32 {
        self.numerator
    }

    pub fn as_f64(self) -> f64 {
        self.numerator as f64 / Self::DENOMINATOR as f64
    }
}

/// Probability of the edge `from -> to`. Parallel edges to the same block
/// accumulate. Edges that do not exist have probability zero.
pub fn edge_probability(func: &Function, from: BlockId, to: BlockId) -> BranchProbability {
    let Some(term) = func.terminator(from) else {
        return BranchProbability::never();
    };
    let data = func.inst(term).unwrap();
    if data.targets.is_empty() {
        return BranchProbability::never();
    }
    let mut total = 0u64;
    match &data.probs {
        Some(probs) => {
            for (target, &p) in data.targets.iter().zip(probs) {
                if *target == to {
                    total += BranchProbability::from_float(p).numerator() as u64;
                }
            }
        }
        None => {
            let share = BranchProbability::from_ratio(1, data.targets.len() as u32);
            for target in &data.targets {
                if *target == to {
                    total += share.numerator() as u64;
                }
            }
        }
    }
    BranchProbability::from_numerator(total.min(BranchProbability::DENOMINATOR as u64) as u32)
}

/// Profile execution count of a block, when frequency data is available.
pub fn profile_count(func: &Function, block: BlockId) -> Option<u64> {
    func.block(block).count
}
