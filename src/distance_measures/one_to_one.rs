//! Distance functors between pairs of vectors.
//!
//! All functors accumulate in `f32`. The accumulating ones check the running
//! sum against `worst` every four dimensions and stop as soon as it is
//! exceeded; the returned value is then a lower bound that is still `>= worst`.

use crate::distance_measures::Distance;
use crate::types::DatapointValue;

/// Accumulate `term(a_i, b_i)` with a blockwise early exit.
#[inline(always)]
fn accumulate<A, B, F>(a: &[A], b: &[B], worst: Option<f32>, term: F) -> f32
where
    A: DatapointValue,
    B: DatapointValue,
    F: Fn(f32, f32) -> f32,
{
    debug_assert_eq!(a.len(), b.len());
    let limit = worst.filter(|&w| w > 0.0);
    let len = a.len().min(b.len());
    let blocks = len - len % 4;

    let mut result = 0.0f32;
    let mut i = 0;
    while i < blocks {
        let d0 = term(a[i].as_f32(), b[i].as_f32());
        let d1 = term(a[i + 1].as_f32(), b[i + 1].as_f32());
        let d2 = term(a[i + 2].as_f32(), b[i + 2].as_f32());
        let d3 = term(a[i + 3].as_f32(), b[i + 3].as_f32());
        result += d0 + d1 + d2 + d3;
        i += 4;
        if let Some(w) = limit {
            if result > w {
                return result;
            }
        }
    }
    for j in blocks..len {
        result += term(a[j].as_f32(), b[j].as_f32());
    }
    result
}

/// Squared Euclidean distance (no square root).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SquaredL2;

impl Distance for SquaredL2 {
    const NAME: &'static str = "squared_l2";

    #[inline]
    fn eval<A: DatapointValue, B: DatapointValue>(
        &self,
        a: &[A],
        b: &[B],
        worst: Option<f32>,
    ) -> f32 {
        accumulate(a, b, worst, |x, y| {
            let d = x - y;
            d * d
        })
    }

    #[inline]
    fn accum_dist(&self, a: f32, b: f32) -> f32 {
        let d = a - b;
        d * d
    }

    /// Euclidean distance.
    #[inline]
    fn to_metric(&self, distance: f32) -> f32 {
        distance.max(0.0).sqrt()
    }
}

/// Manhattan distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L1;

impl Distance for L1 {
    const NAME: &'static str = "l1";

    #[inline]
    fn eval<A: DatapointValue, B: DatapointValue>(
        &self,
        a: &[A],
        b: &[B],
        worst: Option<f32>,
    ) -> f32 {
        accumulate(a, b, worst, |x, y| (x - y).abs())
    }

    #[inline]
    fn accum_dist(&self, a: f32, b: f32) -> f32 {
        (a - b).abs()
    }
}

/// Squared Hellinger distance for non-negative histograms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hellinger;

impl Distance for Hellinger {
    const NAME: &'static str = "hellinger";

    #[inline]
    fn eval<A: DatapointValue, B: DatapointValue>(
        &self,
        a: &[A],
        b: &[B],
        worst: Option<f32>,
    ) -> f32 {
        accumulate(a, b, worst, |x, y| self.accum_dist(x, y))
    }

    #[inline]
    fn accum_dist(&self, a: f32, b: f32) -> f32 {
        let d = a.max(0.0).sqrt() - b.max(0.0).sqrt();
        d * d
    }
}

/// Chi-square distance for non-negative histograms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChiSquare;

impl Distance for ChiSquare {
    const NAME: &'static str = "chi_square";

    #[inline]
    fn eval<A: DatapointValue, B: DatapointValue>(
        &self,
        a: &[A],
        b: &[B],
        worst: Option<f32>,
    ) -> f32 {
        accumulate(a, b, worst, |x, y| self.accum_dist(x, y))
    }

    #[inline]
    fn accum_dist(&self, a: f32, b: f32) -> f32 {
        let sum = a + b;
        if sum > 0.0 {
            let d = a - b;
            d * d / sum
        } else {
            0.0
        }
    }
}

/// Number of differing bits between the elements' bit patterns.
///
/// Intended for binary descriptors stored as `u8` (or wider integer) words.
/// Hamming space has no per-dimension split geometry, so tree indexes reject
/// it; use the LSH or linear index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hamming;

impl Distance for Hamming {
    const NAME: &'static str = "hamming";
    const SPATIAL: bool = false;

    #[inline]
    fn eval<A: DatapointValue, B: DatapointValue>(
        &self,
        a: &[A],
        b: &[B],
        _worst: Option<f32>,
    ) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x.bit_pattern() ^ y.bit_pattern()).count_ones())
            .sum::<u32>() as f32
    }

    #[inline]
    fn accum_dist(&self, a: f32, b: f32) -> f32 {
        (a.to_bits() ^ b.to_bits()).count_ones() as f32
    }
}
