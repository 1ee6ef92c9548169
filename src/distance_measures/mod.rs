//! Distance measures.
//!
//! A distance is a zero-sized functor implementing [`Distance`]. Indexes are
//! generic over the functor, so the inner loops monomorphize per metric.

mod one_to_one;

pub use one_to_one::*;

use crate::types::DatapointValue;
use std::fmt::Debug;

/// A pairwise distance between two equal-length vectors.
///
/// Implementations must be symmetric and return `0` for identical inputs.
/// Smaller values mean closer points.
pub trait Distance: Clone + Default + Send + Sync + Debug + 'static {
    /// Name recorded in persisted index headers.
    const NAME: &'static str;

    /// Whether the distance decomposes into per-dimension contributions that
    /// tree indexes can bound with a splitting plane.
    const SPATIAL: bool = true;

    /// Distance between `a` and `b`.
    ///
    /// When `worst` is `Some(w)` with `w > 0`, the computation may stop once
    /// the partial sum exceeds `w` and return that partial sum.
    fn eval<A: DatapointValue, B: DatapointValue>(
        &self,
        a: &[A],
        b: &[B],
        worst: Option<f32>,
    ) -> f32;

    /// Contribution of a single dimension, used for plane and bounding box
    /// bounds in tree searches.
    fn accum_dist(&self, a: f32, b: f32) -> f32;

    /// Convert an accumulated distance into a metric value.
    #[inline]
    fn to_metric(&self, distance: f32) -> f32 {
        distance
    }
}

/// Distance of a datapoint to an `f32` vector (cluster centers, means).
#[inline]
pub(crate) fn distance_to_f32<D: Distance, T: DatapointValue>(
    distance: &D,
    point: &[T],
    center: &[f32],
) -> f32 {
    distance.eval(point, center, None)
}
