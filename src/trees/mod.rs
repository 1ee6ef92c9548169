//! Tree indexes.
//!
//! All trees keep their nodes in a [`NodePool`](crate::utils::NodePool)
//! owned by the index and address them by [`NodeId`]. Budgeted searches
//! share a min-heap of unexplored branches across every tree of an index.

pub(crate) mod centers;
pub(crate) mod kdtree;
pub(crate) mod kdtree_single;
pub(crate) mod kmeans_tree;

pub use kdtree::KdTreeIndex;
pub use kdtree_single::KdTreeSingleIndex;
pub use kmeans_tree::KMeansIndex;

use crate::data_format::Matrix;
use crate::types::{DatapointIndex, DatapointValue};
use crate::utils::NodeId;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Unexplored branches keyed by their distance bound, smallest first.
pub(crate) type BranchHeap = BinaryHeap<Reverse<(OrderedFloat<f32>, NodeId)>>;

/// Three-way partition of `ind` by `points[i][cutfeat]` against `cutval`.
///
/// Afterwards `ind[..lim1]` are below the cut, `ind[lim1..lim2]` equal to it
/// and `ind[lim2..]` above it.
pub(crate) fn plane_split<T: DatapointValue>(
    points: &Matrix<'_, T>,
    ind: &mut [DatapointIndex],
    cutfeat: usize,
    cutval: f32,
) -> (usize, usize) {
    let value = |i: DatapointIndex| points.row(i)[cutfeat].as_f32();
    let count = ind.len() as isize;

    let mut left: isize = 0;
    let mut right: isize = count - 1;
    loop {
        while left <= right && value(ind[left as usize]) < cutval {
            left += 1;
        }
        while left <= right && value(ind[right as usize]) >= cutval {
            right -= 1;
        }
        if left > right {
            break;
        }
        ind.swap(left as usize, right as usize);
        left += 1;
        right -= 1;
    }
    let lim1 = left as usize;

    right = count - 1;
    loop {
        while left <= right && value(ind[left as usize]) <= cutval {
            left += 1;
        }
        while left <= right && value(ind[right as usize]) > cutval {
            right -= 1;
        }
        if left > right {
            break;
        }
        ind.swap(left as usize, right as usize);
        left += 1;
        right -= 1;
    }
    (lim1, left as usize)
}

/// Split offset for a three-way partition of `count` points: the partition
/// boundary closest to the middle, or the middle itself when the equal range
/// straddles it.
#[inline]
pub(crate) fn split_index(lim1: usize, lim2: usize, count: usize) -> usize {
    if lim1 > count / 2 {
        lim1
    } else if lim2 < count / 2 {
        lim2
    } else {
        count / 2
    }
}
