//! Result collectors.
//!
//! Every query owns one collector. Index searches feed candidates through
//! [`ResultSet::add_point`] and read [`ResultSet::worst_dist`] back as their
//! pruning bound.

mod knn;
mod radius;

pub use knn::{KnnResultSet, UniqueKnnResultSet};
pub use radius::RadiusResultSet;

use crate::types::{DatapointIndex, Neighbor, NO_NEIGHBOR};

/// A container accumulating `(index, distance)` candidates for one query.
pub trait ResultSet {
    /// Whether the collector holds as many results as it will keep.
    ///
    /// Budgeted searches only stop once the collector is full.
    fn full(&self) -> bool;

    /// Offer a candidate.
    fn add_point(&mut self, distance: f32, index: DatapointIndex);

    /// Distance a candidate has to beat to be accepted.
    fn worst_dist(&self) -> f32;

    /// Number of collected results.
    fn len(&self) -> usize;

    /// Whether nothing has been collected.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all results, keeping the allocation.
    fn clear(&mut self);

    /// Collected results in the collector's current order.
    fn neighbors(&self) -> Vec<Neighbor>;

    /// Copy results into flat output buffers.
    ///
    /// Slots past the number of results are filled with [`NO_NEIGHBOR`] and
    /// `f32::INFINITY`. Returns the number of real results written.
    fn copy_into(&self, indices: &mut [DatapointIndex], dists: &mut [f32]) -> usize {
        let found = self.neighbors();
        write_neighbors(&found, indices, dists)
    }
}

/// Write `found` into the output buffers, sentinel-padding the rest.
pub(crate) fn write_neighbors(
    found: &[Neighbor],
    indices: &mut [DatapointIndex],
    dists: &mut [f32],
) -> usize {
    let width = indices.len().min(dists.len());
    let written = found.len().min(width);
    for (slot, n) in found.iter().take(written).enumerate() {
        indices[slot] = n.index;
        dists[slot] = n.distance;
    }
    indices[written..].fill(NO_NEIGHBOR);
    dists[written..].fill(f32::INFINITY);
    written
}
