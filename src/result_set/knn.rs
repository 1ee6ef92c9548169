//! Bounded k-nearest collectors.

use crate::result_set::ResultSet;
use crate::types::{DatapointIndex, Neighbor};
use rustc_hash::FxHashSet;

/// Keeps the `k` closest candidates, sorted ascending by distance.
///
/// Candidates with equal distance keep their insertion order. Once full, a
/// candidate is only accepted if it is strictly closer than the current
/// worst, which is then evicted.
#[derive(Debug, Clone)]
pub struct KnnResultSet {
    k: usize,
    radius: f32,
    entries: Vec<Neighbor>,
}

impl KnnResultSet {
    /// Collector for the `k` nearest candidates.
    pub fn new(k: usize) -> Self {
        Self::with_radius(k, f32::INFINITY)
    }

    /// Collector for at most `k` candidates within `radius`.
    pub fn with_radius(k: usize, radius: f32) -> Self {
        Self {
            k,
            radius,
            entries: Vec::with_capacity(k),
        }
    }

    /// Capacity.
    pub fn capacity(&self) -> usize {
        self.k
    }

    /// Sorted results.
    pub fn results(&self) -> &[Neighbor] {
        &self.entries
    }

    /// Take the results, leaving the collector empty.
    pub fn into_neighbors(self) -> Vec<Neighbor> {
        self.entries
    }

    #[inline]
    fn accepts(&self, distance: f32) -> bool {
        if distance.is_nan() || distance > self.radius {
            return false;
        }
        self.entries.len() < self.k || distance < self.worst_dist()
    }
}

impl ResultSet for KnnResultSet {
    #[inline]
    fn full(&self) -> bool {
        self.entries.len() >= self.k
    }

    fn add_point(&mut self, distance: f32, index: DatapointIndex) {
        if self.k == 0 || !self.accepts(distance) {
            return;
        }
        if self.entries.len() == self.k {
            self.entries.pop();
        }
        let pos = self.entries.partition_point(|n| n.distance <= distance);
        self.entries.insert(pos, Neighbor::new(index, distance));
    }

    #[inline]
    fn worst_dist(&self) -> f32 {
        if self.full() {
            match self.entries.last() {
                Some(n) => n.distance.min(self.radius),
                None => self.radius,
            }
        } else {
            self.radius
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn neighbors(&self) -> Vec<Neighbor> {
        self.entries.clone()
    }

    fn copy_into(&self, indices: &mut [DatapointIndex], dists: &mut [f32]) -> usize {
        super::write_neighbors(&self.entries, indices, dists)
    }
}

/// A [`KnnResultSet`] that ignores repeated indices.
///
/// Needed when the same point can be reached along several paths, such as
/// several LSH tables or probes.
#[derive(Debug, Clone)]
pub struct UniqueKnnResultSet {
    inner: KnnResultSet,
    seen: FxHashSet<DatapointIndex>,
}

impl UniqueKnnResultSet {
    /// Collector for the `k` nearest distinct indices.
    pub fn new(k: usize) -> Self {
        Self {
            inner: KnnResultSet::new(k),
            seen: FxHashSet::default(),
        }
    }

    /// Sorted results.
    pub fn results(&self) -> &[Neighbor] {
        self.inner.results()
    }
}

impl ResultSet for UniqueKnnResultSet {
    fn full(&self) -> bool {
        self.inner.full()
    }

    fn add_point(&mut self, distance: f32, index: DatapointIndex) {
        if self.seen.contains(&index) {
            return;
        }
        let before = self.inner.len();
        let worst = self.inner.worst_dist();
        self.inner.add_point(distance, index);
        // Accepted candidates are remembered; rejected ones would be
        // rejected again with the same distance.
        if self.inner.len() != before || distance < worst {
            self.seen.insert(index);
        }
    }

    fn worst_dist(&self) -> f32 {
        self.inner.worst_dist()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&mut self) {
        self.inner.clear();
        self.seen.clear();
    }

    fn neighbors(&self) -> Vec<Neighbor> {
        self.inner.neighbors()
    }

    fn copy_into(&self, indices: &mut [DatapointIndex], dists: &mut [f32]) -> usize {
        self.inner.copy_into(indices, dists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_NEIGHBOR;

    #[test]
    fn test_knn_keeps_k_smallest_sorted() {
        let mut set = KnnResultSet::new(3);
        for (i, d) in [5.0, 1.0, 4.0, 2.0, 3.0, 0.5].iter().enumerate() {
            set.add_point(*d, i);
        }
        let dists: Vec<f32> = set.results().iter().map(|n| n.distance).collect();
        assert_eq!(dists, vec![0.5, 1.0, 2.0]);
        let ids: Vec<usize> = set.results().iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![5, 1, 3]);
    }

    #[test]
    fn test_worst_dist_infinite_until_full() {
        let mut set = KnnResultSet::new(2);
        assert!(set.worst_dist().is_infinite());
        set.add_point(1.0, 0);
        assert!(set.worst_dist().is_infinite());
        assert!(!set.full());
        set.add_point(3.0, 1);
        assert!(set.full());
        assert_eq!(set.worst_dist(), 3.0);
    }

    #[test]
    fn test_equal_to_worst_is_rejected() {
        let mut set = KnnResultSet::new(2);
        set.add_point(1.0, 0);
        set.add_point(2.0, 1);
        set.add_point(2.0, 2);
        let ids: Vec<usize> = set.results().iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut set = KnnResultSet::new(4);
        set.add_point(1.0, 10);
        set.add_point(1.0, 11);
        set.add_point(0.0, 12);
        set.add_point(1.0, 13);
        let ids: Vec<usize> = set.results().iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![12, 10, 11, 13]);
    }

    #[test]
    fn test_with_radius() {
        let mut set = KnnResultSet::with_radius(5, 2.0);
        assert_eq!(set.worst_dist(), 2.0);
        set.add_point(1.0, 0);
        set.add_point(2.0, 1);
        set.add_point(2.5, 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_zero_k_and_nan() {
        let mut set = KnnResultSet::new(0);
        set.add_point(1.0, 0);
        assert!(set.is_empty());

        let mut set = KnnResultSet::new(2);
        set.add_point(f32::NAN, 0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_copy_into_pads_with_sentinels() {
        let mut set = KnnResultSet::new(3);
        set.add_point(0.25, 8);
        let mut indices = [0usize; 3];
        let mut dists = [0.0f32; 3];
        assert_eq!(set.copy_into(&mut indices, &mut dists), 1);
        assert_eq!(indices, [8, NO_NEIGHBOR, NO_NEIGHBOR]);
        assert!(dists[2].is_infinite());
    }

    #[test]
    fn test_clear_reuses() {
        let mut set = KnnResultSet::new(2);
        set.add_point(1.0, 0);
        set.add_point(2.0, 1);
        set.clear();
        assert!(set.is_empty());
        assert!(set.worst_dist().is_infinite());
        assert!(set.entries.capacity() >= 2);
    }

    #[test]
    fn test_unique_suppresses_duplicates() {
        let mut set = UniqueKnnResultSet::new(3);
        set.add_point(1.0, 7);
        set.add_point(1.0, 7);
        set.add_point(0.5, 7);
        set.add_point(2.0, 3);
        let ids: Vec<usize> = set.results().iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![7, 3]);

        set.clear();
        set.add_point(1.0, 7);
        assert_eq!(set.len(), 1);
    }
}
