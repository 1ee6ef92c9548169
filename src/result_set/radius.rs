//! Unbounded radius collector.

use crate::result_set::ResultSet;
use crate::types::{DatapointIndex, Neighbor};

/// Collects every candidate with `distance <= radius`.
///
/// Results are kept in arrival order; call [`RadiusResultSet::sort`] before
/// reading them when ascending order is wanted.
#[derive(Debug, Clone)]
pub struct RadiusResultSet {
    radius: f32,
    entries: Vec<Neighbor>,
}

impl RadiusResultSet {
    /// Collector for candidates within `radius`.
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            entries: Vec::new(),
        }
    }

    /// The acceptance radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Sort results ascending by distance, keeping arrival order for ties.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }

    /// Results in their current order.
    pub fn results(&self) -> &[Neighbor] {
        &self.entries
    }
}

impl ResultSet for RadiusResultSet {
    /// Always full: a radius search has no count target, so budgeted searches
    /// stop as soon as their budget runs out.
    fn full(&self) -> bool {
        true
    }

    fn add_point(&mut self, distance: f32, index: DatapointIndex) {
        if distance <= self.radius {
            self.entries.push(Neighbor::new(index, distance));
        }
    }

    fn worst_dist(&self) -> f32 {
        self.radius
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_inclusive() {
        let mut set = RadiusResultSet::new(1.0);
        set.add_point(1.0, 0);
        set.add_point(1.5, 1);
        set.add_point(0.2, 2);
        assert_eq!(set.len(), 2);
        assert_eq!(set.worst_dist(), 1.0);
        assert!(set.full());
    }

    #[test]
    fn test_sort() {
        let mut set = RadiusResultSet::new(10.0);
        set.add_point(3.0, 0);
        set.add_point(1.0, 1);
        set.add_point(3.0, 2);
        set.add_point(2.0, 3);
        set.sort();
        let ids: Vec<usize> = set.results().iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![1, 3, 0, 2]);
    }
}
