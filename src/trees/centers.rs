//! Initial cluster center selection for the k-means tree.
//!
//! Every strategy picks centers among the points it is given and may return
//! fewer than requested when the points do not hold enough distinct values.

use crate::config::CentersInit;
use crate::data_format::Matrix;
use crate::distance_measures::Distance;
use crate::types::{DatapointIndex, DatapointValue};
use crate::utils::RandomSampler;

/// Separation below which two candidate centers count as the same point.
pub(crate) const MIN_SEPARATION: f32 = 1e-16;

/// Pick up to `k` centers among `indices` with the given strategy.
///
/// The result holds dataset rows, never more than `k` and never more than the
/// number of distinct points in `indices`.
pub(crate) fn choose_centers<T: DatapointValue, D: Distance>(
    init: CentersInit,
    k: usize,
    indices: &[DatapointIndex],
    dataset: &Matrix<'_, T>,
    distance: &D,
    sampler: &mut RandomSampler,
) -> Vec<DatapointIndex> {
    if k == 0 || indices.is_empty() {
        return Vec::new();
    }
    match init {
        CentersInit::Random => random_centers(k, indices, dataset, distance, sampler),
        CentersInit::Gonzalez => gonzalez_centers(k, indices, dataset, distance, sampler),
        CentersInit::KMeansPP => kmeanspp_centers(k, indices, dataset, distance, sampler),
    }
}

/// Distinct points drawn uniformly without replacement.
fn random_centers<T: DatapointValue, D: Distance>(
    k: usize,
    indices: &[DatapointIndex],
    dataset: &Matrix<'_, T>,
    distance: &D,
    sampler: &mut RandomSampler,
) -> Vec<DatapointIndex> {
    let mut order: Vec<usize> = (0..indices.len()).collect();
    sampler.shuffle(&mut order);

    let mut centers: Vec<DatapointIndex> = Vec::with_capacity(k);
    for pos in order {
        if centers.len() == k {
            break;
        }
        let candidate = indices[pos];
        let row = dataset.row(candidate);
        let duplicate = centers
            .iter()
            .any(|&c| distance.eval(row, dataset.row(c), None) < MIN_SEPARATION);
        if !duplicate {
            centers.push(candidate);
        }
    }
    centers
}

/// Farthest-point traversal from a random first center.
fn gonzalez_centers<T: DatapointValue, D: Distance>(
    k: usize,
    indices: &[DatapointIndex],
    dataset: &Matrix<'_, T>,
    distance: &D,
    sampler: &mut RandomSampler,
) -> Vec<DatapointIndex> {
    let first = indices[sampler.random_index(indices.len())];
    let mut centers = vec![first];
    let mut closest: Vec<f32> = indices
        .iter()
        .map(|&i| distance.eval(dataset.row(i), dataset.row(first), None))
        .collect();

    while centers.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (pos, &d) in closest.iter().enumerate() {
            if best.map_or(true, |(_, b)| d > b) {
                best = Some((pos, d));
            }
        }
        let Some((pos, d)) = best else { break };
        if !(d >= MIN_SEPARATION) {
            break;
        }
        let center = indices[pos];
        centers.push(center);
        for (c, &i) in closest.iter_mut().zip(indices) {
            let d = distance.eval(dataset.row(i), dataset.row(center), None);
            if d < *c {
                *c = d;
            }
        }
    }
    centers
}

/// k-means++ seeding: each new center is drawn with probability
/// proportional to its distance from the closest center chosen so far.
fn kmeanspp_centers<T: DatapointValue, D: Distance>(
    k: usize,
    indices: &[DatapointIndex],
    dataset: &Matrix<'_, T>,
    distance: &D,
    sampler: &mut RandomSampler,
) -> Vec<DatapointIndex> {
    let first = indices[sampler.random_index(indices.len())];
    let mut centers = vec![first];
    let mut closest: Vec<f64> = indices
        .iter()
        .map(|&i| distance.eval(dataset.row(i), dataset.row(first), None) as f64)
        .collect();

    while centers.len() < k {
        let potential: f64 = closest.iter().sum();
        if !(potential >= MIN_SEPARATION as f64) {
            break;
        }

        // Cumulative sampling; zero-weight points are never picked unless
        // rounding leaves the draw past the end.
        let mut target = sampler.random_f64() * potential;
        let mut pos = indices.len() - 1;
        for (i, &d) in closest.iter().enumerate() {
            if target < d {
                pos = i;
                break;
            }
            target -= d;
        }
        if closest[pos] < MIN_SEPARATION as f64 {
            match closest.iter().rposition(|&d| d >= MIN_SEPARATION as f64) {
                Some(p) => pos = p,
                None => break,
            }
        }

        let center = indices[pos];
        centers.push(center);
        for (c, &i) in closest.iter_mut().zip(indices) {
            let d = distance.eval(dataset.row(i), dataset.row(center), None) as f64;
            if d < *c {
                *c = d;
            }
        }
    }
    centers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance_measures::SquaredL2;

    const ALL: [CentersInit; 3] = [CentersInit::Random, CentersInit::Gonzalez, CentersInit::KMeansPP];

    fn distinct(centers: &[usize], data: &[f32], dim: usize) -> bool {
        for (a, &i) in centers.iter().enumerate() {
            for &j in &centers[a + 1..] {
                if data[i * dim..(i + 1) * dim] == data[j * dim..(j + 1) * dim] {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn test_returns_k_distinct_centers() {
        let data: Vec<f32> = (0..200).map(|i| i as f32).collect();
        let view = Matrix::new(&data, 100, 2).unwrap();
        let indices: Vec<usize> = (0..100).collect();
        for init in ALL {
            let mut sampler = RandomSampler::with_seed(3);
            let centers = choose_centers(init, 8, &indices, &view, &SquaredL2, &mut sampler);
            assert_eq!(centers.len(), 8, "{:?}", init);
            assert!(distinct(&centers, &data, 2), "{:?}", init);
        }
    }

    #[test]
    fn test_coincident_points_truncate() {
        // Three distinct values among twenty points.
        let data: Vec<f32> = (0..20).map(|i| (i % 3) as f32).collect();
        let view = Matrix::new(&data, 20, 1).unwrap();
        let indices: Vec<usize> = (0..20).collect();
        for init in ALL {
            let mut sampler = RandomSampler::with_seed(9);
            let centers = choose_centers(init, 8, &indices, &view, &SquaredL2, &mut sampler);
            assert_eq!(centers.len(), 3, "{:?}", init);
            assert!(distinct(&centers, &data, 1), "{:?}", init);
        }
    }

    #[test]
    fn test_all_identical_points() {
        let data = vec![1.5f32; 30];
        let view = Matrix::new(&data, 10, 3).unwrap();
        let indices: Vec<usize> = (0..10).collect();
        for init in ALL {
            let mut sampler = RandomSampler::with_seed(1);
            let centers = choose_centers(init, 4, &indices, &view, &SquaredL2, &mut sampler);
            assert_eq!(centers.len(), 1, "{:?}", init);
        }
    }

    #[test]
    fn test_gonzalez_picks_far_points() {
        let data = [0.0f32, 0.1, 0.2, 10.0, 10.1, -10.0];
        let view = Matrix::new(&data, 6, 1).unwrap();
        let indices: Vec<usize> = (0..6).collect();
        let mut sampler = RandomSampler::with_seed(4);
        let mut centers =
            choose_centers(CentersInit::Gonzalez, 3, &indices, &view, &SquaredL2, &mut sampler);
        centers.sort_unstable();
        // One center per group.
        assert!(centers.iter().any(|&c| c <= 2));
        assert!(centers.iter().any(|&c| c == 3 || c == 4));
        assert!(centers.contains(&5));
    }

    #[test]
    fn test_subset_indices_only() {
        let data: Vec<f32> = (0..50).map(|i| i as f32).collect();
        let view = Matrix::new(&data, 50, 1).unwrap();
        let indices: Vec<usize> = (10..20).collect();
        for init in ALL {
            let mut sampler = RandomSampler::with_seed(2);
            let centers = choose_centers(init, 4, &indices, &view, &SquaredL2, &mut sampler);
            assert!(centers.iter().all(|c| indices.contains(c)), "{:?}", init);
        }
    }
}
