//! Random row sampling over dataset views.

use crate::data_format::dataset::DenseDataset;
use crate::data_format::matrix::Matrix;
use crate::types::DatapointValue;
use crate::utils::RandomSampler;

/// Copy `count` distinct random rows of `matrix` (all rows if `count` is
/// larger than the view).
pub fn random_sample<T: DatapointValue>(
    matrix: &Matrix<'_, T>,
    count: usize,
    sampler: &mut RandomSampler,
) -> DenseDataset<T> {
    let rows = sampler.sample_indices(matrix.rows(), count);
    DenseDataset::from_rows(matrix, rows)
}

/// Split `count` random rows off `matrix`.
///
/// Returns `(remaining, held_out)`: the held-out rows are removed from the
/// remaining set, so a held-out query never finds itself.
pub fn split_sample<T: DatapointValue>(
    matrix: &Matrix<'_, T>,
    count: usize,
    sampler: &mut RandomSampler,
) -> (DenseDataset<T>, DenseDataset<T>) {
    let n = matrix.rows();
    let mut held_out = sampler.sample_indices(n, count);
    held_out.sort_unstable();

    let mut taken = vec![false; n];
    for &i in &held_out {
        taken[i] = true;
    }
    let remaining = DenseDataset::from_rows(matrix, (0..n).filter(|&i| !taken[i]));
    let held_out = DenseDataset::from_rows(matrix, held_out);
    (remaining, held_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<f32> {
        (0..n).flat_map(|i| [i as f32, -(i as f32)]).collect()
    }

    #[test]
    fn test_random_sample_is_subset() {
        let data = grid(100);
        let view = Matrix::new(&data, 100, 2).unwrap();
        let mut sampler = RandomSampler::with_seed(1);
        let sample = random_sample(&view, 10, &mut sampler);
        assert_eq!(sample.size(), 10);
        for i in 0..sample.size() {
            let row = sample.get(i).unwrap();
            assert_eq!(row[0], -row[1]);
        }
    }

    #[test]
    fn test_split_sample_disjoint() {
        let data = grid(50);
        let view = Matrix::new(&data, 50, 2).unwrap();
        let mut sampler = RandomSampler::with_seed(9);
        let (rest, test) = split_sample(&view, 5, &mut sampler);
        assert_eq!(rest.size(), 45);
        assert_eq!(test.size(), 5);

        let rest_ids: Vec<f32> = (0..rest.size()).map(|i| rest.get(i).unwrap()[0]).collect();
        for i in 0..test.size() {
            assert!(!rest_ids.contains(&test.get(i).unwrap()[0]));
        }
    }
}
