//! Integration tests for the public index API.

use flann::prelude::*;
use rand::prelude::*;

fn uniform(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.gen::<f32>()).collect()
}

fn codes(n: usize, dim: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.gen()).collect()
}

/// Every float index type with small, seeded parameters.
fn float_params() -> Vec<IndexParams> {
    vec![
        IndexParams::Linear,
        KdTreeParams::new(4).with_random_seed(1).into(),
        KdTreeSingleParams::new(10).into(),
        KdTreeSingleParams::new(10).with_reorder(false).into(),
        KMeansParams::new(16).with_random_seed(2).into(),
        KMeansParams::new(8)
            .with_centers_init(CentersInit::KMeansPP)
            .with_trees(2)
            .with_random_seed(3)
            .into(),
        AutotunedParams::new(0.8).with_random_seed(4).into(),
    ]
}

fn assert_sorted(row: &[Neighbor]) {
    for w in row.windows(2) {
        assert!(w[0].distance <= w[1].distance, "{:?}", row);
    }
}

mod scenario_tests {
    use super::*;

    #[test]
    fn test_point_37_every_float_index() {
        let data = uniform(1000, 4, 37);
        let dataset = Matrix::new(&data, 1000, 4).unwrap();
        let query = Matrix::new(dataset.row(37), 1, 4).unwrap();
        for params in float_params() {
            let index = Index::build(dataset, params.clone(), SquaredL2).unwrap();
            let found = index.knn_search_vec(&query, 1, &SearchParams::unlimited()).unwrap();
            assert_eq!(found[0], vec![Neighbor::new(37, 0.0)], "{:?}", params);
        }
    }

    #[test]
    fn test_point_37_default_budgets() {
        let data = uniform(1000, 4, 37);
        let dataset = Matrix::new(&data, 1000, 4).unwrap();
        for params in float_params() {
            let index = Index::build(dataset, params.clone(), SquaredL2).unwrap();
            let mut result = KnnResultSet::new(1);
            index
                .find_neighbors(&mut result, dataset.row(37), &SearchParams::default())
                .unwrap();
            assert_eq!(result.results(), &[Neighbor::new(37, 0.0)], "{:?}", params);
        }
    }

    #[test]
    fn test_point_37_lsh() {
        let data = codes(1000, 4, 37);
        let dataset = Matrix::new(&data, 1000, 4).unwrap();
        let params = LshParams::default().with_random_seed(5);
        let index = Index::build(dataset, params.into(), Hamming).unwrap();
        let mut result = KnnResultSet::new(1);
        index
            .find_neighbors(&mut result, dataset.row(37), &SearchParams::default())
            .unwrap();
        let best = result.results()[0];
        assert_eq!(best.distance, 0.0);
        assert_eq!(dataset.row(best.index), dataset.row(37));
    }
}

mod linear_tests {
    use super::*;

    #[test]
    fn test_k1_matches_naive_argmin() {
        let data = uniform(500, 6, 1);
        let dataset = Matrix::new(&data, 500, 6).unwrap();
        let queries = uniform(40, 6, 2);
        let index = Index::build(dataset, IndexParams::Linear, SquaredL2).unwrap();

        for q in queries.chunks(6) {
            let mut best = (usize::MAX, f32::INFINITY);
            for (i, row) in dataset.iter().enumerate() {
                let d: f32 = row.iter().zip(q).map(|(a, b)| (a - b) * (a - b)).sum();
                if d < best.1 {
                    best = (i, d);
                }
            }
            let mut result = KnnResultSet::new(1);
            index.find_neighbors(&mut result, q, &SearchParams::default()).unwrap();
            assert_eq!(result.results()[0].index, best.0);
        }
    }

    #[test]
    fn test_other_distances() {
        let data = uniform(200, 5, 3);
        let dataset = Matrix::new(&data, 200, 5).unwrap();
        let query = Matrix::new(dataset.row(9), 1, 5).unwrap();

        let l1 = Index::build(dataset, IndexParams::Linear, L1).unwrap();
        let hell = Index::build(dataset, IndexParams::Linear, Hellinger).unwrap();
        let chi = Index::build(dataset, IndexParams::Linear, ChiSquare).unwrap();
        for found in [
            l1.knn_search_vec(&query, 3, &SearchParams::default()).unwrap(),
            hell.knn_search_vec(&query, 3, &SearchParams::default()).unwrap(),
            chi.knn_search_vec(&query, 3, &SearchParams::default()).unwrap(),
        ] {
            assert_eq!(found[0][0], Neighbor::new(9, 0.0));
            assert_sorted(&found[0]);
        }
    }
}

mod exactness_tests {
    use super::*;

    #[test]
    fn test_exact_modes_match_linear_distances() {
        let data = uniform(2000, 3, 4);
        let dataset = Matrix::new(&data, 2000, 3).unwrap();
        let queries = uniform(50, 3, 5);
        let queries = Matrix::new(&queries, 50, 3).unwrap();
        let linear = Index::build(dataset, IndexParams::Linear, SquaredL2).unwrap();
        let truth = linear.knn_search_vec(&queries, 7, &SearchParams::unlimited()).unwrap();

        for params in float_params() {
            let index = Index::build(dataset, params.clone(), SquaredL2).unwrap();
            let found = index.knn_search_vec(&queries, 7, &SearchParams::unlimited()).unwrap();
            for (f, t) in found.iter().zip(&truth) {
                let fd: Vec<f32> = f.iter().map(|n| n.distance).collect();
                let td: Vec<f32> = t.iter().map(|n| n.distance).collect();
                assert_eq!(fd, td, "{:?}", params);
            }
        }
    }

    #[test]
    fn test_results_sorted_for_every_index() {
        let data = uniform(1500, 8, 6);
        let dataset = Matrix::new(&data, 1500, 8).unwrap();
        let queries = uniform(30, 8, 7);
        let queries = Matrix::new(&queries, 30, 8).unwrap();
        for params in float_params() {
            let index = Index::build(dataset, params, SquaredL2).unwrap();
            for checks in [Checks::Limited(16), Checks::Autotuned, Checks::Unlimited] {
                let search = SearchParams::default().with_checks(checks);
                for row in index.knn_search_vec(&queries, 10, &search).unwrap() {
                    assert_eq!(row.len(), 10);
                    assert_sorted(&row);
                }
            }
        }
    }

    #[test]
    fn test_kdtree_single_eps_bound() {
        let data = uniform(3000, 4, 8);
        let dataset = Matrix::new(&data, 3000, 4).unwrap();
        let queries = uniform(40, 4, 9);
        let queries = Matrix::new(&queries, 40, 4).unwrap();
        let linear = Index::build(dataset, IndexParams::Linear, SquaredL2).unwrap();
        let tree = Index::build(dataset, KdTreeSingleParams::new(8).into(), SquaredL2).unwrap();

        let eps = 0.5;
        let truth = linear.knn_search_vec(&queries, 1, &SearchParams::default()).unwrap();
        let found = tree
            .knn_search_vec(&queries, 1, &SearchParams::default().with_eps(eps))
            .unwrap();
        for (f, t) in found.iter().zip(&truth) {
            assert!(f[0].distance <= t[0].distance * (1.0 + eps) + 1e-6);
        }
    }
}

mod recall_tests {
    use super::*;

    fn recall(found: &[Vec<Neighbor>], truth: &[Vec<Neighbor>]) -> usize {
        found
            .iter()
            .zip(truth)
            .map(|(f, t)| {
                let td: Vec<f32> = t.iter().map(|n| n.distance).collect();
                f.iter().filter(|n| td.contains(&n.distance)).count()
            })
            .sum()
    }

    #[test]
    fn test_kmeans_recall_monotone_in_checks() {
        let data = uniform(3000, 6, 10);
        let dataset = Matrix::new(&data, 3000, 6).unwrap();
        let queries = uniform(60, 6, 11);
        let queries = Matrix::new(&queries, 60, 6).unwrap();
        let linear = Index::build(dataset, IndexParams::Linear, SquaredL2).unwrap();
        let truth = linear.knn_search_vec(&queries, 5, &SearchParams::default()).unwrap();

        let index = Index::build(
            dataset,
            KMeansParams::new(32).with_random_seed(12).into(),
            SquaredL2,
        )
        .unwrap();
        let mut last = 0;
        for checks in [1, 4, 16, 64, 256, 1024, 4096] {
            let found = index.knn_search_vec(&queries, 5, &SearchParams::new(checks)).unwrap();
            let r = recall(&found, &truth);
            assert!(r >= last, "checks {}: {} < {}", checks, r, last);
            last = r;
        }
        assert_eq!(last, 60 * 5);
    }

    #[test]
    fn test_lsh_recall_monotone_in_tables() {
        let data = codes(2000, 8, 13);
        let dataset = Matrix::new(&data, 2000, 8).unwrap();
        let queries = codes(40, 8, 14);
        let queries = Matrix::new(&queries, 40, 8).unwrap();
        let linear = Index::build(dataset, IndexParams::Linear, Hamming).unwrap();
        let truth = linear.knn_search_vec(&queries, 3, &SearchParams::default()).unwrap();

        let mut last = 0;
        for tables in [1, 2, 4, 8, 16] {
            let params = LshParams::new(tables, 12, 2).with_random_seed(15);
            let index = Index::build(dataset, params.into(), Hamming).unwrap();
            let found = index.knn_search_vec(&queries, 3, &SearchParams::default()).unwrap();
            let r = recall(&found, &truth);
            assert!(r >= last, "tables {}: {} < {}", tables, r, last);
            last = r;
        }
        assert!(last > 0);
    }
}

mod boundary_tests {
    use super::*;

    #[test]
    fn test_k_larger_than_size() {
        let data = uniform(7, 3, 16);
        let dataset = Matrix::new(&data, 7, 3).unwrap();
        let query = Matrix::new(&data[..3], 1, 3).unwrap();
        for params in float_params() {
            let index = Index::build(dataset, params.clone(), SquaredL2).unwrap();
            let found = index.knn_search_vec(&query, 20, &SearchParams::default()).unwrap();
            assert_eq!(found[0].len(), 7, "{:?}", params);

            let mut indices = vec![0usize; 20];
            let mut dists = vec![0.0f32; 20];
            index
                .knn_search(&query, &mut indices, &mut dists, 20, &SearchParams::default())
                .unwrap();
            assert!(indices[..7].iter().all(|&i| i < 7));
            assert!(indices[7..].iter().all(|&i| i == NO_NEIGHBOR));
            assert!(dists[7..].iter().all(|d| d.is_infinite()));
        }
    }

    #[test]
    fn test_k_larger_than_size_lsh() {
        let data = codes(9, 2, 17);
        let dataset = Matrix::new(&data, 9, 2).unwrap();
        // Probing every key of a 4-bit table reaches every point.
        let index = Index::build(dataset, LshParams::new(1, 4, 4).into(), Hamming).unwrap();
        let query = Matrix::new(&data[..2], 1, 2).unwrap();
        let found = index.knn_search_vec(&query, 50, &SearchParams::default()).unwrap();
        assert_eq!(found[0].len(), 9);
    }

    #[test]
    fn test_empty_dataset() {
        let data: Vec<f32> = Vec::new();
        let dataset = Matrix::new(&data, 0, 3).unwrap();
        let query = [0.0f32; 3];
        for params in float_params() {
            let index = Index::build(dataset, params.clone(), SquaredL2).unwrap();
            let mut result = KnnResultSet::new(3);
            index
                .find_neighbors(&mut result, &query, &SearchParams::default())
                .unwrap();
            assert!(result.results().is_empty(), "{:?}", params);
        }
    }

    #[test]
    fn test_errors() {
        let data = uniform(50, 4, 18);
        let dataset = Matrix::new(&data, 50, 4).unwrap();
        let index = Index::new(dataset, KdTreeParams::default().into(), SquaredL2).unwrap();
        let mut result = KnnResultSet::new(1);
        let err = index
            .find_neighbors(&mut result, &data[..4], &SearchParams::default())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::FailedPrecondition);

        let index = Index::build(dataset, KdTreeParams::default().into(), SquaredL2).unwrap();
        let err = index
            .find_neighbors(&mut result, &data[..3], &SearchParams::default())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let queries = Matrix::new(&data[..8], 2, 4).unwrap();
        let mut indices = vec![0usize; 4];
        let mut dists = vec![0.0f32; 4];
        assert!(index
            .knn_search(&queries, &mut indices, &mut dists, 0, &SearchParams::default())
            .is_err());
        assert!(index
            .knn_search(&queries, &mut indices, &mut dists, 3, &SearchParams::default())
            .is_err());
        assert!(index
            .knn_search(&queries, &mut indices, &mut dists, 2, &SearchParams::new(0))
            .is_err());
        assert!(index
            .knn_search(&queries, &mut indices, &mut dists, 2, &SearchParams::default().with_eps(-1.0))
            .is_err());

        assert_eq!(
            Index::new(dataset, KMeansParams::new(1).into(), SquaredL2)
                .unwrap_err()
                .code(),
            ErrorCode::InvalidArgument
        );
        assert!(Index::new(dataset, KdTreeParams::default().into(), Hamming).is_err());
    }

    #[test]
    fn test_single_query_rejects_bad_search_params() {
        let data = uniform(100, 3, 19);
        let dataset = Matrix::new(&data, 100, 3).unwrap();
        let bad = [
            SearchParams::default().with_eps(f32::NAN),
            SearchParams::default().with_eps(-0.5),
            SearchParams::default().with_eps(f32::INFINITY),
            SearchParams::new(0),
        ];
        for params in float_params() {
            let index = Index::build(dataset, params.clone(), SquaredL2).unwrap();
            for search in &bad {
                let mut result = KnnResultSet::new(3);
                let err = index.find_neighbors(&mut result, &data[..3], search).unwrap_err();
                assert_eq!(err.code(), ErrorCode::InvalidArgument, "{:?} {:?}", params, search);
                assert!(result.results().is_empty());
            }
        }

        let bytes = codes(40, 4, 20);
        let lsh = Index::build(Matrix::new(&bytes, 40, 4).unwrap(), LshParams::new(2, 8, 1).into(), Hamming).unwrap();
        let mut result = KnnResultSet::new(1);
        let err = lsh
            .find_neighbors(&mut result, &bytes[..4], &bad[0])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}

mod radius_tests {
    use super::*;

    #[test]
    fn test_radius_search_counts_and_buffers() {
        // Points on a line at 0, 1, 2, ..., 99.
        let data: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let dataset = Matrix::new(&data, 100, 1).unwrap();
        let queries_data = [10.0f32, 50.5];
        let queries = Matrix::new(&queries_data, 2, 1).unwrap();

        for params in float_params() {
            let index = Index::build(dataset, params.clone(), SquaredL2).unwrap();
            let search = SearchParams::unlimited();
            // Squared radius 4 keeps points within distance 2.
            let hits = index.radius_search_vec(&queries, 4.0, &search).unwrap();
            let first: Vec<usize> = hits[0].iter().map(|n| n.index).collect();
            assert_eq!(first.len(), 5, "{:?}", params);
            assert_eq!(hits[0][0], Neighbor::new(10, 0.0));
            assert_eq!(hits[1].len(), 4);
            assert_sorted(&hits[0]);

            let mut indices = vec![0usize; 6];
            let mut dists = vec![0.0f32; 6];
            let total = index
                .radius_search(&queries, &mut indices, &mut dists, 4.0, &search)
                .unwrap();
            assert_eq!(total, 9);
            assert_eq!(indices[0], 10);
            assert_eq!(dists[0], 0.0);

            let capped = index
                .radius_search_vec(&queries, 4.0, &search.clone().with_max_neighbors(2))
                .unwrap();
            assert_eq!(capped[0].len(), 2);
            assert_eq!(capped[1].len(), 2);
            assert_eq!(capped[0][0].index, 10);
        }
    }

    #[test]
    fn test_radius_unsorted_has_same_hits() {
        let data = uniform(800, 2, 19);
        let dataset = Matrix::new(&data, 800, 2).unwrap();
        let index = Index::build(dataset, KdTreeSingleParams::new(6).into(), SquaredL2).unwrap();
        let query = Matrix::new(&data[..2], 1, 2).unwrap();
        let sorted = index
            .radius_search_vec(&query, 0.01, &SearchParams::default())
            .unwrap();
        let unsorted = index
            .radius_search_vec(&query, 0.01, &SearchParams::default().with_sorted(false))
            .unwrap();
        let mut a: Vec<usize> = sorted[0].iter().map(|n| n.index).collect();
        let mut b: Vec<usize> = unsorted[0].iter().map(|n| n.index).collect();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }
}

mod persistence_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_round_trip_every_index_through_files() {
        let data = uniform(1200, 5, 20);
        let dataset = Matrix::new(&data, 1200, 5).unwrap();
        let queries = uniform(25, 5, 21);
        let queries = Matrix::new(&queries, 25, 5).unwrap();
        let dir = tempfile::tempdir().unwrap();

        for (i, params) in float_params().into_iter().enumerate() {
            let index = Index::build(dataset, params.clone(), SquaredL2).unwrap();
            let path = dir.path().join(format!("index_{}.bin", i));
            index.save_to_file(&path).unwrap();

            let loaded = Index::load_from_file(dataset, &path, SquaredL2).unwrap();
            assert_eq!(loaded.index_type(), params.index_type());
            for search in [SearchParams::new(24), SearchParams::autotuned(), SearchParams::unlimited()] {
                assert_eq!(
                    index.knn_search_vec(&queries, 6, &search).unwrap(),
                    loaded.knn_search_vec(&queries, 6, &search).unwrap(),
                    "{:?}",
                    params
                );
            }
        }
    }

    #[test]
    fn test_round_trip_lsh() {
        let data = codes(600, 8, 22);
        let dataset = Matrix::new(&data, 600, 8).unwrap();
        let queries = codes(20, 8, 23);
        let queries = Matrix::new(&queries, 20, 8).unwrap();
        let index = Index::build(
            dataset,
            LshParams::new(6, 16, 2).with_random_seed(24).into(),
            Hamming,
        )
        .unwrap();
        let mut buf = Vec::new();
        index.save_index(&mut buf).unwrap();
        let loaded = Index::load(dataset, &mut buf.as_slice(), Hamming).unwrap();
        let search = SearchParams::default();
        assert_eq!(
            index.knn_search_vec(&queries, 4, &search).unwrap(),
            loaded.knn_search_vec(&queries, 4, &search).unwrap()
        );
    }

    #[test]
    fn test_corrupt_files_are_rejected() {
        let data = uniform(300, 3, 25);
        let dataset = Matrix::new(&data, 300, 3).unwrap();
        let index = Index::build(dataset, KdTreeParams::new(2).with_random_seed(1).into(), SquaredL2).unwrap();
        let mut buf = Vec::new();
        index.save_index(&mut buf).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&buf[..buf.len() / 2]).unwrap();
        drop(file);
        let err = Index::load_from_file(dataset, &path, SquaredL2).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DataLoss);

        let mut garbage = buf.clone();
        garbage[0] ^= 0xff;
        let err = Index::load(dataset, &mut garbage.as_slice(), SquaredL2).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DataLoss);

        // Same bytes, different distance.
        let err = Index::load(dataset, &mut buf.as_slice(), L1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DataLoss);
    }

    #[test]
    fn test_missing_file() {
        let data = uniform(10, 2, 26);
        let dataset = Matrix::new(&data, 10, 2).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(Index::load_from_file(dataset, dir.path().join("absent.bin"), SquaredL2).is_err());
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_params_json_round_trip() {
        for params in float_params() {
            let json = serde_json::to_string(&params).unwrap();
            let back: IndexParams = serde_json::from_str(&json).unwrap();
            assert_eq!(back, params);
        }
        let search = SearchParams::new(64).with_eps(0.2).with_max_neighbors(5);
        let json = serde_json::to_string(&search).unwrap();
        assert_eq!(serde_json::from_str::<SearchParams>(&json).unwrap(), search);
    }

    #[test]
    fn test_autotuned_parameters_include_selection() {
        let data = uniform(1500, 3, 21);
        let dataset = Matrix::new(&data, 1500, 3).unwrap();
        let params = AutotunedParams::new(0.8).with_sample_fraction(0.5).with_random_seed(6);
        let index = Index::build(dataset, params.into(), SquaredL2).unwrap();

        let IndexParams::Autotuned(tuned) = index.parameters() else {
            panic!("expected autotuned parameters");
        };
        let selected = tuned.selected.expect("selected configuration");
        assert_ne!(selected.index_type(), IndexType::Autotuned);
        let checks = tuned.tuned_checks.expect("tuned checks");

        // The reported configuration rebuilds an index answering the same way.
        let manual = Index::build(dataset, *selected, SquaredL2).unwrap();
        let queries = Matrix::new(&data[..30], 10, 3).unwrap();
        assert_eq!(
            manual
                .knn_search_vec(&queries, 3, &SearchParams::default().with_checks(checks))
                .unwrap(),
            index.knn_search_vec(&queries, 3, &SearchParams::autotuned()).unwrap()
        );
    }
}
