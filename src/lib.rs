//! # FLANN - Fast Library for Approximate Nearest Neighbors
//!
//! Nearest neighbor search over dense vectors with a choice of exact and
//! approximate algorithms, all behind the same [`NnIndex`] interface.
//!
//! ## Overview
//!
//! - **Linear scan**: exact search, and the ground truth for everything else
//! - **Single k-d tree**: exact or `eps`-approximate search in low dimensions
//! - **Randomized k-d forest**: best-bin-first over several randomized trees
//! - **Hierarchical k-means tree**: best-bin-first over recursive clusterings
//! - **Multi-probe LSH**: hashing of integer features for Hamming search
//! - **Autotuning**: picks the algorithm, its parameters and the checks budget
//!   for a target precision
//!
//! Indexes borrow their dataset as a row-major [`Matrix`](data_format::Matrix) view and never copy
//! it (except the single k-d tree's optional reordered copy). Built indexes
//! can be saved and loaded again over the same data.
//!
//! ## Quick Start
//!
//! ```rust
//! use flann::prelude::*;
//!
//! let data: Vec<f32> = (0..1000 * 8).map(|i| ((i * 7919) % 10007) as f32 / 10007.0).collect();
//! let dataset = Matrix::new(&data, 1000, 8).unwrap();
//!
//! let mut index = Index::new(dataset, KMeansParams::new(16).into(), SquaredL2).unwrap();
//! index.build_index().unwrap();
//!
//! let query = dataset.row(37);
//! let mut result = KnnResultSet::new(5);
//! index.find_neighbors(&mut result, query, &SearchParams::new(128)).unwrap();
//! assert_eq!(result.results()[0].index, 37);
//! ```
//!
//! ## Batched Search
//!
//! ```rust
//! use flann::prelude::*;
//!
//! let data: Vec<f32> = (0..500 * 4).map(|i| (i % 13) as f32 + (i / 4) as f32 * 0.01).collect();
//! let dataset = Matrix::new(&data, 500, 4).unwrap();
//! let index = Index::build(dataset, KdTreeParams::new(4).into(), SquaredL2).unwrap();
//!
//! let k = 3;
//! let mut indices = vec![0usize; dataset.rows() * k];
//! let mut dists = vec![0.0f32; dataset.rows() * k];
//! index
//!     .knn_search(&dataset, &mut indices, &mut dists, k, &SearchParams::new(64))
//!     .unwrap();
//! ```
//!
//! ## Distance Measures
//!
//! | Functor | Distance | Indexes |
//! |---------|----------|---------|
//! | `SquaredL2` | Squared Euclidean | all |
//! | `L1` | Manhattan | all |
//! | `Hellinger` | Squared Hellinger | all |
//! | `ChiSquare` | Chi-square | all |
//! | `Hamming` | Bit differences | linear, LSH |
//!
//! ## Module Overview
//!
//! - [`data_format`]: dataset views and owned copies
//! - [`distance_measures`]: distance functors
//! - [`result_set`]: k-nearest and radius collectors
//! - [`brute_force`]: linear scan
//! - [`trees`]: k-d trees and the k-means tree
//! - [`hashes`]: LSH
//! - [`autotune`]: automatic index selection
//! - [`persistence`]: saved index format
//! - [`utils`]: node pool, sampling and parallel helpers

#![allow(clippy::needless_range_loop)]
#![allow(clippy::module_inception)]

pub mod autotune;
pub mod brute_force;
pub mod data_format;
pub mod distance_measures;
pub mod hashes;
pub mod persistence;
pub mod result_set;
pub mod trees;
pub mod utils;

mod config;
mod error;
mod index;
mod searcher;
mod types;

pub use config::{
    AutotunedParams, CentersInit, Checks, IndexParams, IndexType, KMeansParams, KdTreeParams,
    KdTreeSingleParams, LshParams, SearchParams, DEFAULT_CHECKS, MAX_PROBE_MASKS,
};
pub use error::{ErrorCode, FlannError, Result};
pub use index::Index;
pub use searcher::NnIndex;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::autotune::AutotunedIndex;
    pub use crate::brute_force::LinearIndex;
    pub use crate::config::{
        AutotunedParams, CentersInit, Checks, IndexParams, IndexType, KMeansParams, KdTreeParams,
        KdTreeSingleParams, LshParams, SearchParams,
    };
    pub use crate::data_format::{DenseDataset, Matrix};
    pub use crate::distance_measures::{ChiSquare, Distance, Hamming, Hellinger, SquaredL2, L1};
    pub use crate::error::{ErrorCode, FlannError, Result};
    pub use crate::hashes::LshIndex;
    pub use crate::index::Index;
    pub use crate::result_set::{KnnResultSet, RadiusResultSet, ResultSet, UniqueKnnResultSet};
    pub use crate::searcher::NnIndex;
    pub use crate::trees::{KMeansIndex, KdTreeIndex, KdTreeSingleIndex};
    pub use crate::types::{DatapointIndex, DatapointValue, Neighbor, NO_NEIGHBOR};
}
