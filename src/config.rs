//! Configuration types.
//!
//! Build parameters are a closed enum keyed by algorithm, one plain struct per
//! index type. They are serializable so that a saved index can record exactly
//! how it was built.

use crate::error::{FlannError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Algorithm tag of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Exhaustive scan.
    Linear,
    /// Randomized k-d forest.
    KdTree,
    /// Single exact k-d tree.
    KdTreeSingle,
    /// Hierarchical k-means tree.
    KMeans,
    /// Multi-probe locality sensitive hashing.
    Lsh,
    /// Empirically selected index.
    Autotuned,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexType::Linear => "linear",
            IndexType::KdTree => "kdtree",
            IndexType::KdTreeSingle => "kdtree_single",
            IndexType::KMeans => "kmeans",
            IndexType::Lsh => "lsh",
            IndexType::Autotuned => "autotuned",
        };
        f.write_str(name)
    }
}

/// Randomized k-d forest parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdTreeParams {
    /// Number of independent trees.
    pub trees: usize,
    /// Seed for the split choices; entropy when unset.
    pub random_seed: Option<u64>,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self {
            trees: 4,
            random_seed: None,
        }
    }
}

impl KdTreeParams {
    /// Forest of `trees` trees.
    pub fn new(trees: usize) -> Self {
        Self {
            trees,
            ..Default::default()
        }
    }

    /// Set the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

/// Single k-d tree parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdTreeSingleParams {
    /// Largest number of points a leaf may hold.
    pub leaf_max_size: usize,
    /// Keep a private copy of the points in build order.
    pub reorder: bool,
}

impl Default for KdTreeSingleParams {
    fn default() -> Self {
        Self {
            leaf_max_size: 10,
            reorder: true,
        }
    }
}

impl KdTreeSingleParams {
    /// Tree with the given leaf size.
    pub fn new(leaf_max_size: usize) -> Self {
        Self {
            leaf_max_size,
            ..Default::default()
        }
    }

    /// Enable or disable the reordered copy.
    pub fn with_reorder(mut self, reorder: bool) -> Self {
        self.reorder = reorder;
        self
    }
}

/// Initial center selection for k-means clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CentersInit {
    /// Distinct points drawn uniformly.
    #[default]
    Random,
    /// Farthest-point traversal.
    Gonzalez,
    /// Distance-squared weighted sampling.
    KMeansPP,
}

/// Hierarchical k-means tree parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    /// Children per internal node.
    pub branching: usize,
    /// Maximum Lloyd iterations per node.
    pub iterations: usize,
    /// Initial center selection.
    pub centers_init: CentersInit,
    /// Weight of a cluster's variance when ranking branches.
    pub cb_index: f32,
    /// Number of independent trees.
    pub trees: usize,
    /// Nodes with at most this many points become leaves.
    pub leaf_size: usize,
    /// Seed for center selection; entropy when unset.
    pub random_seed: Option<u64>,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            branching: 32,
            iterations: 11,
            centers_init: CentersInit::Random,
            cb_index: 0.2,
            trees: 1,
            leaf_size: 10,
            random_seed: None,
        }
    }
}

impl KMeansParams {
    /// Tree with the given branching factor.
    pub fn new(branching: usize) -> Self {
        Self {
            branching,
            ..Default::default()
        }
    }

    /// Set the iteration cap.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the center selection strategy.
    pub fn with_centers_init(mut self, centers_init: CentersInit) -> Self {
        self.centers_init = centers_init;
        self
    }

    /// Set the cluster boundary weight.
    pub fn with_cb_index(mut self, cb_index: f32) -> Self {
        self.cb_index = cb_index;
        self
    }

    /// Set the number of trees.
    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    /// Set the leaf size.
    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    /// Set the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

/// LSH parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LshParams {
    /// Number of hash tables.
    pub table_number: usize,
    /// Bits per key.
    pub key_size: usize,
    /// Maximum number of flipped key bits probed per table.
    pub multi_probe_level: usize,
    /// Seed for the bit selection; entropy when unset.
    pub random_seed: Option<u64>,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            table_number: 12,
            key_size: 20,
            multi_probe_level: 2,
            random_seed: None,
        }
    }
}

impl LshParams {
    /// Index with the given table layout.
    pub fn new(table_number: usize, key_size: usize, multi_probe_level: usize) -> Self {
        Self {
            table_number,
            key_size,
            multi_probe_level,
            random_seed: None,
        }
    }

    /// Set the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Keys probed per table and query: the number of ways to flip at most
    /// `multi_probe_level` of `key_size` bits. `None` on overflow.
    pub fn probe_mask_count(&self) -> Option<usize> {
        let n = self.key_size as u128;
        let mut term = 1u128;
        let mut total = 1u128;
        for i in 0..self.multi_probe_level.min(self.key_size) as u128 {
            term = term * (n - i) / (i + 1);
            total += term;
        }
        usize::try_from(total).ok()
    }
}

/// Autotuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutotunedParams {
    /// Fraction of true nearest neighbors the tuned index should find.
    pub target_precision: f32,
    /// Weight of build time relative to search time.
    pub build_weight: f32,
    /// Weight of memory overhead.
    pub memory_weight: f32,
    /// Fraction of the dataset used for tuning.
    pub sample_fraction: f32,
    /// Seed for sampling and candidate builds; entropy when unset.
    pub random_seed: Option<u64>,
    /// Configuration chosen by the last build. Ignored as input.
    #[serde(default)]
    pub selected: Option<Box<IndexParams>>,
    /// Checks chosen by the last build. Ignored as input.
    #[serde(default)]
    pub tuned_checks: Option<Checks>,
}

impl Default for AutotunedParams {
    fn default() -> Self {
        Self {
            target_precision: 0.8,
            build_weight: 0.01,
            memory_weight: 0.0,
            sample_fraction: 0.1,
            random_seed: None,
            selected: None,
            tuned_checks: None,
        }
    }
}

impl AutotunedParams {
    /// Tune for the given precision.
    pub fn new(target_precision: f32) -> Self {
        Self {
            target_precision,
            ..Default::default()
        }
    }

    /// Set the build time weight.
    pub fn with_build_weight(mut self, weight: f32) -> Self {
        self.build_weight = weight;
        self
    }

    /// Set the memory weight.
    pub fn with_memory_weight(mut self, weight: f32) -> Self {
        self.memory_weight = weight;
        self
    }

    /// Set the sample fraction.
    pub fn with_sample_fraction(mut self, fraction: f32) -> Self {
        self.sample_fraction = fraction;
        self
    }

    /// Set the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

/// Build parameters of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexParams {
    /// Exhaustive scan.
    Linear,
    /// Randomized k-d forest.
    KdTree(KdTreeParams),
    /// Single k-d tree.
    KdTreeSingle(KdTreeSingleParams),
    /// Hierarchical k-means tree.
    KMeans(KMeansParams),
    /// Multi-probe LSH.
    Lsh(LshParams),
    /// Empirically selected index.
    Autotuned(AutotunedParams),
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams::KdTree(KdTreeParams::default())
    }
}

impl From<KdTreeParams> for IndexParams {
    fn from(p: KdTreeParams) -> Self {
        IndexParams::KdTree(p)
    }
}

impl From<KdTreeSingleParams> for IndexParams {
    fn from(p: KdTreeSingleParams) -> Self {
        IndexParams::KdTreeSingle(p)
    }
}

impl From<KMeansParams> for IndexParams {
    fn from(p: KMeansParams) -> Self {
        IndexParams::KMeans(p)
    }
}

impl From<LshParams> for IndexParams {
    fn from(p: LshParams) -> Self {
        IndexParams::Lsh(p)
    }
}

impl From<AutotunedParams> for IndexParams {
    fn from(p: AutotunedParams) -> Self {
        IndexParams::Autotuned(p)
    }
}

impl IndexParams {
    /// Algorithm tag.
    pub fn index_type(&self) -> IndexType {
        match self {
            IndexParams::Linear => IndexType::Linear,
            IndexParams::KdTree(_) => IndexType::KdTree,
            IndexParams::KdTreeSingle(_) => IndexType::KdTreeSingle,
            IndexParams::KMeans(_) => IndexType::KMeans,
            IndexParams::Lsh(_) => IndexType::Lsh,
            IndexParams::Autotuned(_) => IndexType::Autotuned,
        }
    }

    /// Set the random seed of algorithms that draw random numbers.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        match &mut self {
            IndexParams::KdTree(p) => p.random_seed = Some(seed),
            IndexParams::KMeans(p) => p.random_seed = Some(seed),
            IndexParams::Lsh(p) => p.random_seed = Some(seed),
            IndexParams::Autotuned(p) => p.random_seed = Some(seed),
            IndexParams::Linear | IndexParams::KdTreeSingle(_) => {}
        }
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        match self {
            IndexParams::Linear => Ok(()),
            IndexParams::KdTree(p) => {
                if p.trees == 0 {
                    return Err(FlannError::invalid_argument("kdtree: trees must be >= 1"));
                }
                Ok(())
            }
            IndexParams::KdTreeSingle(p) => {
                if p.leaf_max_size == 0 {
                    return Err(FlannError::invalid_argument(
                        "kdtree_single: leaf_max_size must be >= 1",
                    ));
                }
                Ok(())
            }
            IndexParams::KMeans(p) => {
                if p.branching < 2 {
                    return Err(FlannError::invalid_argument(format!(
                        "kmeans: branching must be >= 2, got {}",
                        p.branching
                    )));
                }
                if p.trees == 0 {
                    return Err(FlannError::invalid_argument("kmeans: trees must be >= 1"));
                }
                if !p.cb_index.is_finite() || p.cb_index < 0.0 {
                    return Err(FlannError::invalid_argument(
                        "kmeans: cb_index must be finite and non-negative",
                    ));
                }
                Ok(())
            }
            IndexParams::Lsh(p) => {
                if p.table_number == 0 {
                    return Err(FlannError::invalid_argument("lsh: table_number must be >= 1"));
                }
                if p.key_size == 0 || p.key_size > 64 {
                    return Err(FlannError::invalid_argument(format!(
                        "lsh: key_size must be in 1..=64, got {}",
                        p.key_size
                    )));
                }
                if p.multi_probe_level > p.key_size {
                    return Err(FlannError::invalid_argument(
                        "lsh: multi_probe_level cannot exceed key_size",
                    ));
                }
                match p.probe_mask_count() {
                    Some(masks) if masks <= MAX_PROBE_MASKS => Ok(()),
                    _ => Err(FlannError::invalid_argument(format!(
                        "lsh: key_size {} with multi_probe_level {} probes more than {} keys per table",
                        p.key_size, p.multi_probe_level, MAX_PROBE_MASKS
                    ))),
                }
            }
            IndexParams::Autotuned(p) => {
                if !(0.0..=1.0).contains(&p.target_precision) {
                    return Err(FlannError::invalid_argument(
                        "autotuned: target_precision must be in [0, 1]",
                    ));
                }
                if !(p.sample_fraction > 0.0 && p.sample_fraction <= 1.0) {
                    return Err(FlannError::invalid_argument(
                        "autotuned: sample_fraction must be in (0, 1]",
                    ));
                }
                if p.build_weight < 0.0 || p.memory_weight < 0.0 {
                    return Err(FlannError::invalid_argument(
                        "autotuned: weights must be non-negative",
                    ));
                }
                if let Some(selected) = &p.selected {
                    if selected.index_type() == IndexType::Autotuned {
                        return Err(FlannError::invalid_argument(
                            "autotuned: selected configuration cannot be autotuned",
                        ));
                    }
                    selected.validate()?;
                }
                if p.tuned_checks == Some(Checks::Limited(0)) {
                    return Err(FlannError::invalid_argument("autotuned: tuned checks must be >= 1"));
                }
                Ok(())
            }
        }
    }
}

/// Query-time leaf budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checks {
    /// Stop after this many leaf point evaluations (once the collector is
    /// full).
    Limited(usize),
    /// Exact search.
    Unlimited,
    /// Use the value chosen by the autotuner.
    Autotuned,
}

/// Leaf budget used when none is given.
pub const DEFAULT_CHECKS: usize = 32;

/// Most LSH keys probed per table and query.
pub const MAX_PROBE_MASKS: usize = 1 << 16;

impl Default for Checks {
    fn default() -> Self {
        Checks::Limited(DEFAULT_CHECKS)
    }
}

impl Checks {
    /// The budget as a count, `None` for exact search.
    ///
    /// `Autotuned` only means something to an autotuned index; every other
    /// index treats it as the default budget.
    pub fn budget(self) -> Option<usize> {
        match self {
            Checks::Limited(n) => Some(n),
            Checks::Unlimited => None,
            Checks::Autotuned => Some(DEFAULT_CHECKS),
        }
    }
}

/// Per-query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Leaf budget for budgeted indexes.
    pub checks: Checks,
    /// Approximation slack for the single k-d tree.
    pub eps: f32,
    /// Sort radius search results.
    pub sorted: bool,
    /// Cap on radius search results per query.
    pub max_neighbors: Option<usize>,
    /// Spread batched queries over the rayon pool.
    pub parallel: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            checks: Checks::default(),
            eps: 0.0,
            sorted: true,
            max_neighbors: None,
            parallel: true,
        }
    }
}

impl SearchParams {
    /// Parameters with the given leaf budget.
    pub fn new(checks: usize) -> Self {
        Self {
            checks: Checks::Limited(checks),
            ..Default::default()
        }
    }

    /// Exhaustive search.
    pub fn unlimited() -> Self {
        Self {
            checks: Checks::Unlimited,
            ..Default::default()
        }
    }

    /// Use the autotuned budget.
    pub fn autotuned() -> Self {
        Self {
            checks: Checks::Autotuned,
            ..Default::default()
        }
    }

    /// Set the leaf budget.
    pub fn with_checks(mut self, checks: Checks) -> Self {
        self.checks = checks;
        self
    }

    /// Set the approximation slack.
    pub fn with_eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Set whether radius results are sorted.
    pub fn with_sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    /// Cap radius search results.
    pub fn with_max_neighbors(mut self, max: usize) -> Self {
        self.max_neighbors = Some(max);
        self
    }

    /// Enable or disable parallel batches.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.eps.is_finite() || self.eps < 0.0 {
            return Err(FlannError::invalid_argument(format!(
                "eps must be finite and non-negative, got {}",
                self.eps
            )));
        }
        if self.checks == Checks::Limited(0) {
            return Err(FlannError::invalid_argument("checks must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_default_params() {
        let params = IndexParams::default();
        assert_eq!(params.index_type(), IndexType::KdTree);
        assert!(params.validate().is_ok());

        let search = SearchParams::default();
        assert_eq!(search.checks, Checks::Limited(32));
        assert_eq!(search.eps, 0.0);
        assert!(search.sorted);
    }

    #[test]
    fn test_builders() {
        let params = KMeansParams::new(16)
            .with_iterations(5)
            .with_centers_init(CentersInit::KMeansPP)
            .with_trees(2)
            .with_random_seed(7);
        assert_eq!(params.branching, 16);
        assert_eq!(params.iterations, 5);
        assert_eq!(params.centers_init, CentersInit::KMeansPP);
        assert_eq!(params.random_seed, Some(7));

        let params: IndexParams = LshParams::new(4, 12, 1).into();
        let params = params.with_random_seed(3);
        match params {
            IndexParams::Lsh(p) => assert_eq!(p.random_seed, Some(3)),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_validate_rejects() {
        let bad = [
            IndexParams::KdTree(KdTreeParams::new(0)),
            IndexParams::KdTreeSingle(KdTreeSingleParams::new(0)),
            IndexParams::KMeans(KMeansParams::new(1)),
            IndexParams::Lsh(LshParams::new(1, 65, 0)),
            IndexParams::Lsh(LshParams::new(1, 4, 5)),
            IndexParams::Lsh(LshParams::new(1, 64, 5)),
            IndexParams::Lsh(LshParams::new(1, 64, 64)),
            IndexParams::Autotuned(AutotunedParams::new(1.5)),
            IndexParams::Autotuned(AutotunedParams::new(0.9).with_sample_fraction(0.0)),
            IndexParams::Autotuned(AutotunedParams {
                selected: Some(Box::new(AutotunedParams::default().into())),
                ..Default::default()
            }),
            IndexParams::Autotuned(AutotunedParams {
                selected: Some(Box::new(KdTreeParams::new(0).into())),
                ..Default::default()
            }),
        ];
        for params in bad {
            let err = params.validate().unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidArgument, "{:?}", params);
        }
    }

    #[test]
    fn test_probe_mask_count() {
        assert_eq!(LshParams::new(1, 20, 0).probe_mask_count(), Some(1));
        assert_eq!(LshParams::new(1, 20, 2).probe_mask_count(), Some(1 + 20 + 190));
        assert_eq!(LshParams::new(1, 4, 4).probe_mask_count(), Some(16));
        assert_eq!(LshParams::new(1, 64, 3).probe_mask_count(), Some(1 + 64 + 2016 + 41664));
        assert!(IndexParams::Lsh(LshParams::new(1, 64, 3)).validate().is_ok());
        assert!(IndexParams::Lsh(LshParams::new(1, 64, 4)).validate().is_err());
        assert!(IndexParams::Lsh(LshParams::new(1, 16, 16)).validate().is_ok());
        assert!(IndexParams::Lsh(LshParams::new(1, 17, 17)).validate().is_err());
    }

    #[test]
    fn test_search_params_validate() {
        assert!(SearchParams::default().with_eps(-1.0).validate().is_err());
        assert!(SearchParams::new(0).validate().is_err());
        assert!(SearchParams::unlimited().validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let params = IndexParams::KMeans(KMeansParams::new(64).with_cb_index(0.5));
        let json = serde_json::to_string(&params).unwrap();
        let deserialized: IndexParams = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, params);

        let tuned = IndexParams::Autotuned(AutotunedParams {
            selected: Some(Box::new(KdTreeParams::new(8).with_random_seed(2).into())),
            tuned_checks: Some(Checks::Limited(96)),
            ..AutotunedParams::new(0.9)
        });
        let json = serde_json::to_string(&tuned).unwrap();
        assert_eq!(serde_json::from_str::<IndexParams>(&json).unwrap(), tuned);
        let bytes = bincode::serialize(&tuned).unwrap();
        assert_eq!(bincode::deserialize::<IndexParams>(&bytes).unwrap(), tuned);

        let search = SearchParams::autotuned().with_max_neighbors(5);
        let json = serde_json::to_string(&search).unwrap();
        let deserialized: SearchParams = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, search);
    }

    #[test]
    fn test_checks_budget() {
        assert_eq!(Checks::Limited(7).budget(), Some(7));
        assert_eq!(Checks::Unlimited.budget(), None);
        assert_eq!(Checks::Autotuned.budget(), Some(DEFAULT_CHECKS));
    }

    #[test]
    fn test_index_type_display() {
        assert_eq!(IndexType::KdTreeSingle.to_string(), "kdtree_single");
        assert_eq!(IndexType::Lsh.to_string(), "lsh");
    }
}
