//! Hierarchical k-means tree.
//!
//! Each node splits its points into up to `branching` clusters refined with
//! Lloyd iterations, recursing until a cluster is small enough to become a
//! leaf. Several trees can be built over the same points with different
//! random seeds; queries explore them together best-bin-first.
//!
//! Leaves do not own their points. Every tree keeps a permutation of the
//! dataset rows in one shared `indices` array and a leaf refers to a
//! contiguous range of it.

use crate::config::{IndexParams, IndexType, KMeansParams, SearchParams};
use crate::data_format::Matrix;
use crate::distance_measures::{distance_to_f32, Distance};
use crate::error::{FlannError, Result};
use crate::persistence::{self, read_record, write_record, IndexHeader};
use crate::result_set::ResultSet;
use crate::searcher::NnIndex;
use crate::trees::centers::choose_centers;
use crate::trees::BranchHeap;
use crate::types::{DatapointIndex, DatapointValue};
use crate::utils::parallel::maybe_parallel_map_threshold;
use crate::utils::{NodeId, NodePool, RandomSampler};
use bitvec::prelude::*;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::io::{Read, Write};
use tracing::debug;

/// Points per node above which cluster assignment runs on the rayon pool.
const KMEANS_PARALLEL_THRESHOLD: usize = 512;

/// Center and extent of the points below a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Cluster {
    pivot: Vec<f32>,
    /// Largest distance from the pivot to a member point.
    radius: f32,
    /// Mean distance from the pivot to the member points.
    variance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        cluster: Cluster,
        start: usize,
        end: usize,
    },
    Internal {
        cluster: Cluster,
        children: Vec<NodeId>,
    },
}

impl Node {
    fn cluster(&self) -> &Cluster {
        match self {
            Node::Leaf { cluster, .. } | Node::Internal { cluster, .. } => cluster,
        }
    }
}

/// Hierarchical k-means tree index.
#[derive(Debug)]
pub struct KMeansIndex<'a, T, D> {
    dataset: Matrix<'a, T>,
    params: KMeansParams,
    distance: D,
    pool: NodePool<Node>,
    roots: Vec<NodeId>,
    indices: Vec<DatapointIndex>,
    truncated: usize,
    built: bool,
}

impl<'a, T: DatapointValue, D: Distance> KMeansIndex<'a, T, D> {
    /// Create an unbuilt index. Fails for distances that do not apply to
    /// cluster means.
    pub fn new(dataset: Matrix<'a, T>, params: KMeansParams, distance: D) -> Result<Self> {
        IndexParams::KMeans(params.clone()).validate()?;
        if !D::SPATIAL {
            return Err(FlannError::invalid_argument(format!(
                "kmeans does not support the {} distance",
                D::NAME
            )));
        }
        Ok(Self {
            dataset,
            params,
            distance,
            pool: NodePool::new(),
            roots: Vec::new(),
            indices: Vec::new(),
            truncated: 0,
            built: false,
        })
    }

    /// Number of trees built.
    pub fn tree_count(&self) -> usize {
        self.roots.len()
    }

    /// Nodes that got fewer than `branching` clusters because their points
    /// did not hold enough distinct values.
    pub fn truncated_nodes(&self) -> usize {
        self.truncated
    }

    /// Build with an explicit random source instead of the configured seed.
    pub fn build_with(&mut self, sampler: &mut RandomSampler) -> Result<()> {
        self.built = false;
        self.pool.clear();
        self.roots.clear();
        self.indices.clear();
        self.truncated = 0;

        let n = self.dataset.rows();
        if n > 0 {
            self.indices.reserve(n * self.params.trees);
            for tree in 0..self.params.trees {
                let mut ind: Vec<DatapointIndex> = (0..n).collect();
                let center = self.mean(&ind);
                let cluster = self.cluster_stats(&ind, center);
                let root = self.divide_tree(&mut ind, tree * n, cluster, sampler)?;
                self.indices.extend_from_slice(&ind);
                self.roots.push(root);
            }
        }

        debug!(
            points = n,
            trees = self.roots.len(),
            nodes = self.pool.len(),
            truncated = self.truncated,
            "built k-means tree"
        );
        self.built = true;
        Ok(())
    }

    /// Cluster `ind` recursively. `offset` is the position of `ind[0]` in the
    /// final `indices` array.
    fn divide_tree(
        &mut self,
        ind: &mut [DatapointIndex],
        offset: usize,
        cluster: Cluster,
        sampler: &mut RandomSampler,
    ) -> Result<NodeId> {
        let count = ind.len();
        if count < self.params.branching || count <= self.params.leaf_size {
            return self.make_leaf(ind, offset, cluster);
        }

        let seeds = choose_centers(
            self.params.centers_init,
            self.params.branching,
            ind,
            &self.dataset,
            &self.distance,
            sampler,
        );
        if seeds.len() < self.params.branching {
            self.truncated += 1;
            debug!(
                points = count,
                centers = seeds.len(),
                branching = self.params.branching,
                "truncated k-means node"
            );
        }
        if seeds.len() < 2 {
            return self.make_leaf(ind, offset, cluster);
        }

        let (assignment, centers) = self.refine(ind, &seeds);

        // Group points by cluster, keeping their relative order.
        let mut order: Vec<(usize, DatapointIndex)> =
            assignment.iter().copied().zip(ind.iter().copied()).collect();
        order.sort_by_key(|&(c, _)| c);
        for (slot, &(_, point)) in ind.iter_mut().zip(&order) {
            *slot = point;
        }

        let id = self.pool.alloc(Node::Internal {
            cluster,
            children: Vec::new(),
        })?;
        let mut children = Vec::with_capacity(centers.len());
        let mut start = 0;
        for (c, center) in centers.into_iter().enumerate() {
            let end = start + order[start..].iter().take_while(|&&(a, _)| a == c).count();
            if end == start {
                continue;
            }
            let members = &mut ind[start..end];
            let child_cluster = self.cluster_stats(members, center);
            children.push(self.divide_tree(members, offset + start, child_cluster, sampler)?);
            start = end;
        }
        if let Node::Internal { children: slot, .. } = self.pool.get_mut(id) {
            *slot = children;
        }
        Ok(id)
    }

    fn make_leaf(&mut self, ind: &mut [DatapointIndex], offset: usize, cluster: Cluster) -> Result<NodeId> {
        ind.sort_unstable();
        self.pool.alloc(Node::Leaf {
            cluster,
            start: offset,
            end: offset + ind.len(),
        })
    }

    /// Lloyd iterations from the given seed points. Returns the cluster of
    /// every point of `ind` and the final centers. No cluster is left empty.
    fn refine(&self, ind: &[DatapointIndex], seeds: &[DatapointIndex]) -> (Vec<usize>, Vec<Vec<f32>>) {
        let k = seeds.len();
        let mut centers: Vec<Vec<f32>> = seeds
            .iter()
            .map(|&s| self.dataset.row(s).iter().map(|v| v.as_f32()).collect())
            .collect();
        let mut assignment = self.assign(ind, &centers);

        for _ in 0..self.params.iterations {
            self.update_centers(ind, &assignment, &mut centers);
            let next = self.assign(ind, &centers);
            let mut converged = next == assignment;
            assignment = next;

            let mut counts = vec![0usize; k];
            for &c in &assignment {
                counts[c] += 1;
            }
            for empty in 0..k {
                if counts[empty] != 0 {
                    continue;
                }
                // `ind.len() >= k`, so some other cluster holds two points.
                let mut donor = (empty + 1) % k;
                while counts[donor] <= 1 {
                    donor = (donor + 1) % k;
                }
                if let Some(slot) = assignment.iter_mut().find(|c| **c == donor) {
                    *slot = empty;
                    counts[donor] -= 1;
                    counts[empty] += 1;
                }
                converged = false;
            }
            if converged {
                break;
            }
        }
        (assignment, centers)
    }

    /// Nearest center of every point, first center on ties.
    fn assign(&self, ind: &[DatapointIndex], centers: &[Vec<f32>]) -> Vec<usize> {
        maybe_parallel_map_threshold(ind, KMEANS_PARALLEL_THRESHOLD, |&i| {
            nearest_center(&self.distance, self.dataset.row(i), centers)
        })
    }

    /// Recompute centers as member means. Empty clusters keep their center.
    fn update_centers(&self, ind: &[DatapointIndex], assignment: &[usize], centers: &mut [Vec<f32>]) {
        let dim = self.dataset.cols();
        let mut sums = vec![vec![0.0f64; dim]; centers.len()];
        let mut counts = vec![0usize; centers.len()];
        for (&i, &c) in ind.iter().zip(assignment) {
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(self.dataset.row(i)) {
                *s += v.as_f32() as f64;
            }
        }
        for ((center, sum), &count) in centers.iter_mut().zip(&sums).zip(&counts) {
            if count > 0 {
                for (x, s) in center.iter_mut().zip(sum) {
                    *x = (s / count as f64) as f32;
                }
            }
        }
    }

    fn mean(&self, ind: &[DatapointIndex]) -> Vec<f32> {
        let mut centers = vec![vec![0.0f32; self.dataset.cols()]];
        self.update_centers(ind, &vec![0; ind.len()], &mut centers);
        centers.pop().unwrap_or_default()
    }

    fn cluster_stats(&self, ind: &[DatapointIndex], pivot: Vec<f32>) -> Cluster {
        let mut radius = 0.0f32;
        let mut sum = 0.0f64;
        for &i in ind {
            let d = distance_to_f32(&self.distance, self.dataset.row(i), &pivot);
            if d > radius {
                radius = d;
            }
            sum += d as f64;
        }
        let variance = if ind.is_empty() { 0.0 } else { (sum / ind.len() as f64) as f32 };
        Cluster {
            pivot,
            radius,
            variance,
        }
    }

    /// Whether no point of `cluster` can beat `worst`.
    fn outside_ball(&self, query: &[T], cluster: &Cluster, worst: f32) -> bool {
        let bsq = distance_to_f32(&self.distance, query, &cluster.pivot);
        let rsq = cluster.radius;
        let val = bsq - rsq - worst;
        let val2 = val * val - 4.0 * rsq * worst;
        val > 0.0 && val2 > 0.0
    }

    /// Descend from `node` to a leaf along the closest pivots, queueing the
    /// other children.
    #[allow(clippy::too_many_arguments)]
    fn search_level(
        &self,
        result: &mut dyn ResultSet,
        query: &[T],
        mut node: NodeId,
        checks: &mut usize,
        max_checks: usize,
        heap: &mut BranchHeap,
        checked: &mut BitVec,
    ) {
        loop {
            let current = self.pool.get(node);
            if self.outside_ball(query, current.cluster(), result.worst_dist()) {
                return;
            }
            match current {
                Node::Leaf { start, end, .. } => {
                    if *checks >= max_checks && result.full() {
                        return;
                    }
                    for &index in &self.indices[*start..*end] {
                        if checked[index] {
                            continue;
                        }
                        checked.set(index, true);
                        *checks += 1;
                        let dist = self
                            .distance
                            .eval(self.dataset.row(index), query, Some(result.worst_dist()));
                        result.add_point(dist, index);
                    }
                    return;
                }
                Node::Internal { children, .. } => {
                    node = self.explore_branches(query, children, heap);
                }
            }
        }
    }

    /// Queue every child but the closest, discounted by its variance, and
    /// return the closest.
    fn explore_branches(&self, query: &[T], children: &[NodeId], heap: &mut BranchHeap) -> NodeId {
        let dists: Vec<f32> = children
            .iter()
            .map(|&c| distance_to_f32(&self.distance, query, &self.pool.get(c).cluster().pivot))
            .collect();
        let best = first_min(&dists);
        for (i, (&child, &d)) in children.iter().zip(&dists).enumerate() {
            if i != best {
                let variance = self.pool.get(child).cluster().variance;
                let priority = d - self.params.cb_index * variance;
                heap.push(Reverse((OrderedFloat(priority), child)));
            }
        }
        children[best]
    }

    /// Exact descent visiting children closest first.
    fn search_exact(&self, result: &mut dyn ResultSet, query: &[T], node: NodeId) {
        let current = self.pool.get(node);
        if self.outside_ball(query, current.cluster(), result.worst_dist()) {
            return;
        }
        match current {
            Node::Leaf { start, end, .. } => {
                for &index in &self.indices[*start..*end] {
                    let dist = self
                        .distance
                        .eval(self.dataset.row(index), query, Some(result.worst_dist()));
                    result.add_point(dist, index);
                }
            }
            Node::Internal { children, .. } => {
                let mut ordered: Vec<(OrderedFloat<f32>, NodeId)> = children
                    .iter()
                    .map(|&c| {
                        let d = distance_to_f32(&self.distance, query, &self.pool.get(c).cluster().pivot);
                        (OrderedFloat(d), c)
                    })
                    .collect();
                ordered.sort_by_key(|&(d, _)| d);
                for (_, child) in ordered {
                    self.search_exact(result, query, child);
                }
            }
        }
    }
}

fn nearest_center<T: DatapointValue, D: Distance>(distance: &D, point: &[T], centers: &[Vec<f32>]) -> usize {
    let dists: Vec<f32> = centers.iter().map(|c| distance_to_f32(distance, point, c)).collect();
    first_min(&dists)
}

/// Position of the first smallest value. NaN never wins.
fn first_min(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] || values[best].is_nan() {
            best = i;
        }
    }
    best
}

impl<'a, T: DatapointValue, D: Distance> NnIndex<T> for KMeansIndex<'a, T, D> {
    fn build_index(&mut self) -> Result<()> {
        let mut sampler = RandomSampler::from_option(self.params.random_seed);
        self.build_with(&mut sampler)
    }

    fn is_built(&self) -> bool {
        self.built
    }

    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[T],
        params: &SearchParams,
    ) -> Result<()> {
        self.check_query(query, params)?;
        if self.roots.is_empty() {
            return Ok(());
        }

        let Some(max_checks) = params.checks.budget() else {
            self.search_exact(result, query, self.roots[0]);
            return Ok(());
        };

        let mut heap = BranchHeap::new();
        let mut checked = bitvec![0; self.dataset.rows()];
        let mut checks = 0usize;
        for &root in &self.roots {
            self.search_level(result, query, root, &mut checks, max_checks, &mut heap, &mut checked);
        }
        while checks < max_checks || !result.full() {
            let Some(Reverse((_, node))) = heap.pop() else {
                break;
            };
            self.search_level(result, query, node, &mut checks, max_checks, &mut heap, &mut checked);
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.dataset.rows()
    }

    fn veclen(&self) -> usize {
        self.dataset.cols()
    }

    fn used_memory(&self) -> usize {
        let pivots: usize = self
            .pool
            .nodes()
            .iter()
            .map(|n| n.cluster().pivot.capacity() * std::mem::size_of::<f32>())
            .sum();
        let children: usize = self
            .pool
            .nodes()
            .iter()
            .map(|n| match n {
                Node::Internal { children, .. } => children.capacity() * std::mem::size_of::<NodeId>(),
                Node::Leaf { .. } => 0,
            })
            .sum();
        self.pool.used_memory()
            + pivots
            + children
            + self.indices.capacity() * std::mem::size_of::<DatapointIndex>()
            + self.roots.capacity() * std::mem::size_of::<NodeId>()
    }

    fn index_type(&self) -> IndexType {
        IndexType::KMeans
    }

    fn parameters(&self) -> IndexParams {
        IndexParams::KMeans(self.params.clone())
    }

    fn header(&self) -> IndexHeader {
        IndexHeader::new::<T, D>(self.parameters(), self.size(), self.veclen())
    }

    fn save_body(&self, writer: &mut dyn Write) -> Result<()> {
        write_record(writer, &self.truncated)?;
        write_record(writer, &self.roots)?;
        write_record(writer, &self.indices)?;
        write_record(writer, &self.pool)
    }

    fn load_body(&mut self, header: &IndexHeader, reader: &mut dyn Read) -> Result<()> {
        let IndexParams::KMeans(params) = &header.params else {
            return Err(FlannError::data_loss("expected kmeans parameters"));
        };
        self.built = false;
        self.params = params.clone();
        self.truncated = read_record(reader)?;
        self.roots = read_record(reader)?;
        self.indices = read_record(reader)?;
        self.pool = read_record(reader)?;

        let rows = self.dataset.rows();
        let trees = if rows == 0 { 0 } else { self.params.trees };
        if self.roots.len() != trees {
            return Err(FlannError::data_loss(format!(
                "stream has {} trees, parameters say {}",
                self.roots.len(),
                trees
            )));
        }
        if self.indices.len() != rows * trees {
            return Err(FlannError::data_loss(format!(
                "stream has {} leaf entries, expected {}",
                self.indices.len(),
                rows * trees
            )));
        }
        if rows > 0 {
            for chunk in self.indices.chunks(rows) {
                persistence::check_permutation(chunk, rows)?;
            }
        }
        persistence::check_count("node", self.pool.len(), 2 * rows * trees)?;

        let cols = self.dataset.cols();
        let mut edges = Vec::with_capacity(self.pool.len());
        for (i, node) in self.pool.nodes().iter().enumerate() {
            if node.cluster().pivot.len() != cols {
                return Err(FlannError::data_loss(format!(
                    "node {} pivot has {} dimensions, expected {}",
                    i,
                    node.cluster().pivot.len(),
                    cols
                )));
            }
            match node {
                Node::Leaf { start, end, .. } => {
                    if start > end || *end > self.indices.len() {
                        return Err(FlannError::data_loss(format!(
                            "leaf range {}..{} out of bounds",
                            start, end
                        )));
                    }
                }
                Node::Internal { children, .. } => {
                    if children.is_empty() {
                        return Err(FlannError::data_loss(format!("internal node {} has no children", i)));
                    }
                    edges.extend(children.iter().map(|&c| (i, c)));
                }
            }
        }
        persistence::check_forest(self.pool.len(), &self.roots, edges)?;
        debug!(trees = self.roots.len(), nodes = self.pool.len(), "loaded k-means tree");
        self.built = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute_force::LinearIndex;
    use crate::config::CentersInit;
    use crate::distance_measures::{SquaredL2, L1};
    use crate::result_set::KnnResultSet;
    use rand::prelude::*;

    fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.gen::<f32>()).collect()
    }

    fn knn<I: NnIndex<f32>>(index: &I, query: &[f32], k: usize, params: &SearchParams) -> Vec<(usize, f32)> {
        let mut result = KnnResultSet::new(k);
        index.find_neighbors(&mut result, query, params).unwrap();
        result.results().iter().map(|n| (n.index, n.distance)).collect()
    }

    fn params(branching: usize) -> KMeansParams {
        KMeansParams::new(branching).with_random_seed(42)
    }

    #[test]
    fn test_first_min() {
        assert_eq!(first_min(&[3.0, 1.0, 1.0, 2.0]), 1);
        assert_eq!(first_min(&[f32::NAN, 2.0]), 1);
        assert_eq!(first_min(&[0.5]), 0);
    }

    #[test]
    fn test_every_tree_holds_every_point() {
        let data = random_data(700, 4, 1);
        let view = Matrix::new(&data, 700, 4).unwrap();
        let mut index = KMeansIndex::new(view, params(8).with_trees(3), SquaredL2).unwrap();
        index.build_index().unwrap();
        assert_eq!(index.tree_count(), 3);
        for chunk in index.indices.chunks(700) {
            persistence::check_permutation(chunk, 700).unwrap();
        }
        let leaf_points: usize = index
            .pool
            .nodes()
            .iter()
            .map(|n| match n {
                Node::Leaf { start, end, .. } => end - start,
                Node::Internal { .. } => 0,
            })
            .sum();
        assert_eq!(leaf_points, 3 * 700);
    }

    #[test]
    fn test_radius_bounds_members() {
        let data = random_data(400, 3, 2);
        let view = Matrix::new(&data, 400, 3).unwrap();
        let mut index = KMeansIndex::new(view, params(4), SquaredL2).unwrap();
        index.build_index().unwrap();
        for node in index.pool.nodes() {
            if let Node::Leaf { cluster, start, end } = node {
                for &i in &index.indices[*start..*end] {
                    let d = distance_to_f32(&SquaredL2, view.row(i), &cluster.pivot);
                    assert!(d <= cluster.radius);
                }
            }
        }
    }

    #[test]
    fn test_unlimited_matches_linear() {
        let data = random_data(1500, 4, 3);
        let view = Matrix::new(&data, 1500, 4).unwrap();
        let linear = LinearIndex::built(view, SquaredL2);
        for init in [CentersInit::Random, CentersInit::Gonzalez, CentersInit::KMeansPP] {
            let mut index =
                KMeansIndex::new(view, params(8).with_centers_init(init), SquaredL2).unwrap();
            index.build_index().unwrap();
            let search = SearchParams::unlimited();
            for q in random_data(20, 4, 4).chunks(4) {
                let a: Vec<f32> = knn(&index, q, 5, &search).iter().map(|r| r.1).collect();
                let b: Vec<f32> = knn(&linear, q, 5, &search).iter().map(|r| r.1).collect();
                assert_eq!(a, b, "{:?}", init);
            }
        }
    }

    #[test]
    fn test_unlimited_l1_matches_linear() {
        let data = random_data(800, 3, 5);
        let view = Matrix::new(&data, 800, 3).unwrap();
        let mut index = KMeansIndex::new(view, params(6), L1).unwrap();
        index.build_index().unwrap();
        let linear = LinearIndex::built(view, L1);
        let search = SearchParams::unlimited();
        for q in random_data(20, 3, 6).chunks(3) {
            let a: Vec<f32> = knn(&index, q, 3, &search).iter().map(|r| r.1).collect();
            let b: Vec<f32> = knn(&linear, q, 3, &search).iter().map(|r| r.1).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_recall_grows_with_checks() {
        let data = random_data(2000, 8, 7);
        let view = Matrix::new(&data, 2000, 8).unwrap();
        let mut index = KMeansIndex::new(view, params(16).with_trees(2), SquaredL2).unwrap();
        index.build_index().unwrap();
        let linear = LinearIndex::built(view, SquaredL2);
        let queries = random_data(50, 8, 8);

        let exact: Vec<Vec<f32>> = queries
            .chunks(8)
            .map(|q| knn(&linear, q, 5, &SearchParams::unlimited()).iter().map(|r| r.1).collect())
            .collect();
        let recall = |checks: usize| -> usize {
            let search = SearchParams::new(checks);
            queries
                .chunks(8)
                .zip(&exact)
                .map(|(q, truth)| {
                    knn(&index, q, 5, &search)
                        .iter()
                        .filter(|r| truth.contains(&r.1))
                        .count()
                })
                .sum()
        };
        let mut last = 0;
        for checks in [8, 32, 128, 512, 2000] {
            let r = recall(checks);
            assert!(r >= last, "recall dropped at {} checks: {} < {}", checks, r, last);
            last = r;
        }
        assert_eq!(last, 50 * 5);
    }

    #[test]
    fn test_budgeted_search_finds_self() {
        let data = random_data(1000, 4, 9);
        let view = Matrix::new(&data, 1000, 4).unwrap();
        let mut index = KMeansIndex::new(view, params(32), SquaredL2).unwrap();
        index.build_index().unwrap();
        let search = SearchParams::new(128);
        for i in (0..1000).step_by(53) {
            let found = knn(&index, &data[i * 4..(i + 1) * 4], 1, &search);
            assert_eq!(found, vec![(i, 0.0)]);
        }
    }

    #[test]
    fn test_coincident_points_truncate() {
        // Two distinct values repeated.
        let data: Vec<f32> = (0..300).map(|i| (i % 2) as f32).collect();
        let view = Matrix::new(&data, 300, 1).unwrap();
        let mut index = KMeansIndex::new(view, params(8), SquaredL2).unwrap();
        index.build_index().unwrap();
        assert!(index.truncated_nodes() >= 1);

        let found = knn(&index, &[1.0], 3, &SearchParams::new(32));
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|r| r.1 == 0.0));
    }

    #[test]
    fn test_identical_points_single_leaf() {
        let data = vec![2.0f32; 100];
        let view = Matrix::new(&data, 50, 2).unwrap();
        let mut index = KMeansIndex::new(view, params(4), SquaredL2).unwrap();
        index.build_index().unwrap();
        assert_eq!(index.pool.len(), 1);
        assert_eq!(index.truncated_nodes(), 1);
    }

    #[test]
    fn test_small_and_empty() {
        let data = random_data(5, 2, 10);
        let view = Matrix::new(&data, 5, 2).unwrap();
        let mut index = KMeansIndex::new(view, params(8), SquaredL2).unwrap();
        index.build_index().unwrap();
        assert_eq!(knn(&index, &data[..2], 10, &SearchParams::new(4)).len(), 5);

        let empty: Vec<f32> = Vec::new();
        let view = Matrix::new(&empty, 0, 2).unwrap();
        let mut index = KMeansIndex::new(view, params(8), SquaredL2).unwrap();
        index.build_index().unwrap();
        assert!(knn(&index, &[0.0, 0.0], 3, &SearchParams::default()).is_empty());
    }

    #[test]
    fn test_seeded_builds_are_identical() {
        let data = random_data(600, 3, 11);
        let view = Matrix::new(&data, 600, 3).unwrap();
        let build = || {
            let mut index = KMeansIndex::new(view, params(5), SquaredL2).unwrap();
            index.build_index().unwrap();
            index
        };
        let (a, b) = (build(), build());
        assert_eq!(a.pool.nodes(), b.pool.nodes());
        assert_eq!(a.indices, b.indices);
    }

    #[test]
    fn test_rejects_bad_params() {
        let data = random_data(10, 2, 12);
        let view = Matrix::new(&data, 10, 2).unwrap();
        assert!(KMeansIndex::new(view, KMeansParams::new(1), SquaredL2).is_err());
        assert!(KMeansIndex::new(view, KMeansParams::new(4).with_trees(0), SquaredL2).is_err());
        assert!(KMeansIndex::new(view, KMeansParams::new(4), crate::distance_measures::Hamming).is_err());
    }

    #[test]
    fn test_save_load() {
        let data = random_data(500, 3, 13);
        let view = Matrix::new(&data, 500, 3).unwrap();
        let mut index = KMeansIndex::new(view, params(6).with_trees(2), SquaredL2).unwrap();
        index.build_index().unwrap();
        let mut buf = Vec::new();
        index.save_index(&mut buf).unwrap();

        let mut loaded = KMeansIndex::new(view, KMeansParams::default(), SquaredL2).unwrap();
        loaded.load_index(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.tree_count(), 2);
        assert_eq!(loaded.parameters(), index.parameters());

        let search = SearchParams::new(24);
        for q in random_data(10, 3, 14).chunks(3) {
            assert_eq!(knn(&index, q, 4, &search), knn(&loaded, q, 4, &search));
        }

        let mut short = KMeansIndex::new(view, KMeansParams::default(), SquaredL2).unwrap();
        let err = short.load_index(&mut &buf[..buf.len() - 7]).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::DataLoss);
        assert!(!short.is_built());
    }
}
