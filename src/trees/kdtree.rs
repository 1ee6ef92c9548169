//! Randomized k-d forest.
//!
//! Several k-d trees over the same points, each splitting on a dimension
//! drawn at random among the highest-variance ones. Queries explore all trees
//! best-bin-first from a single priority queue until the checks budget runs
//! out.

use crate::config::{IndexParams, IndexType, KdTreeParams, SearchParams};
use crate::data_format::Matrix;
use crate::distance_measures::Distance;
use crate::error::{FlannError, Result};
use crate::persistence::{self, read_record, write_record, IndexHeader};
use crate::result_set::ResultSet;
use crate::searcher::NnIndex;
use crate::trees::{plane_split, split_index, BranchHeap};
use crate::types::{DatapointIndex, DatapointValue};
use crate::utils::{NodeId, NodePool, RandomSampler};
use bitvec::prelude::*;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::io::{Read, Write};
use tracing::debug;

/// Points used to estimate per-dimension mean and variance at each split.
const SAMPLE_MEAN: usize = 100;

/// Number of highest-variance dimensions a split dimension is drawn from.
const RAND_DIM: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        index: DatapointIndex,
    },
    Internal {
        divfeat: usize,
        divval: f32,
        children: [NodeId; 2],
    },
}

/// Randomized k-d forest index.
#[derive(Debug)]
pub struct KdTreeIndex<'a, T, D> {
    dataset: Matrix<'a, T>,
    params: KdTreeParams,
    distance: D,
    pool: NodePool<Node>,
    roots: Vec<NodeId>,
    built: bool,
}

impl<'a, T: DatapointValue, D: Distance> KdTreeIndex<'a, T, D> {
    /// Create an unbuilt index. Fails for non-spatial distances.
    pub fn new(dataset: Matrix<'a, T>, params: KdTreeParams, distance: D) -> Result<Self> {
        IndexParams::KdTree(params.clone()).validate()?;
        if !D::SPATIAL {
            return Err(FlannError::invalid_argument(format!(
                "kdtree does not support the {} distance",
                D::NAME
            )));
        }
        Ok(Self {
            dataset,
            params,
            distance,
            pool: NodePool::new(),
            roots: Vec::new(),
            built: false,
        })
    }

    /// Number of trees built.
    pub fn tree_count(&self) -> usize {
        self.roots.len()
    }

    /// Build with an explicit random source instead of the configured seed.
    pub fn build_with(&mut self, sampler: &mut RandomSampler) -> Result<()> {
        self.built = false;
        self.pool.clear();
        self.roots.clear();

        let n = self.dataset.rows();
        if n > 0 {
            let mut ind: Vec<DatapointIndex> = (0..n).collect();
            for _ in 0..self.params.trees {
                sampler.shuffle(&mut ind);
                let root = self.divide_tree(&mut ind, sampler)?;
                self.roots.push(root);
            }
        }

        debug!(
            points = n,
            trees = self.roots.len(),
            nodes = self.pool.len(),
            "built randomized k-d forest"
        );
        self.built = true;
        Ok(())
    }

    fn divide_tree(&mut self, ind: &mut [DatapointIndex], sampler: &mut RandomSampler) -> Result<NodeId> {
        if ind.len() == 1 {
            return self.pool.alloc(Node::Leaf { index: ind[0] });
        }
        let id = self.pool.alloc(Node::Leaf { index: ind[0] })?;
        let (split, divfeat, divval) = self.mean_split(ind, sampler);
        let (lower, upper) = ind.split_at_mut(split);
        let child1 = self.divide_tree(lower, sampler)?;
        let child2 = self.divide_tree(upper, sampler)?;
        *self.pool.get_mut(id) = Node::Internal {
            divfeat,
            divval,
            children: [child1, child2],
        };
        Ok(id)
    }

    /// Cut at the sample mean of a random high-variance dimension.
    fn mean_split(&self, ind: &mut [DatapointIndex], sampler: &mut RandomSampler) -> (usize, usize, f32) {
        let cols = self.dataset.cols();
        let count = ind.len();
        let cnt = count.min(SAMPLE_MEAN + 1);

        let mut mean = vec![0.0f64; cols];
        for &i in &ind[..cnt] {
            for (m, v) in mean.iter_mut().zip(self.dataset.row(i)) {
                *m += v.as_f32() as f64;
            }
        }
        for m in mean.iter_mut() {
            *m /= cnt as f64;
        }
        let mut var = vec![0.0f64; cols];
        for &i in &ind[..cnt] {
            for ((s, m), v) in var.iter_mut().zip(&mean).zip(self.dataset.row(i)) {
                let d = v.as_f32() as f64 - m;
                *s += d * d;
            }
        }

        let divfeat = select_division(&var, sampler);
        let divval = mean[divfeat] as f32;
        let (lim1, lim2) = plane_split(&self.dataset, ind, divfeat, divval);
        let mut split = split_index(lim1, lim2, count);
        if lim1 == count || lim2 == 0 {
            split = count / 2;
        }
        (split, divfeat, divval)
    }

    /// Descend to the leaf closest to `query`, queueing the branches passed
    /// on the way.
    #[allow(clippy::too_many_arguments)]
    fn search_level(
        &self,
        result: &mut dyn ResultSet,
        query: &[T],
        mut node: NodeId,
        mindist: f32,
        checks: &mut usize,
        max_checks: usize,
        eps_error: f32,
        heap: &mut BranchHeap,
        checked: &mut BitVec,
    ) {
        if result.worst_dist() < mindist {
            return;
        }
        loop {
            match *self.pool.get(node) {
                Node::Leaf { index } => {
                    if checked[index] || (*checks >= max_checks && result.full()) {
                        return;
                    }
                    checked.set(index, true);
                    *checks += 1;
                    let dist = self
                        .distance
                        .eval(self.dataset.row(index), query, Some(result.worst_dist()));
                    result.add_point(dist, index);
                    return;
                }
                Node::Internal {
                    divfeat,
                    divval,
                    children,
                } => {
                    let val = query[divfeat].as_f32();
                    let (best, other) = if val < divval {
                        (children[0], children[1])
                    } else {
                        (children[1], children[0])
                    };
                    let new_dist = mindist + self.distance.accum_dist(val, divval);
                    if new_dist * eps_error < result.worst_dist() || !result.full() {
                        heap.push(Reverse((OrderedFloat(new_dist), other)));
                    }
                    node = best;
                }
            }
        }
    }

    /// Exact pruned descent of one tree.
    #[allow(clippy::too_many_arguments)]
    fn search_level_exact(
        &self,
        result: &mut dyn ResultSet,
        query: &[T],
        node: NodeId,
        mindist: f32,
        dists: &mut [f32],
        eps_error: f32,
    ) {
        match *self.pool.get(node) {
            Node::Leaf { index } => {
                let dist = self
                    .distance
                    .eval(self.dataset.row(index), query, Some(result.worst_dist()));
                result.add_point(dist, index);
            }
            Node::Internal {
                divfeat,
                divval,
                children,
            } => {
                let val = query[divfeat].as_f32();
                let (best, other) = if val < divval {
                    (children[0], children[1])
                } else {
                    (children[1], children[0])
                };
                self.search_level_exact(result, query, best, mindist, dists, eps_error);

                let cut_dist = self.distance.accum_dist(val, divval);
                let saved = dists[divfeat];
                let new_dist = mindist + cut_dist - saved;
                if new_dist * eps_error <= result.worst_dist() {
                    dists[divfeat] = cut_dist;
                    self.search_level_exact(result, query, other, new_dist, dists, eps_error);
                    dists[divfeat] = saved;
                }
            }
        }
    }
}

/// Pick a random dimension among the `RAND_DIM` with the largest variance.
fn select_division(var: &[f64], sampler: &mut RandomSampler) -> usize {
    let mut top: Vec<usize> = Vec::with_capacity(RAND_DIM + 1);
    for (i, v) in var.iter().enumerate() {
        if top.len() < RAND_DIM || *v > var[top[top.len() - 1]] {
            let pos = top.partition_point(|&j| var[j] >= *v);
            top.insert(pos, i);
            top.truncate(RAND_DIM);
        }
    }
    top[sampler.random_index(top.len())]
}

impl<'a, T: DatapointValue, D: Distance> NnIndex<T> for KdTreeIndex<'a, T, D> {
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
        let eps_error = 1.0 + params.eps;

        let Some(max_checks) = params.checks.budget() else {
            // A single tree already holds every point.
            let mut dists = vec![0.0f32; self.dataset.cols()];
            self.search_level_exact(result, query, self.roots[0], 0.0, &mut dists, eps_error);
            return Ok(());
        };

        let mut heap = BranchHeap::new();
        let mut checked = bitvec![0; self.dataset.rows()];
        let mut checks = 0usize;
        for &root in &self.roots {
            self.search_level(
                result, query, root, 0.0, &mut checks, max_checks, eps_error, &mut heap, &mut checked,
            );
        }
        while checks < max_checks || !result.full() {
            let Some(Reverse((OrderedFloat(mindist), node))) = heap.pop() else {
                break;
            };
            self.search_level(
                result, query, node, mindist, &mut checks, max_checks, eps_error, &mut heap, &mut checked,
            );
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
        self.pool.used_memory() + self.roots.capacity() * std::mem::size_of::<NodeId>()
    }

    fn index_type(&self) -> IndexType {
        IndexType::KdTree
    }

    fn parameters(&self) -> IndexParams {
        IndexParams::KdTree(self.params.clone())
    }

    fn header(&self) -> IndexHeader {
        IndexHeader::new::<T, D>(self.parameters(), self.size(), self.veclen())
    }

    fn save_body(&self, writer: &mut dyn Write) -> Result<()> {
        write_record(writer, &self.roots)?;
        write_record(writer, &self.pool)
    }

    fn load_body(&mut self, header: &IndexHeader, reader: &mut dyn Read) -> Result<()> {
        let IndexParams::KdTree(params) = &header.params else {
            return Err(FlannError::data_loss("expected kdtree parameters"));
        };
        self.built = false;
        self.params = params.clone();
        self.roots = read_record(reader)?;
        self.pool = read_record(reader)?;

        let rows = self.dataset.rows();
        let expected_roots = if rows == 0 { 0 } else { self.params.trees };
        if self.roots.len() != expected_roots {
            return Err(FlannError::data_loss(format!(
                "stream has {} trees, parameters say {}",
                self.roots.len(),
                expected_roots
            )));
        }
        persistence::check_count("node", self.pool.len(), 2 * rows * self.params.trees)?;
        let mut edges = Vec::with_capacity(self.pool.len());
        for (i, node) in self.pool.nodes().iter().enumerate() {
            match *node {
                Node::Leaf { index } => {
                    if index >= rows {
                        return Err(FlannError::data_loss(format!("leaf point {} out of bounds", index)));
                    }
                }
                Node::Internal {
                    divfeat, children, ..
                } => {
                    if divfeat >= self.dataset.cols() {
                        return Err(FlannError::data_loss(format!(
                            "split dimension {} out of bounds",
                            divfeat
                        )));
                    }
                    edges.push((i, children[0]));
                    edges.push((i, children[1]));
                }
            }
        }
        persistence::check_forest(self.pool.len(), &self.roots, edges)?;
        debug!(trees = self.roots.len(), nodes = self.pool.len(), "loaded randomized k-d forest");
        self.built = true;
        Ok(())
    }
}
