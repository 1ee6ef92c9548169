//! Single k-d tree.
//!
//! An exact tree with multi-point leaves. Each split cuts the widest
//! dimension of the node's bounding box at its midpoint, and queries prune
//! far branches with an incrementally maintained distance-to-box bound.

use crate::config::{IndexParams, IndexType, KdTreeSingleParams, SearchParams};
use crate::data_format::{DenseDataset, Matrix};
use crate::distance_measures::Distance;
use crate::error::{FlannError, Result};
use crate::persistence::{self, read_record, write_record, IndexHeader};
use crate::result_set::ResultSet;
use crate::searcher::NnIndex;
use crate::trees::{plane_split, split_index};
use crate::types::{DatapointIndex, DatapointValue};
use crate::utils::{NodeId, NodePool};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

/// Dimensions whose approximate span is within this factor of the widest
/// are re-measured exactly before picking the split dimension.
const SPAN_EPS: f32 = 0.00001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Interval {
    low: f32,
    high: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    /// Points `vind[left..right]`.
    Leaf { left: usize, right: usize },
    /// `divlow` and `divhigh` are the tight bounds of the two children along
    /// `divfeat`.
    Internal {
        divfeat: usize,
        divlow: f32,
        divhigh: f32,
        children: [NodeId; 2],
    },
}

/// Exact k-d tree index.
#[derive(Debug)]
pub struct KdTreeSingleIndex<'a, T: DatapointValue, D> {
    dataset: Matrix<'a, T>,
    params: KdTreeSingleParams,
    distance: D,
    vind: Vec<DatapointIndex>,
    pool: NodePool<Node>,
    root: Option<NodeId>,
    root_bbox: Vec<Interval>,
    /// Points in `vind` order when `reorder` is set.
    reordered: Option<DenseDataset<T>>,
    built: bool,
}

impl<'a, T: DatapointValue, D: Distance> KdTreeSingleIndex<'a, T, D> {
    /// Create an unbuilt index. Fails for non-spatial distances.
    pub fn new(dataset: Matrix<'a, T>, params: KdTreeSingleParams, distance: D) -> Result<Self> {
        IndexParams::KdTreeSingle(params.clone()).validate()?;
        if !D::SPATIAL {
            return Err(FlannError::invalid_argument(format!(
                "kdtree_single does not support the {} distance",
                D::NAME
            )));
        }
        Ok(Self {
            dataset,
            params,
            distance,
            vind: Vec::new(),
            pool: NodePool::new(),
            root: None,
            root_bbox: Vec::new(),
            reordered: None,
            built: false,
        })
    }

    /// Number of tree nodes.
    pub fn node_count(&self) -> usize {
        self.pool.len()
    }

    #[inline]
    fn value(&self, index: DatapointIndex, dim: usize) -> f32 {
        self.dataset.row(index)[dim].as_f32()
    }

    fn compute_bounding_box(&self) -> Vec<Interval> {
        let cols = self.dataset.cols();
        let mut bbox = vec![
            Interval {
                low: f32::INFINITY,
                high: f32::NEG_INFINITY
            };
            cols
        ];
        for point in self.dataset.iter() {
            for (b, v) in bbox.iter_mut().zip(point) {
                let v = v.as_f32();
                b.low = b.low.min(v);
                b.high = b.high.max(v);
            }
        }
        bbox
    }

    /// Build the subtree over `vind[left..right]`.
    ///
    /// `bbox` comes in as an approximate box and leaves as the tight box of
    /// the subtree.
    fn divide_tree(&mut self, left: usize, right: usize, bbox: &mut [Interval]) -> Result<NodeId> {
        let id = self.pool.alloc(Node::Leaf { left, right })?;

        if right - left <= self.params.leaf_max_size {
            for (dim, b) in bbox.iter_mut().enumerate() {
                let first = self.value(self.vind[left], dim);
                b.low = first;
                b.high = first;
            }
            for &index in &self.vind[left + 1..right] {
                for (dim, b) in bbox.iter_mut().enumerate() {
                    let v = self.value(index, dim);
                    b.low = b.low.min(v);
                    b.high = b.high.max(v);
                }
            }
            return Ok(id);
        }

        let (split, cutfeat, cutval) = self.middle_split(left, right, bbox);

        let mut left_bbox = bbox.to_vec();
        left_bbox[cutfeat].high = cutval;
        let child1 = self.divide_tree(left, left + split, &mut left_bbox)?;

        let mut right_bbox = bbox.to_vec();
        right_bbox[cutfeat].low = cutval;
        let child2 = self.divide_tree(left + split, right, &mut right_bbox)?;

        *self.pool.get_mut(id) = Node::Internal {
            divfeat: cutfeat,
            divlow: left_bbox[cutfeat].high,
            divhigh: right_bbox[cutfeat].low,
            children: [child1, child2],
        };

        for ((b, l), r) in bbox.iter_mut().zip(&left_bbox).zip(&right_bbox) {
            b.low = l.low.min(r.low);
            b.high = l.high.max(r.high);
        }
        Ok(id)
    }

    fn compute_min_max(&self, left: usize, right: usize, dim: usize) -> (f32, f32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &index in &self.vind[left..right] {
            let v = self.value(index, dim);
            min = min.min(v);
            max = max.max(v);
        }
        (min, max)
    }

    /// Choose the split of `vind[left..right]`; returns the split offset,
    /// the cut dimension and the cut value.
    fn middle_split(&mut self, left: usize, right: usize, bbox: &[Interval]) -> (usize, usize, f32) {
        let count = right - left;
        let max_span = bbox
            .iter()
            .map(|b| b.high - b.low)
            .fold(f32::NEG_INFINITY, f32::max);

        let mut cutfeat = 0;
        let mut max_spread = -1.0f32;
        for (dim, b) in bbox.iter().enumerate() {
            let span = b.high - b.low;
            if span > (1.0 - SPAN_EPS) * max_span {
                let (min, max) = self.compute_min_max(left, right, dim);
                let spread = max - min;
                if spread > max_spread {
                    cutfeat = dim;
                    max_spread = spread;
                }
            }
        }

        let split_val = (bbox[cutfeat].low + bbox[cutfeat].high) / 2.0;
        let (min, max) = self.compute_min_max(left, right, cutfeat);
        let cutval = if split_val < min {
            min
        } else if split_val > max {
            max
        } else {
            split_val
        };

        let (lim1, lim2) = plane_split(&self.dataset, &mut self.vind[left..right], cutfeat, cutval);

        (split_index(lim1, lim2, count), cutfeat, cutval)
    }

    /// Distance from `query` to the root bounding box, per dimension.
    fn initial_distances(&self, query: &[T], dists: &mut [f32]) -> f32 {
        let mut distsq = 0.0;
        for ((d, b), q) in dists.iter_mut().zip(&self.root_bbox).zip(query) {
            let q = q.as_f32();
            if q < b.low {
                *d = self.distance.accum_dist(q, b.low);
                distsq += *d;
            }
            if q > b.high {
                *d = self.distance.accum_dist(q, b.high);
                distsq += *d;
            }
        }
        distsq
    }

    #[allow(clippy::too_many_arguments)]
    fn search_level(
        &self,
        result: &mut dyn ResultSet,
        query: &[T],
        node: NodeId,
        mindistsq: f32,
        dists: &mut [f32],
        eps_error: f32,
        points: &Matrix<'_, T>,
    ) {
        match *self.pool.get(node) {
            Node::Leaf { left, right } => {
                let reordered = self.reordered.is_some();
                for pos in left..right {
                    let index = self.vind[pos];
                    let row = if reordered { pos } else { index };
                    let dist = self
                        .distance
                        .eval(points.row(row), query, Some(result.worst_dist()));
                    result.add_point(dist, index);
                }
            }
            Node::Internal {
                divfeat,
                divlow,
                divhigh,
                children,
            } => {
                let val = query[divfeat].as_f32();
                let diff1 = val - divlow;
                let diff2 = val - divhigh;

                let (best, other, cut_dist) = if diff1 + diff2 < 0.0 {
                    (children[0], children[1], self.distance.accum_dist(val, divhigh))
                } else {
                    (children[1], children[0], self.distance.accum_dist(val, divlow))
                };

                self.search_level(result, query, best, mindistsq, dists, eps_error, points);

                let dst = dists[divfeat];
                let mindistsq = mindistsq + cut_dist - dst;
                dists[divfeat] = cut_dist;
                if mindistsq * eps_error <= result.worst_dist() {
                    self.search_level(result, query, other, mindistsq, dists, eps_error, points);
                }
                dists[divfeat] = dst;
            }
        }
    }

    fn validate_loaded(&self, rows: usize, cols: usize) -> Result<()> {
        persistence::check_permutation(&self.vind, rows)?;
        persistence::check_count("node", self.pool.len(), 2 * rows)?;
        if self.root_bbox.len() != if rows == 0 { 0 } else { cols } {
            return Err(FlannError::data_loss("bounding box does not match the dataset"));
        }
        match self.root {
            None if !self.pool.is_empty() => {
                return Err(FlannError::data_loss("tree nodes without a root"))
            }
            Some(_) if rows == 0 => return Err(FlannError::data_loss("tree over an empty dataset")),
            _ => {}
        }
        let mut edges = Vec::new();
        for (i, node) in self.pool.nodes().iter().enumerate() {
            match *node {
                Node::Leaf { left, right } => {
                    if left > right || right > rows {
                        return Err(FlannError::data_loss(format!(
                            "leaf range {}..{} out of bounds",
                            left, right
                        )));
                    }
                }
                Node::Internal {
                    divfeat, children, ..
                } => {
                    if divfeat >= cols {
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
        let roots: Vec<NodeId> = self.root.into_iter().collect();
        persistence::check_forest(self.pool.len(), &roots, edges)?;

        if let Some(data) = &self.reordered {
            if data.size() != rows || data.dimensionality() != cols {
                return Err(FlannError::data_loss("reordered copy does not match the dataset"));
            }
        }
        Ok(())
    }
}

impl<'a, T: DatapointValue, D: Distance> NnIndex<T> for KdTreeSingleIndex<'a, T, D> {
    fn build_index(&mut self) -> Result<()> {
        self.built = false;
        self.pool.clear();
        self.root = None;
        self.reordered = None;
        self.vind = (0..self.dataset.rows()).collect();

        if self.dataset.rows() > 0 {
            let mut bbox = self.compute_bounding_box();
            let root = self.divide_tree(0, self.dataset.rows(), &mut bbox)?;
            self.root = Some(root);
            self.root_bbox = bbox;
        } else {
            self.root_bbox = Vec::new();
        }

        if self.params.reorder {
            self.reordered = Some(DenseDataset::from_rows(&self.dataset, self.vind.iter().copied()));
        }

        debug!(
            points = self.dataset.rows(),
            nodes = self.pool.len(),
            leaf_max_size = self.params.leaf_max_size,
            reorder = self.params.reorder,
            "built single k-d tree"
        );
        self.built = true;
        Ok(())
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
        let Some(root) = self.root else {
            return Ok(());
        };

        let points = match &self.reordered {
            Some(data) => data.as_matrix(),
            None => self.dataset,
        };
        let eps_error = 1.0 + params.eps;
        let mut dists = vec![0.0f32; self.dataset.cols()];
        let distsq = self.initial_distances(query, &mut dists);
        self.search_level(result, query, root, distsq, &mut dists, eps_error, &points);
        Ok(())
    }

    fn size(&self) -> usize {
        self.dataset.rows()
    }

    fn veclen(&self) -> usize {
        self.dataset.cols()
    }

    fn used_memory(&self) -> usize {
        self.pool.used_memory()
            + self.vind.capacity() * std::mem::size_of::<DatapointIndex>()
            + self.root_bbox.capacity() * std::mem::size_of::<Interval>()
            + self.reordered.as_ref().map_or(0, DenseDataset::used_memory)
    }

    fn index_type(&self) -> IndexType {
        IndexType::KdTreeSingle
    }

    fn parameters(&self) -> IndexParams {
        IndexParams::KdTreeSingle(self.params.clone())
    }

    fn header(&self) -> IndexHeader {
        IndexHeader::new::<T, D>(self.parameters(), self.size(), self.veclen())
    }

    fn save_body(&self, writer: &mut dyn Write) -> Result<()> {
        write_record(writer, &self.vind)?;
        write_record(writer, &self.root)?;
        write_record(writer, &self.pool)?;
        write_record(writer, &self.root_bbox)?;
        let reordered = self.reordered.as_ref().map(DenseDataset::to_flat);
        write_record(writer, &reordered)
    }

    fn load_body(&mut self, header: &IndexHeader, reader: &mut dyn Read) -> Result<()> {
        let IndexParams::KdTreeSingle(params) = &header.params else {
            return Err(FlannError::data_loss("expected kdtree_single parameters"));
        };
        self.built = false;
        self.params = params.clone();
        self.vind = read_record(reader)?;
        self.root = read_record(reader)?;
        self.pool = read_record(reader)?;
        self.root_bbox = read_record(reader)?;
        let reordered: Option<Vec<T>> = read_record(reader)?;
        let cols = self.dataset.cols();
        self.reordered = match reordered {
            Some(flat) if cols > 0 => Some(DenseDataset::from_flat(&flat, cols).map_err(|e| {
                FlannError::data_loss(format!("bad reordered copy: {}", e.message()))
            })?),
            Some(_) => Some(DenseDataset::new(cols)),
            None => None,
        };
        if self.reordered.is_some() != self.params.reorder {
            return Err(FlannError::data_loss("reordered copy does not match parameters"));
        }
        self.validate_loaded(self.dataset.rows(), cols)?;
        debug!(nodes = self.pool.len(), "loaded single k-d tree");
        self.built = true;
        Ok(())
    }
}
