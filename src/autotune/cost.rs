//! Candidate evaluation for the autotuner.
//!
//! Precision is measured against exact 1-NN distances from a linear scan. A
//! hit counts when its distance matches the true nearest distance, so
//! duplicate points never register as misses.

use crate::brute_force::LinearIndex;
use crate::config::{IndexParams, SearchParams};
use crate::data_format::Matrix;
use crate::distance_measures::Distance;
use crate::error::Result;
use crate::result_set::KnnResultSet;
use crate::searcher::NnIndex;
use crate::types::DatapointValue;
use std::time::Instant;

/// Relative tolerance when comparing a found distance to the true one.
const DISTANCE_TOLERANCE: f32 = 1e-6;

/// Floor for time costs, keeps normalization finite.
const MIN_TIME_COST: f64 = 1e-9;

/// Measured cost of one candidate configuration.
#[derive(Debug, Clone)]
pub(crate) struct CostData {
    pub params: IndexParams,
    /// Checks needed to reach the target precision.
    pub checks: usize,
    /// Seconds to build on the sample.
    pub build_time: f64,
    /// Seconds to run every test query at `checks`.
    pub search_time: f64,
    /// `(index memory + dataset bytes) / dataset bytes`.
    pub memory_cost: f64,
}

impl CostData {
    fn time_cost(&self, build_weight: f64) -> f64 {
        self.build_time * build_weight + self.search_time
    }
}

/// Overall cost of every candidate.
///
/// Time costs are normalized by the best time cost before the weighted
/// memory cost is added.
pub(crate) fn weighted_costs(costs: &[CostData], build_weight: f32, memory_weight: f32) -> Vec<f64> {
    let (bw, mw) = (build_weight as f64, memory_weight as f64);
    let best_time = costs
        .iter()
        .map(|c| c.time_cost(bw))
        .fold(f64::INFINITY, f64::min)
        .max(MIN_TIME_COST);
    costs
        .iter()
        .map(|c| c.time_cost(bw) / best_time + mw * c.memory_cost)
        .collect()
}

/// Position of the cheapest candidate. Earlier candidates win ties.
pub(crate) fn select_best(costs: &[CostData], build_weight: f32, memory_weight: f32) -> usize {
    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    for (i, cost) in weighted_costs(costs, build_weight, memory_weight).into_iter().enumerate() {
        if cost < best_cost {
            best_cost = cost;
            best = i;
        }
    }
    best
}

/// Exact distance of the `skip + 1`-th nearest point of every query.
pub(crate) fn ground_truth<T: DatapointValue, D: Distance>(
    dataset: Matrix<'_, T>,
    queries: &Matrix<'_, T>,
    distance: D,
    skip: usize,
) -> Result<Vec<f32>> {
    let linear = LinearIndex::built(dataset, distance);
    let found = linear.knn_search_vec(queries, skip + 1, &SearchParams::unlimited())?;
    Ok(found
        .iter()
        .map(|row| row.get(skip).map_or(f32::INFINITY, |n| n.distance))
        .collect())
}

/// Fraction of queries whose `skip + 1`-th result has the true distance.
pub(crate) fn precision<T: DatapointValue>(
    index: &dyn NnIndex<T>,
    queries: &Matrix<'_, T>,
    truth: &[f32],
    skip: usize,
    checks: usize,
) -> Result<f32> {
    if truth.is_empty() {
        return Ok(1.0);
    }
    let params = SearchParams::new(checks.max(1)).with_parallel(false);
    let mut correct = 0usize;
    for (query, &t) in queries.iter().zip(truth) {
        let mut result = KnnResultSet::new(skip + 1);
        index.find_neighbors(&mut result, query, &params)?;
        if let Some(n) = result.results().get(skip) {
            if n.distance <= t + DISTANCE_TOLERANCE * t.abs() {
                correct += 1;
            }
        }
    }
    Ok(correct as f32 / truth.len() as f32)
}

/// Smallest checks value reaching `target` precision, found by doubling
/// then bisection, capped at `max_checks`.
pub(crate) fn tune_checks<T: DatapointValue>(
    index: &dyn NnIndex<T>,
    queries: &Matrix<'_, T>,
    truth: &[f32],
    skip: usize,
    target: f32,
    max_checks: usize,
) -> Result<usize> {
    let max_checks = max_checks.max(1);
    let mut lo = 0usize;
    let mut hi = 1usize;
    let mut p = precision(index, queries, truth, skip, hi)?;
    while p < target && hi < max_checks {
        lo = hi;
        hi = (hi * 2).min(max_checks);
        p = precision(index, queries, truth, skip, hi)?;
    }
    if p < target {
        return Ok(hi);
    }
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if precision(index, queries, truth, skip, mid)? >= target {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(hi)
}

/// Seconds to answer every query at `checks`.
pub(crate) fn search_time<T: DatapointValue>(
    index: &dyn NnIndex<T>,
    queries: &Matrix<'_, T>,
    checks: usize,
) -> Result<f64> {
    let params = SearchParams::new(checks.max(1)).with_parallel(false);
    let start = Instant::now();
    for query in queries.iter() {
        let mut result = KnnResultSet::new(1);
        index.find_neighbors(&mut result, query, &params)?;
    }
    Ok(start.elapsed().as_secs_f64())
}
