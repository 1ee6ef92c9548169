//! Automatic index selection.
//!
//! [`AutotunedIndex`] samples the dataset, builds a fixed grid of k-means tree
//! and k-d forest candidates on the sample, and keeps the configuration with
//! the lowest weighted cost that reaches the target precision. Linear search
//! is always a candidate, so tuning never fails. The winner is then built on
//! the full dataset and its checks value is re-tuned there, both on dataset
//! points and on points held out of a second build.

mod cost;

use crate::config::{
    AutotunedParams, Checks, IndexParams, IndexType, KMeansParams, KdTreeParams, SearchParams,
};
use crate::data_format::{random_sample, split_sample, Matrix};
use crate::distance_measures::Distance;
use crate::error::{FlannError, Result};
use crate::index::create_index;
use crate::persistence::{read_record, write_record, IndexHeader};
use crate::result_set::ResultSet;
use crate::searcher::NnIndex;
use crate::types::DatapointValue;
use crate::utils::RandomSampler;
use cost::{ground_truth, precision, search_time, select_best, tune_checks, CostData};
use rayon::prelude::*;
use std::io::{Read, Write};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Fewest held-out queries worth tuning with.
const MIN_TEST_QUERIES: usize = 10;

/// Most held-out queries used.
const MAX_TEST_QUERIES: usize = 1000;

/// Precision sought above the target when tuning checks on the full dataset.
const PRECISION_MARGIN: f32 = 0.03;

const KMEANS_ITERATIONS: [usize; 4] = [1, 5, 10, 15];
const KMEANS_BRANCHING: [usize; 5] = [16, 32, 64, 128, 256];
const KDTREE_TREES: [usize; 5] = [1, 4, 8, 16, 32];

/// Index that picks its own algorithm and checks value.
pub struct AutotunedIndex<'a, T, D> {
    dataset: Matrix<'a, T>,
    params: AutotunedParams,
    distance: D,
    inner: Option<Box<dyn NnIndex<T> + 'a>>,
    tuned: SearchParams,
    #[cfg(test)]
    costs: Vec<CostData>,
}

impl<'a, T: DatapointValue, D: Distance> std::fmt::Debug for AutotunedIndex<'a, T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutotunedIndex")
            .field("rows", &self.dataset.rows())
            .field("cols", &self.dataset.cols())
            .field("params", &self.params)
            .field("tuned", &self.tuned)
            .finish()
    }
}

impl<'a, T: DatapointValue, D: Distance> AutotunedIndex<'a, T, D> {
    /// Create an unbuilt index.
    pub fn new(dataset: Matrix<'a, T>, params: AutotunedParams, distance: D) -> Result<Self> {
        IndexParams::Autotuned(params.clone()).validate()?;
        Ok(Self {
            dataset,
            params,
            distance,
            inner: None,
            tuned: SearchParams::unlimited(),
            #[cfg(test)]
            costs: Vec::new(),
        })
    }

    /// Parameters of the selected index, once built.
    pub fn selected_params(&self) -> Option<IndexParams> {
        self.params.selected.as_deref().cloned()
    }

    /// Search parameters found by tuning. Queries with
    /// [`Checks::Autotuned`] use these checks.
    pub fn tuned_search_params(&self) -> &SearchParams {
        &self.tuned
    }

    fn build_selected(&self, params: IndexParams) -> Result<Box<dyn NnIndex<T> + 'a>> {
        let mut index = create_index(self.dataset, params, self.distance.clone())?;
        index.build_index()?;
        Ok(index)
    }

    /// Build every grid candidate on a sample and measure its cost. Empty
    /// when the dataset is too small to tune.
    fn evaluate_candidates(&self, sampler: &mut RandomSampler) -> Result<Vec<CostData>> {
        let rows = self.dataset.rows();
        let sample_size = (self.params.sample_fraction as f64 * rows as f64).floor() as usize;
        let test_size = (sample_size / 10).min(MAX_TEST_QUERIES);
        if test_size < MIN_TEST_QUERIES {
            debug!(rows, sample_size, "dataset too small to tune, using linear search");
            return Ok(Vec::new());
        }

        let drawn = random_sample(&self.dataset, sample_size, sampler);
        let (sample, tests) = split_sample(&drawn.as_matrix(), test_size, sampler);
        let (sample, tests) = (sample.as_matrix(), tests.as_matrix());
        let truth = ground_truth(sample, &tests, self.distance.clone(), 0)?;

        let mut candidates = vec![(IndexParams::Linear, 0u64)];
        for &iterations in &KMEANS_ITERATIONS {
            for &branching in &KMEANS_BRANCHING {
                let params = KMeansParams::new(branching).with_iterations(iterations);
                candidates.push((params.into(), sampler.next_seed()));
            }
        }
        for &trees in &KDTREE_TREES {
            candidates.push((KdTreeParams::new(trees).into(), sampler.next_seed()));
        }

        let target = self.params.target_precision;
        let max_checks = 2 * sample.rows();
        candidates
            .into_par_iter()
            .map(|(params, seed)| -> Result<CostData> {
                let params = match params {
                    IndexParams::Linear => params,
                    other => other.with_random_seed(seed),
                };
                let mut index = create_index(sample, params.clone(), self.distance.clone())?;
                let start = Instant::now();
                index.build_index()?;
                let build_time = start.elapsed().as_secs_f64();

                let checks = match params {
                    IndexParams::Linear => max_checks,
                    _ => tune_checks(index.as_ref(), &tests, &truth, 0, target, max_checks)?,
                };
                let search_time = search_time(index.as_ref(), &tests, checks)?;
                let dataset_bytes = sample.byte_size().max(1) as f64;
                let memory_cost = (index.used_memory() as f64 + dataset_bytes) / dataset_bytes;
                trace!(
                    candidate = ?params,
                    checks,
                    build_time,
                    search_time,
                    memory_cost,
                    "evaluated autotune candidate"
                );
                Ok(CostData {
                    params,
                    checks,
                    build_time,
                    search_time,
                    memory_cost,
                })
            })
            .collect()
    }

    /// The cheapest candidate, or linear search when nothing was measured.
    fn select_params(&self, costs: &[CostData]) -> IndexParams {
        if costs.is_empty() {
            return IndexParams::Linear;
        }
        let best = select_best(costs, self.params.build_weight, self.params.memory_weight);
        let winner = &costs[best];
        info!(
            selected = ?winner.params,
            sample_checks = winner.checks,
            candidates = costs.len(),
            "autotune selected index"
        );
        winner.params.clone()
    }

    /// Checks needed on the full dataset.
    ///
    /// Dataset points are used as queries with their self match skipped.
    /// Because a self query starts in its own leaf, the value is then
    /// checked against points held out of a second build of `selected`,
    /// and raised until those reach the target as well.
    fn estimate_checks(
        &self,
        selected: &IndexParams,
        index: &dyn NnIndex<T>,
        sampler: &mut RandomSampler,
    ) -> Result<usize> {
        let rows = self.dataset.rows();
        let max_checks = 2 * rows;
        let target = (self.params.target_precision + PRECISION_MARGIN).min(1.0);
        let test_size = (rows / 10).min(MAX_TEST_QUERIES);
        if test_size < MIN_TEST_QUERIES {
            return Ok(max_checks);
        }
        let (kept, tests) = split_sample(&self.dataset, test_size, sampler);
        let (kept, tests) = (kept.as_matrix(), tests.as_matrix());

        let truth = ground_truth(self.dataset, &tests, self.distance.clone(), 1)?;
        let self_checks = tune_checks(index, &tests, &truth, 1, target, max_checks)?;

        let mut held = create_index(kept, selected.clone(), self.distance.clone())?;
        held.build_index()?;
        let truth = ground_truth(kept, &tests, self.distance.clone(), 0)?;
        let held_precision = precision(held.as_ref(), &tests, &truth, 0, self_checks)?;
        let checks = if held_precision < target {
            tune_checks(held.as_ref(), &tests, &truth, 0, target, max_checks)?.max(self_checks)
        } else {
            self_checks
        };
        debug!(self_checks, held_precision, checks, "estimated checks on full dataset");
        Ok(checks)
    }

    fn inner(&self) -> Result<&dyn NnIndex<T>> {
        self.inner.as_deref().ok_or_else(FlannError::not_built)
    }
}

impl<'a, T: DatapointValue, D: Distance> NnIndex<T> for AutotunedIndex<'a, T, D> {
    fn build_index(&mut self) -> Result<()> {
        self.inner = None;
        self.params.selected = None;
        self.params.tuned_checks = None;
        let mut sampler = RandomSampler::from_option(self.params.random_seed);
        let costs = self.evaluate_candidates(&mut sampler)?;
        let selected = self.select_params(&costs);

        let index = self.build_selected(selected.clone())?;
        self.tuned = match index.index_type() {
            IndexType::Linear => SearchParams::unlimited(),
            _ => SearchParams::new(self.estimate_checks(&selected, index.as_ref(), &mut sampler)?),
        };
        info!(
            selected = %index.index_type(),
            checks = ?self.tuned.checks,
            "built autotuned index"
        );
        self.params.selected = Some(Box::new(index.parameters()));
        self.params.tuned_checks = Some(self.tuned.checks);
        self.inner = Some(index);
        #[cfg(test)]
        {
            self.costs = costs;
        }
        Ok(())
    }

    fn is_built(&self) -> bool {
        self.inner.as_ref().map_or(false, |i| i.is_built())
    }

    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[T],
        params: &SearchParams,
    ) -> Result<()> {
        let inner = self.inner()?;
        if params.checks == Checks::Autotuned {
            let params = params.clone().with_checks(self.tuned.checks);
            inner.find_neighbors(result, query, &params)
        } else {
            inner.find_neighbors(result, query, params)
        }
    }

    fn size(&self) -> usize {
        self.dataset.rows()
    }

    fn veclen(&self) -> usize {
        self.dataset.cols()
    }

    fn used_memory(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.used_memory())
    }

    fn index_type(&self) -> IndexType {
        IndexType::Autotuned
    }

    fn parameters(&self) -> IndexParams {
        IndexParams::Autotuned(self.params.clone())
    }

    fn header(&self) -> IndexHeader {
        IndexHeader::new::<T, D>(self.parameters(), self.size(), self.veclen())
    }

    fn save_body(&self, writer: &mut dyn Write) -> Result<()> {
        write_record(writer, &self.tuned)?;
        self.inner()?.save_index(writer)
    }

    fn load_body(&mut self, header: &IndexHeader, reader: &mut dyn Read) -> Result<()> {
        let IndexParams::Autotuned(params) = &header.params else {
            return Err(FlannError::data_loss("expected autotuned parameters"));
        };
        self.inner = None;
        let tuned: SearchParams = read_record(reader)?;
        tuned
            .validate()
            .map_err(|e| FlannError::data_loss(format!("stored search parameters: {}", e.message())))?;

        if params.tuned_checks != Some(tuned.checks) {
            return Err(FlannError::data_loss("stored checks disagree with the header"));
        }

        let nested = IndexHeader::read(reader)?;
        if nested.params.index_type() == IndexType::Autotuned {
            return Err(FlannError::data_loss("autotuned index cannot nest another"));
        }
        if params.selected.as_deref() != Some(&nested.params) {
            return Err(FlannError::data_loss("nested index disagrees with the selected parameters"));
        }
        let mut index = create_index(self.dataset, nested.params.clone(), self.distance.clone())?;
        nested.check_compatible(&index.header())?;
        index.load_body(&nested, reader)?;
        debug!(selected = %index.index_type(), "loaded autotuned index");
        self.params = params.clone();
        self.tuned = tuned;
        self.inner = Some(index);
        Ok(())
    }
}
