//! Linear scan index.

use crate::config::{IndexParams, IndexType, SearchParams};
use crate::data_format::Matrix;
use crate::distance_measures::Distance;
use crate::error::Result;
use crate::persistence::IndexHeader;
use crate::result_set::ResultSet;
use crate::searcher::NnIndex;
use crate::types::DatapointValue;
use std::io::{Read, Write};

/// Exact index that compares the query against every point.
///
/// Distances are computed with the collector's worst distance as early exit
/// bound, so most of a long scan only touches the first few dimensions of
/// each point.
#[derive(Debug, Clone)]
pub struct LinearIndex<'a, T, D> {
    dataset: Matrix<'a, T>,
    distance: D,
    built: bool,
}

impl<'a, T: DatapointValue, D: Distance> LinearIndex<'a, T, D> {
    /// Create an index over `dataset`.
    pub fn new(dataset: Matrix<'a, T>, distance: D) -> Self {
        Self {
            dataset,
            distance,
            built: false,
        }
    }

    /// Create and build an index in one step.
    pub fn built(dataset: Matrix<'a, T>, distance: D) -> Self {
        Self {
            dataset,
            distance,
            built: true,
        }
    }

    /// The indexed dataset.
    pub fn dataset(&self) -> &Matrix<'a, T> {
        &self.dataset
    }
}

impl<'a, T: DatapointValue, D: Distance> NnIndex<T> for LinearIndex<'a, T, D> {
    fn build_index(&mut self) -> Result<()> {
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
        for (i, point) in self.dataset.iter().enumerate() {
            let dist = self.distance.eval(point, query, Some(result.worst_dist()));
            result.add_point(dist, i);
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
        0
    }

    fn index_type(&self) -> IndexType {
        IndexType::Linear
    }

    fn parameters(&self) -> IndexParams {
        IndexParams::Linear
    }

    fn header(&self) -> IndexHeader {
        IndexHeader::new::<T, D>(IndexParams::Linear, self.size(), self.veclen())
    }

    fn save_body(&self, _writer: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    fn load_body(&mut self, _header: &IndexHeader, _reader: &mut dyn Read) -> Result<()> {
        self.built = true;
        Ok(())
    }
}
