//! The index capability trait.
//!
//! Every index type implements [`NnIndex`]. The trait is object safe so that
//! the factory and the autotuner can hold any index behind a `Box<dyn NnIndex>`
//! without knowing its concrete type. Batched searches are provided on top of
//! the single-query [`NnIndex::find_neighbors`].

use crate::config::{IndexParams, IndexType, SearchParams};
use crate::data_format::Matrix;
use crate::error::{FlannError, Result};
use crate::persistence::IndexHeader;
use crate::result_set::{KnnResultSet, RadiusResultSet, ResultSet};
use crate::types::{DatapointIndex, DatapointValue, Neighbor};
use crate::utils::parallel::{for_each_row_chunk, maybe_parallel_map_threshold};
use crate::utils::MIN_PARALLEL_QUERIES;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A nearest neighbor index over a borrowed dataset.
///
/// Indexes are built once with [`build_index`](NnIndex::build_index) and then
/// queried through `&self`, so a built index can be shared across threads.
pub trait NnIndex<T: DatapointValue>: Send + Sync {
    /// Build (or rebuild from scratch) the search structure.
    fn build_index(&mut self) -> Result<()>;

    /// Whether the index can answer queries.
    fn is_built(&self) -> bool;

    /// Feed the neighbors of `query` into `result`.
    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[T],
        params: &SearchParams,
    ) -> Result<()>;

    /// Number of indexed points.
    fn size(&self) -> usize;

    /// Dimensionality of the indexed points.
    fn veclen(&self) -> usize;

    /// Bytes used by the search structure, excluding the borrowed dataset.
    fn used_memory(&self) -> usize;

    /// Algorithm tag.
    fn index_type(&self) -> IndexType;

    /// Effective build parameters, including tuned values.
    fn parameters(&self) -> IndexParams;

    /// Header describing this index when saved.
    fn header(&self) -> IndexHeader;

    /// Write the index body (everything after the header).
    fn save_body(&self, writer: &mut dyn Write) -> Result<()>;

    /// Read an index body written by [`save_body`](NnIndex::save_body).
    /// `header` has already been checked against this index.
    fn load_body(&mut self, header: &IndexHeader, reader: &mut dyn Read) -> Result<()>;

    /// Save the header and body.
    fn save_index(&self, writer: &mut dyn Write) -> Result<()> {
        if !self.is_built() {
            return Err(FlannError::not_built());
        }
        self.header().write(writer)?;
        self.save_body(writer)
    }

    /// Replace this index's structure with one read from `reader`.
    fn load_index(&mut self, reader: &mut dyn Read) -> Result<()> {
        let header = IndexHeader::read(reader)?;
        header.check_compatible(&self.header())?;
        self.load_body(&header, reader)
    }

    /// Check that the index is built, `query` has the right length and
    /// `params` are usable.
    fn check_query(&self, query: &[T], params: &SearchParams) -> Result<()> {
        if !self.is_built() {
            return Err(FlannError::not_built());
        }
        if query.len() != self.veclen() {
            return Err(FlannError::invalid_argument(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.veclen()
            )));
        }
        params.validate()
    }

    /// k-nearest neighbor search for a batch of queries.
    ///
    /// `indices` and `dists` are row-major `(queries.rows(), k)` buffers.
    /// Rows with fewer than `k` results are padded with
    /// [`NO_NEIGHBOR`](crate::types::NO_NEIGHBOR) and `f32::INFINITY`.
    fn knn_search(
        &self,
        queries: &Matrix<'_, T>,
        indices: &mut [DatapointIndex],
        dists: &mut [f32],
        k: usize,
        params: &SearchParams,
    ) -> Result<()> {
        if k == 0 {
            return Err(FlannError::invalid_argument("k must be >= 1"));
        }
        check_batch(self.veclen(), queries, indices.len(), dists.len(), Some(k))?;
        params.validate()?;
        if !self.is_built() {
            return Err(FlannError::not_built());
        }

        let parallel = params.parallel && queries.rows() >= MIN_PARALLEL_QUERIES;
        for_each_row_chunk(indices, dists, k, parallel, |row, row_indices, row_dists| {
            let mut result = KnnResultSet::new(k);
            self.find_neighbors(&mut result, queries.row(row), params)?;
            result.copy_into(row_indices, row_dists);
            Ok::<(), FlannError>(())
        })
    }

    /// k-nearest neighbor search returning one sorted list per query.
    fn knn_search_vec(
        &self,
        queries: &Matrix<'_, T>,
        k: usize,
        params: &SearchParams,
    ) -> Result<Vec<Vec<Neighbor>>> {
        if k == 0 {
            return Err(FlannError::invalid_argument("k must be >= 1"));
        }
        check_batch(self.veclen(), queries, 0, 0, None)?;
        params.validate()?;
        batch_map(queries, params, |query| {
            let mut result = KnnResultSet::new(k);
            self.find_neighbors(&mut result, query, params)?;
            Ok(result.into_neighbors())
        })
    }

    /// Radius search for a batch of queries.
    ///
    /// Each query row of `indices`/`dists` receives up to
    /// `indices.len() / queries.rows()` hits, padded like
    /// [`knn_search`](NnIndex::knn_search). With `params.max_neighbors` set,
    /// only that many of the closest hits are collected per query. Returns
    /// the total number of hits found, which can exceed the buffer width.
    fn radius_search(
        &self,
        queries: &Matrix<'_, T>,
        indices: &mut [DatapointIndex],
        dists: &mut [f32],
        radius: f32,
        params: &SearchParams,
    ) -> Result<usize> {
        check_batch(self.veclen(), queries, indices.len(), dists.len(), None)?;
        params.validate()?;
        if !self.is_built() {
            return Err(FlannError::not_built());
        }
        if queries.is_empty() {
            return Ok(0);
        }
        let width = indices.len() / queries.rows();
        if width == 0 {
            // Count only.
            let hits = self.radius_search_vec(queries, radius, params)?;
            return Ok(hits.iter().map(Vec::len).sum());
        }

        let total = AtomicUsize::new(0);
        let parallel = params.parallel && queries.rows() >= MIN_PARALLEL_QUERIES;
        for_each_row_chunk(indices, dists, width, parallel, |row, row_indices, row_dists| {
            let found = radius_query(self, queries.row(row), radius, params)?;
            total.fetch_add(found.len(), Ordering::Relaxed);
            crate::result_set::write_neighbors(&found, row_indices, row_dists);
            Ok::<(), FlannError>(())
        })?;
        Ok(total.into_inner())
    }

    /// Radius search returning every hit per query.
    fn radius_search_vec(
        &self,
        queries: &Matrix<'_, T>,
        radius: f32,
        params: &SearchParams,
    ) -> Result<Vec<Vec<Neighbor>>> {
        check_batch(self.veclen(), queries, 0, 0, None)?;
        params.validate()?;
        batch_map(queries, params, |query| radius_query(self, query, radius, params))
    }
}

fn radius_query<T, I>(
    index: &I,
    query: &[T],
    radius: f32,
    params: &SearchParams,
) -> Result<Vec<Neighbor>>
where
    T: DatapointValue,
    I: NnIndex<T> + ?Sized,
{
    match params.max_neighbors {
        Some(max) => {
            let mut result = KnnResultSet::with_radius(max, radius);
            index.find_neighbors(&mut result, query, params)?;
            Ok(result.into_neighbors())
        }
        None => {
            let mut result = RadiusResultSet::new(radius);
            index.find_neighbors(&mut result, query, params)?;
            if params.sorted {
                result.sort();
            }
            Ok(result.neighbors())
        }
    }
}

/// Run `f` on every query row, in parallel for large batches.
fn batch_map<T, F>(
    queries: &Matrix<'_, T>,
    params: &SearchParams,
    f: F,
) -> Result<Vec<Vec<Neighbor>>>
where
    T: DatapointValue,
    F: Fn(&[T]) -> Result<Vec<Neighbor>> + Sync + Send,
{
    let rows: Vec<usize> = (0..queries.rows()).collect();
    let threshold = if params.parallel {
        MIN_PARALLEL_QUERIES
    } else {
        usize::MAX
    };
    maybe_parallel_map_threshold(&rows, threshold, |&row| f(queries.row(row)))
        .into_iter()
        .collect()
}

/// Validate batch shapes. `k` is the exact row width when given; otherwise
/// the buffers only need to split evenly into rows.
fn check_batch<T: DatapointValue>(
    veclen: usize,
    queries: &Matrix<'_, T>,
    indices_len: usize,
    dists_len: usize,
    k: Option<usize>,
) -> Result<()> {
    if queries.cols() != veclen {
        return Err(FlannError::invalid_argument(format!(
            "queries have {} dimensions, index has {}",
            queries.cols(),
            veclen
        )));
    }
    if indices_len != dists_len {
        return Err(FlannError::invalid_argument(format!(
            "indices buffer has {} slots, distances buffer has {}",
            indices_len, dists_len
        )));
    }
    match k {
        Some(k) => {
            let expected = queries.rows() * k;
            if indices_len != expected {
                return Err(FlannError::invalid_argument(format!(
                    "output buffers must hold {} x {} = {} entries, got {}",
                    queries.rows(),
                    k,
                    expected,
                    indices_len
                )));
            }
        }
        None => {
            if queries.rows() > 0 && indices_len % queries.rows() != 0 {
                return Err(FlannError::invalid_argument(format!(
                    "output buffers of {} entries do not split into {} rows",
                    indices_len,
                    queries.rows()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_batch_shapes() {
        let data = vec![0.0f32; 12];
        let queries = Matrix::new(&data, 3, 4).unwrap();
        assert!(check_batch(4, &queries, 6, 6, Some(2)).is_ok());
        assert!(check_batch(5, &queries, 6, 6, Some(2)).is_err());
        assert!(check_batch(4, &queries, 6, 5, Some(2)).is_err());
        assert!(check_batch(4, &queries, 5, 5, Some(2)).is_err());
        assert!(check_batch(4, &queries, 9, 9, None).is_ok());
        assert!(check_batch(4, &queries, 10, 10, None).is_err());
    }
}
