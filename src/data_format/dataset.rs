//! Owned dense dataset storage.
//!
//! Indexes never own the data they are built over; this type exists for the
//! places that need private rows: the reordered copy of a single k-d tree and
//! the samples drawn by the autotuner.

use crate::data_format::matrix::Matrix;
use crate::error::{FlannError, Result};
use crate::types::{align_up, DatapointValue, SIMD_ALIGNMENT};
use aligned_vec::{AVec, ConstAlign};

/// A dense dataset storing points in contiguous, cache-line aligned memory.
///
/// Rows are padded to a whole number of cache lines; use [`as_matrix`]
/// to obtain a strided view for indexing.
///
/// [`as_matrix`]: DenseDataset::as_matrix
pub struct DenseDataset<T: DatapointValue> {
    /// Contiguous storage for all values, aligned to a cache line.
    data: AVec<T, ConstAlign<SIMD_ALIGNMENT>>,

    /// Number of points.
    num_points: usize,

    /// Dimensionality of each point.
    dimensionality: usize,

    /// Stride between points (may be > dimensionality for alignment).
    stride: usize,
}

impl<T: DatapointValue> DenseDataset<T> {
    /// Create an empty dataset of the given dimensionality.
    pub fn new(dimensionality: usize) -> Self {
        Self {
            data: AVec::new(SIMD_ALIGNMENT),
            num_points: 0,
            dimensionality,
            stride: Self::compute_stride(dimensionality),
        }
    }

    /// Create an empty dataset with room for `capacity` points.
    pub fn with_capacity(capacity: usize, dimensionality: usize) -> Self {
        let mut dataset = Self::new(dimensionality);
        dataset.data.reserve(capacity * dataset.stride);
        dataset
    }

    /// Compute the stride for a given dimensionality.
    fn compute_stride(dimensionality: usize) -> usize {
        let elem_size = std::mem::size_of::<T>().max(1);
        let elems_per_line = (SIMD_ALIGNMENT / elem_size).max(1);
        align_up(dimensionality, elems_per_line)
    }

    /// Create a dataset from a vector of rows.
    pub fn from_vecs(vecs: Vec<Vec<T>>) -> Result<Self> {
        let dimensionality = vecs.first().map(|v| v.len()).unwrap_or(0);
        let mut dataset = Self::with_capacity(vecs.len(), dimensionality);
        for row in &vecs {
            dataset.push(row)?;
        }
        Ok(dataset)
    }

    /// Create a dataset from a flat row-major array.
    pub fn from_flat(data: &[T], dimensionality: usize) -> Result<Self> {
        let view = Matrix::from_flat(data, dimensionality)?;
        Ok(Self::from_matrix(&view))
    }

    /// Copy every row of a view.
    pub fn from_matrix(matrix: &Matrix<'_, T>) -> Self {
        Self::from_rows(matrix, 0..matrix.rows())
    }

    /// Copy the given rows of a view, in iteration order.
    pub fn from_rows<I>(matrix: &Matrix<'_, T>, rows: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let rows = rows.into_iter();
        let mut dataset = Self::with_capacity(rows.size_hint().0, matrix.cols());
        for i in rows {
            dataset.push_unchecked(matrix.row(i));
        }
        dataset
    }

    /// Append a row.
    pub fn push(&mut self, row: &[T]) -> Result<()> {
        if row.len() != self.dimensionality {
            return Err(FlannError::invalid_argument(format!(
                "Row dimensionality {} does not match dataset dimensionality {}",
                row.len(),
                self.dimensionality
            )));
        }
        self.push_unchecked(row);
        Ok(())
    }

    fn push_unchecked(&mut self, row: &[T]) {
        let old_len = self.data.len();
        self.data.resize(old_len + self.stride, T::default());
        self.data[old_len..old_len + row.len()].copy_from_slice(row);
        self.num_points += 1;
    }

    /// Number of points.
    pub fn size(&self) -> usize {
        self.num_points
    }

    /// Whether the dataset holds no points.
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// Dimensionality of each point.
    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    /// Get the stride between points.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Borrow point `i`.
    pub fn get(&self, i: usize) -> Option<&[T]> {
        if i >= self.num_points {
            return None;
        }
        let offset = i * self.stride;
        Some(&self.data[offset..offset + self.dimensionality])
    }

    /// Strided view over all points.
    pub fn as_matrix(&self) -> Matrix<'_, T> {
        Matrix::from_parts(&self.data, self.num_points, self.dimensionality, self.stride)
    }

    /// Packed copy of all rows (no stride padding).
    pub fn to_flat(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.num_points * self.dimensionality);
        for i in 0..self.num_points {
            let offset = i * self.stride;
            out.extend_from_slice(&self.data[offset..offset + self.dimensionality]);
        }
        out
    }

    /// Bytes held by the backing storage.
    pub fn used_memory(&self) -> usize {
        self.data.capacity() * std::mem::size_of::<T>()
    }
}

impl<T: DatapointValue> Clone for DenseDataset<T> {
    fn clone(&self) -> Self {
        let mut data: AVec<T, ConstAlign<SIMD_ALIGNMENT>> = AVec::new(SIMD_ALIGNMENT);
        data.reserve(self.data.len());
        for &val in self.data.iter() {
            data.push(val);
        }
        Self {
            data,
            num_points: self.num_points,
            dimensionality: self.dimensionality,
            stride: self.stride,
        }
    }
}

impl<T: DatapointValue> std::fmt::Debug for DenseDataset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseDataset")
            .field("num_points", &self.num_points)
            .field("dimensionality", &self.dimensionality)
            .field("stride", &self.stride)
            .finish()
    }
}
