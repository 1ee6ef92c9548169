//! Non-owning row-major matrix view.
//!
//! Every index is built over a [`Matrix`] that borrows externally owned
//! storage for the lifetime `'a`. The index keeps row indices into the view,
//! never copies of the rows.

use crate::error::{FlannError, Result};
use crate::types::DatapointValue;

/// A borrowed, row-major view over `rows` points of `cols` dimensions.
///
/// Consecutive rows start `stride` elements apart (`stride >= cols`), so a
/// view can alias padded storage such as [`DenseDataset`](super::DenseDataset).
#[derive(Debug)]
pub struct Matrix<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
    stride: usize,
}

impl<'a, T> Clone for Matrix<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for Matrix<'a, T> {}

impl<'a, T: DatapointValue> Matrix<'a, T> {
    /// Create a view over tightly packed rows.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Result<Self> {
        Self::with_stride(data, rows, cols, cols)
    }

    /// Create a view whose rows start `stride` elements apart.
    pub fn with_stride(data: &'a [T], rows: usize, cols: usize, stride: usize) -> Result<Self> {
        if cols == 0 && rows > 0 {
            return Err(FlannError::invalid_argument("Matrix must have at least one column"));
        }
        if stride < cols {
            return Err(FlannError::invalid_argument(format!(
                "Stride {} is smaller than the number of columns {}",
                stride, cols
            )));
        }
        let needed = if rows == 0 { 0 } else { (rows - 1) * stride + cols };
        if data.len() < needed {
            return Err(FlannError::invalid_argument(format!(
                "Buffer of {} elements is too small for a {}x{} matrix with stride {}",
                data.len(),
                rows,
                cols,
                stride
            )));
        }
        Ok(Self {
            data,
            rows,
            cols,
            stride,
        })
    }

    /// Assemble a view whose shape the caller has already validated.
    pub(crate) fn from_parts(data: &'a [T], rows: usize, cols: usize, stride: usize) -> Self {
        debug_assert!(rows == 0 || data.len() >= (rows - 1) * stride + cols);
        Self {
            data,
            rows,
            cols,
            stride,
        }
    }

    /// View a flat buffer whose length must be a multiple of `cols`.
    pub fn from_flat(data: &'a [T], cols: usize) -> Result<Self> {
        if cols == 0 {
            return Err(FlannError::invalid_argument("Dimensionality cannot be 0"));
        }
        if data.len() % cols != 0 {
            return Err(FlannError::invalid_argument(
                "Data length must be a multiple of dimensionality",
            ));
        }
        Self::new(data, data.len() / cols, cols)
    }

    /// Number of points.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Dimensionality of each point.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Elements between the starts of consecutive rows.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whether the view holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow row `i`. Panics when `i >= rows`, like slice indexing.
    #[inline]
    pub fn row(&self, i: usize) -> &'a [T] {
        assert!(i < self.rows, "row {} out of bounds for {} rows", i, self.rows);
        let start = i * self.stride;
        &self.data[start..start + self.cols]
    }

    /// Borrow row `i`, or `None` when out of bounds.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&'a [T]> {
        if i < self.rows {
            Some(self.row(i))
        } else {
            None
        }
    }

    /// Iterate over all rows in order.
    pub fn iter(&self) -> impl Iterator<Item = &'a [T]> + 'a {
        let Matrix {
            data,
            rows,
            cols,
            stride,
        } = *self;
        (0..rows).map(move |i| &data[i * stride..i * stride + cols])
    }

    /// Size in bytes of the viewed elements (excluding stride padding).
    pub fn byte_size(&self) -> usize {
        self.rows * self.cols * std::mem::size_of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_basic() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = Matrix::new(&data, 2, 3).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert!(m.get(2).is_none());
    }

    #[test]
    fn test_matrix_stride() {
        let data = vec![1u8, 2, 0, 3, 4, 0];
        let m = Matrix::with_stride(&data, 2, 2, 3).unwrap();
        assert_eq!(m.row(0), &[1, 2]);
        assert_eq!(m.row(1), &[3, 4]);
        let rows: Vec<_> = m.iter().collect();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_matrix_too_small() {
        let data = vec![1.0f32; 5];
        assert!(Matrix::new(&data, 2, 3).is_err());
        assert!(Matrix::with_stride(&data, 1, 3, 2).is_err());
    }

    #[test]
    fn test_matrix_from_flat() {
        let data = vec![0i32; 12];
        let m = Matrix::from_flat(&data, 4).unwrap();
        assert_eq!(m.rows(), 3);
        assert!(Matrix::from_flat(&data, 5).is_err());
        assert!(Matrix::from_flat(&data, 0).is_err());
    }

    #[test]
    fn test_matrix_empty() {
        let data: Vec<f32> = Vec::new();
        let m = Matrix::new(&data, 0, 4).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.iter().count(), 0);
    }
}
