//! Data format types.
//!
//! This module provides the dataset view every index is built over, the
//! owned storage used for private copies, and row sampling helpers.

mod dataset;
mod matrix;
mod sample;

pub use dataset::DenseDataset;
pub use matrix::Matrix;
pub use sample::{random_sample, split_sample};
