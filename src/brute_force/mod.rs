//! Brute-force nearest neighbor search.
//!
//! This module provides exact nearest neighbor search by exhaustively
//! computing distances to all datapoints. It doubles as the ground truth for
//! the autotuner.

mod linear;

pub use linear::LinearIndex;
