//! Utility functions and types shared by the index implementations.

pub(crate) mod parallel;
pub(crate) mod pool;
pub(crate) mod random;

pub use parallel::MIN_PARALLEL_QUERIES;
pub use pool::{NodeId, NodePool};
pub use random::RandomSampler;
