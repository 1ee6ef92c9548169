//! Locality-sensitive hashing.
//!
//! Points are bucketed by a few bits of their raw bit pattern, so the index
//! only applies to integer features compared with a bitwise distance such as
//! [`Hamming`](crate::distance_measures::Hamming).

mod lsh;
mod lsh_table;

pub use lsh::LshIndex;
pub use lsh_table::BucketStorage;
