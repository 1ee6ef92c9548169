//! Core type definitions.
//!
//! This module contains the element trait every dataset value implements and
//! the small value types shared by indexes and result collectors.

use num_traits::{NumCast, One, Zero};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

/// Index of a point (row) in the indexed dataset.
pub type DatapointIndex = usize;

/// Sentinel written into index output buffers for slots with no neighbor.
pub const NO_NEIGHBOR: DatapointIndex = DatapointIndex::MAX;

/// A single search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Row of the point in the indexed dataset.
    pub index: DatapointIndex,
    /// Distance to the query, in the units of the index's distance functor.
    pub distance: f32,
}

impl Neighbor {
    /// Create a new hit.
    pub fn new(index: DatapointIndex, distance: f32) -> Self {
        Self { index, distance }
    }
}

/// Trait for numeric types that can be stored in an indexed dataset.
pub trait DatapointValue:
    Copy
    + Clone
    + Default
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Zero
    + One
    + NumCast
    + Serialize
    + DeserializeOwned
    + std::fmt::Debug
    + Send
    + Sync
    + 'static
{
    /// Name recorded in persisted index headers.
    const NAME: &'static str;

    /// Width of the value's bit pattern, used by Hamming distance and LSH.
    const BITS: u32;

    /// Convert to f32 for distance computations.
    fn as_f32(self) -> f32;

    /// Raw bit pattern, zero extended.
    fn bit_pattern(self) -> u64;

    /// Check if this is a floating-point type.
    fn is_floating() -> bool;
}

macro_rules! impl_integer_value {
    ($t:ty, $name:expr, $unsigned:ty) => {
        impl DatapointValue for $t {
            const NAME: &'static str = $name;
            const BITS: u32 = <$t>::BITS;

            #[inline]
            fn as_f32(self) -> f32 {
                self as f32
            }

            #[inline]
            fn bit_pattern(self) -> u64 {
                self as $unsigned as u64
            }

            #[inline]
            fn is_floating() -> bool {
                false
            }
        }
    };
}

impl_integer_value!(u8, "u8", u8);
impl_integer_value!(i8, "i8", u8);
impl_integer_value!(u16, "u16", u16);
impl_integer_value!(i16, "i16", u16);
impl_integer_value!(u32, "u32", u32);
impl_integer_value!(i32, "i32", u32);

impl DatapointValue for f32 {
    const NAME: &'static str = "f32";
    const BITS: u32 = 32;

    #[inline]
    fn as_f32(self) -> f32 {
        self
    }

    #[inline]
    fn bit_pattern(self) -> u64 {
        self.to_bits() as u64
    }

    #[inline]
    fn is_floating() -> bool {
        true
    }
}

impl DatapointValue for f64 {
    const NAME: &'static str = "f64";
    const BITS: u32 = 64;

    #[inline]
    fn as_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn bit_pattern(self) -> u64 {
        self.to_bits()
    }

    #[inline]
    fn is_floating() -> bool {
        true
    }
}

/// Memory alignment used for owned datasets (one cache line).
pub const SIMD_ALIGNMENT: usize = 64;

/// Round up to the nearest multiple of alignment.
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}
