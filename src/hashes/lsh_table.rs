//! A single locality-sensitive hash table.
//!
//! The key of a point is built from `key_size` fixed bits of its raw bit
//! pattern, taken in increasing bit order. Buckets start in a hash map and
//! are moved into a denser layout by [`LshTable::optimize`] once the table
//! is filled.

use crate::error::{FlannError, Result};
use crate::types::{DatapointIndex, DatapointValue};
use crate::utils::RandomSampler;
use bitvec::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Largest key size with an enumerable key space.
const MAX_DENSE_KEY_BITS: usize = 24;

/// Bucket layout picked by [`LshTable::optimize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStorage {
    /// One slot per possible key.
    Array,
    /// Hash map guarded by a presence bit per possible key.
    BitsetHash,
    /// Plain hash map.
    Hash,
}

#[derive(Debug, Clone)]
enum Buckets {
    Array(Vec<Vec<DatapointIndex>>),
    BitsetHash {
        present: BitVec,
        map: FxHashMap<u64, Vec<DatapointIndex>>,
    },
    Hash(FxHashMap<u64, Vec<DatapointIndex>>),
}

/// Persisted form of a table: its bit positions and non-empty buckets in key
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TableRecord {
    positions: Vec<u32>,
    buckets: Vec<(u64, Vec<DatapointIndex>)>,
}

#[derive(Debug, Clone)]
pub(crate) struct LshTable {
    key_size: usize,
    /// Feature bit positions making up the key, ascending.
    positions: Vec<u32>,
    buckets: Buckets,
}

impl LshTable {
    /// Empty table keyed on `key_size` distinct bits drawn from
    /// `feature_bits`.
    pub(crate) fn new(feature_bits: usize, key_size: usize, sampler: &mut RandomSampler) -> Self {
        let mut positions: Vec<u32> = sampler
            .sample_indices(feature_bits, key_size)
            .into_iter()
            .map(|p| p as u32)
            .collect();
        positions.sort_unstable();
        Self {
            key_size,
            positions,
            buckets: Buckets::Hash(FxHashMap::default()),
        }
    }

    /// Key of `feature`.
    pub(crate) fn key<T: DatapointValue>(&self, feature: &[T]) -> u64 {
        let bits = T::BITS;
        let mut key = 0u64;
        for (j, &p) in self.positions.iter().enumerate() {
            let word = feature[(p / bits) as usize].bit_pattern();
            key |= ((word >> (p % bits)) & 1) << j;
        }
        key
    }

    /// Insert a point under `key`. Only valid before [`optimize`](Self::optimize).
    pub(crate) fn add(&mut self, key: u64, index: DatapointIndex) {
        match &mut self.buckets {
            Buckets::Hash(map) => map.entry(key).or_default().push(index),
            Buckets::BitsetHash { present, map } => {
                present.set(key as usize, true);
                map.entry(key).or_default().push(index);
            }
            Buckets::Array(slots) => slots[key as usize].push(index),
        }
    }

    /// Pick the bucket layout from the filled key space.
    pub(crate) fn optimize(&mut self) {
        let map = match std::mem::replace(&mut self.buckets, Buckets::Hash(FxHashMap::default())) {
            Buckets::Hash(map) => map,
            Buckets::BitsetHash { map, .. } => map,
            other => {
                self.buckets = other;
                return;
            }
        };
        if self.key_size > MAX_DENSE_KEY_BITS {
            self.buckets = Buckets::Hash(map);
            return;
        }

        let space = 1usize << self.key_size;
        if map.len() > space / 2 {
            let mut slots = vec![Vec::new(); space];
            for (key, bucket) in map {
                slots[key as usize] = bucket;
            }
            self.buckets = Buckets::Array(slots);
        } else {
            let mut present = bitvec![0; space];
            for &key in map.keys() {
                present.set(key as usize, true);
            }
            self.buckets = Buckets::BitsetHash { present, map };
        }
    }

    /// Points stored under `key`.
    pub(crate) fn bucket(&self, key: u64) -> &[DatapointIndex] {
        match &self.buckets {
            Buckets::Array(slots) => slots.get(key as usize).map_or(&[][..], Vec::as_slice),
            Buckets::BitsetHash { present, map } => {
                if present.get(key as usize).map_or(false, |b| *b) {
                    map.get(&key).map_or(&[][..], Vec::as_slice)
                } else {
                    &[][..]
                }
            }
            Buckets::Hash(map) => map.get(&key).map_or(&[][..], Vec::as_slice),
        }
    }

    /// Current bucket layout.
    pub(crate) fn storage(&self) -> BucketStorage {
        match self.buckets {
            Buckets::Array(_) => BucketStorage::Array,
            Buckets::BitsetHash { .. } => BucketStorage::BitsetHash,
            Buckets::Hash(_) => BucketStorage::Hash,
        }
    }

    /// Number of non-empty buckets.
    pub(crate) fn bucket_count(&self) -> usize {
        match &self.buckets {
            Buckets::Array(slots) => slots.iter().filter(|b| !b.is_empty()).count(),
            Buckets::BitsetHash { map, .. } | Buckets::Hash(map) => map.len(),
        }
    }

    pub(crate) fn used_memory(&self) -> usize {
        let entry = std::mem::size_of::<DatapointIndex>();
        let bucket = std::mem::size_of::<Vec<DatapointIndex>>();
        let map_memory = |map: &FxHashMap<u64, Vec<DatapointIndex>>| {
            map.capacity() * (std::mem::size_of::<u64>() + bucket)
                + map.values().map(|b| b.capacity() * entry).sum::<usize>()
        };
        let buckets = match &self.buckets {
            Buckets::Array(slots) => {
                slots.capacity() * bucket + slots.iter().map(|b| b.capacity() * entry).sum::<usize>()
            }
            Buckets::BitsetHash { present, map } => present.capacity() / 8 + map_memory(map),
            Buckets::Hash(map) => map_memory(map),
        };
        buckets + self.positions.capacity() * std::mem::size_of::<u32>()
    }

    pub(crate) fn to_record(&self) -> TableRecord {
        let mut buckets: Vec<(u64, Vec<DatapointIndex>)> = match &self.buckets {
            Buckets::Array(slots) => slots
                .iter()
                .enumerate()
                .filter(|(_, b)| !b.is_empty())
                .map(|(k, b)| (k as u64, b.clone()))
                .collect(),
            Buckets::BitsetHash { map, .. } | Buckets::Hash(map) => {
                map.iter().map(|(&k, b)| (k, b.clone())).collect()
            }
        };
        buckets.sort_unstable_by_key(|&(k, _)| k);
        TableRecord {
            positions: self.positions.clone(),
            buckets,
        }
    }

    /// Rebuild a table from its record, checking it against the dataset
    /// shape.
    pub(crate) fn from_record(
        record: TableRecord,
        feature_bits: usize,
        key_size: usize,
        rows: usize,
    ) -> Result<Self> {
        if record.positions.len() != key_size {
            return Err(FlannError::data_loss(format!(
                "table key has {} bits, expected {}",
                record.positions.len(),
                key_size
            )));
        }
        let ascending = record.positions.windows(2).all(|w| w[0] < w[1]);
        let in_range = record.positions.iter().all(|&p| (p as usize) < feature_bits);
        if !ascending || !in_range {
            return Err(FlannError::data_loss("table key bit positions are invalid"));
        }

        let mut map = FxHashMap::default();
        for (key, bucket) in record.buckets {
            if key_size < 64 && key >> key_size != 0 {
                return Err(FlannError::data_loss(format!("bucket key {:#x} exceeds key size", key)));
            }
            if let Some(&bad) = bucket.iter().find(|&&i| i >= rows) {
                return Err(FlannError::data_loss(format!("bucket point {} out of bounds", bad)));
            }
            if map.insert(key, bucket).is_some() {
                return Err(FlannError::data_loss(format!("bucket key {:#x} repeated", key)));
            }
        }
        let mut table = Self {
            key_size,
            positions: record.positions,
            buckets: Buckets::Hash(map),
        };
        table.optimize();
        Ok(table)
    }
}

/// XOR masks of every key perturbation flipping at most `level` of the
/// `key_size` bits, ordered by the number of flipped bits. The first mask is
/// always zero.
pub(crate) fn probe_masks(key_size: usize, level: usize) -> Vec<u64> {
    let mut masks = Vec::new();
    fill_masks(0, key_size, level, &mut masks);
    masks.sort_by_key(|m| m.count_ones());
    masks
}

fn fill_masks(key: u64, lowest: usize, level: usize, masks: &mut Vec<u64>) {
    masks.push(key);
    if level == 0 {
        return;
    }
    for index in (0..lowest).rev() {
        fill_masks(key | (1u64 << index), index, level - 1, masks);
    }
}
