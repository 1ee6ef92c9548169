//! Multi-probe locality-sensitive hashing index.

use crate::config::{IndexParams, IndexType, LshParams, SearchParams};
use crate::data_format::Matrix;
use crate::distance_measures::Distance;
use crate::error::{FlannError, Result};
use crate::hashes::lsh_table::{probe_masks, BucketStorage, LshTable, TableRecord};
use crate::persistence::{read_record, write_record, IndexHeader};
use crate::result_set::ResultSet;
use crate::searcher::NnIndex;
use crate::types::DatapointValue;
use crate::utils::RandomSampler;
use rustc_hash::FxHashSet;
use std::io::{Read, Write};
use tracing::debug;

/// LSH index over the raw bit patterns of integer features.
///
/// Every table hashes a point on its own random subset of feature bits. A
/// query visits its own bucket in every table plus the buckets whose keys
/// differ in at most `multi_probe_level` bits. Each candidate is scored once
/// per query however many buckets hold it. There is no pruning bound: recall
/// depends only on the build parameters.
#[derive(Debug)]
pub struct LshIndex<'a, T, D> {
    dataset: Matrix<'a, T>,
    params: LshParams,
    distance: D,
    tables: Vec<LshTable>,
    xor_masks: Vec<u64>,
    built: bool,
}

impl<'a, T: DatapointValue, D: Distance> LshIndex<'a, T, D> {
    /// Create an unbuilt index. Floating point element types are rejected,
    /// as are keys longer than the feature bit count.
    pub fn new(dataset: Matrix<'a, T>, params: LshParams, distance: D) -> Result<Self> {
        IndexParams::Lsh(params.clone()).validate()?;
        if T::is_floating() {
            return Err(FlannError::invalid_argument(format!(
                "lsh requires integer features, got {}",
                T::NAME
            )));
        }
        let feature_bits = dataset.cols() * T::BITS as usize;
        if params.key_size > feature_bits {
            return Err(FlannError::invalid_argument(format!(
                "lsh key_size {} exceeds the {} feature bits",
                params.key_size, feature_bits
            )));
        }
        let xor_masks = probe_masks(params.key_size, params.multi_probe_level);
        Ok(Self {
            dataset,
            params,
            distance,
            tables: Vec::new(),
            xor_masks,
            built: false,
        })
    }

    fn feature_bits(&self) -> usize {
        self.dataset.cols() * T::BITS as usize
    }

    /// Number of hash tables built.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Bucket layout of each table.
    pub fn table_storage(&self) -> Vec<BucketStorage> {
        self.tables.iter().map(LshTable::storage).collect()
    }

    /// Probes per table and query, the exact key included.
    pub fn probes_per_table(&self) -> usize {
        self.xor_masks.len()
    }

    /// Build with an explicit random source instead of the configured seed.
    pub fn build_with(&mut self, sampler: &mut RandomSampler) -> Result<()> {
        self.built = false;
        self.tables.clear();
        let feature_bits = self.feature_bits();
        for _ in 0..self.params.table_number {
            let mut table = LshTable::new(feature_bits, self.params.key_size, sampler);
            for (i, row) in self.dataset.iter().enumerate() {
                let key = table.key(row);
                table.add(key, i);
            }
            table.optimize();
            self.tables.push(table);
        }
        debug!(
            points = self.dataset.rows(),
            tables = self.tables.len(),
            buckets = self.tables.iter().map(LshTable::bucket_count).sum::<usize>(),
            probes = self.xor_masks.len(),
            "built lsh index"
        );
        self.built = true;
        Ok(())
    }
}

impl<'a, T: DatapointValue, D: Distance> NnIndex<T> for LshIndex<'a, T, D> {
    fn build_index(&mut self) -> Result<()> {
        let mut sampler = RandomSampler::from_option(self.params.random_seed);
        self.build_with(&mut sampler)
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
        let mut seen: FxHashSet<usize> = FxHashSet::default();
        for table in &self.tables {
            let key = table.key(query);
            for &mask in &self.xor_masks {
                for &index in table.bucket(key ^ mask) {
                    if !seen.insert(index) {
                        continue;
                    }
                    let dist = self
                        .distance
                        .eval(self.dataset.row(index), query, Some(result.worst_dist()));
                    result.add_point(dist, index);
                }
            }
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
        self.tables.iter().map(LshTable::used_memory).sum::<usize>()
            + self.xor_masks.capacity() * std::mem::size_of::<u64>()
    }

    fn index_type(&self) -> IndexType {
        IndexType::Lsh
    }

    fn parameters(&self) -> IndexParams {
        IndexParams::Lsh(self.params.clone())
    }

    fn header(&self) -> IndexHeader {
        IndexHeader::new::<T, D>(self.parameters(), self.size(), self.veclen())
    }

    fn save_body(&self, writer: &mut dyn Write) -> Result<()> {
        let records: Vec<TableRecord> = self.tables.iter().map(LshTable::to_record).collect();
        write_record(writer, &records)
    }

    fn load_body(&mut self, header: &IndexHeader, reader: &mut dyn Read) -> Result<()> {
        let IndexParams::Lsh(params) = &header.params else {
            return Err(FlannError::data_loss("expected lsh parameters"));
        };
        if params.key_size > self.feature_bits() {
            return Err(FlannError::data_loss(format!(
                "stored key_size {} exceeds the {} feature bits",
                params.key_size,
                self.feature_bits()
            )));
        }
        self.built = false;
        self.params = params.clone();
        self.xor_masks = probe_masks(params.key_size, params.multi_probe_level);

        let records: Vec<TableRecord> = read_record(reader)?;
        if records.len() != self.params.table_number {
            return Err(FlannError::data_loss(format!(
                "stream has {} tables, parameters say {}",
                records.len(),
                self.params.table_number
            )));
        }
        let (feature_bits, rows) = (self.feature_bits(), self.dataset.rows());
        self.tables = records
            .into_iter()
            .map(|r| LshTable::from_record(r, feature_bits, self.params.key_size, rows))
            .collect::<Result<_>>()?;
        debug!(tables = self.tables.len(), "loaded lsh index");
        self.built = true;
        Ok(())
    }
}
