//! Algorithm-agnostic index front end.
//!
//! [`Index`] picks the concrete index from [`IndexParams`] and forwards every
//! [`NnIndex`] operation to it. It is also the entry point for loading a saved
//! index without knowing its algorithm in advance.

use crate::autotune::AutotunedIndex;
use crate::brute_force::LinearIndex;
use crate::config::{IndexParams, IndexType, SearchParams};
use crate::data_format::Matrix;
use crate::distance_measures::Distance;
use crate::error::{FlannError, Result};
use crate::hashes::LshIndex;
use crate::persistence::IndexHeader;
use crate::result_set::ResultSet;
use crate::searcher::NnIndex;
use crate::trees::{KMeansIndex, KdTreeIndex, KdTreeSingleIndex};
use crate::types::DatapointValue;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use tracing::info;

/// Create the unbuilt index described by `params`.
pub(crate) fn create_index<'a, T: DatapointValue, D: Distance>(
    dataset: Matrix<'a, T>,
    params: IndexParams,
    distance: D,
) -> Result<Box<dyn NnIndex<T> + 'a>> {
    Ok(match params {
        IndexParams::Linear => Box::new(LinearIndex::new(dataset, distance)),
        IndexParams::KdTree(p) => Box::new(KdTreeIndex::new(dataset, p, distance)?),
        IndexParams::KdTreeSingle(p) => Box::new(KdTreeSingleIndex::new(dataset, p, distance)?),
        IndexParams::KMeans(p) => Box::new(KMeansIndex::new(dataset, p, distance)?),
        IndexParams::Lsh(p) => Box::new(LshIndex::new(dataset, p, distance)?),
        IndexParams::Autotuned(p) => Box::new(AutotunedIndex::new(dataset, p, distance)?),
    })
}

/// A nearest neighbor index of any supported algorithm.
///
/// ```
/// use flann::prelude::*;
///
/// let data: Vec<f32> = (0..400).map(|i| (i % 97) as f32).collect();
/// let dataset = Matrix::new(&data, 100, 4).unwrap();
/// let mut index = Index::new(dataset, KdTreeParams::new(2).into(), SquaredL2).unwrap();
/// index.build_index().unwrap();
///
/// let found = index.knn_search_vec(&dataset, 1, &SearchParams::unlimited()).unwrap();
/// assert!(found.iter().all(|row| row[0].distance == 0.0));
/// ```
pub struct Index<'a, T, D> {
    inner: Box<dyn NnIndex<T> + 'a>,
    distance: PhantomData<D>,
}

impl<'a, T: DatapointValue, D: Distance> std::fmt::Debug for Index<'a, T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("index_type", &self.inner.index_type())
            .field("distance", &D::NAME)
            .field("rows", &self.inner.size())
            .field("cols", &self.inner.veclen())
            .field("built", &self.inner.is_built())
            .finish()
    }
}

impl<'a, T: DatapointValue, D: Distance> Index<'a, T, D> {
    /// Create an unbuilt index over `dataset`.
    pub fn new(dataset: Matrix<'a, T>, params: IndexParams, distance: D) -> Result<Self> {
        Ok(Self {
            inner: create_index(dataset, params, distance)?,
            distance: PhantomData,
        })
    }

    /// Create and build an index.
    pub fn build(dataset: Matrix<'a, T>, params: IndexParams, distance: D) -> Result<Self> {
        let mut index = Self::new(dataset, params, distance)?;
        index.build_index()?;
        Ok(index)
    }

    /// Load an index saved with [`save_index`](NnIndex::save_index), creating
    /// whichever algorithm the stream holds. `dataset` must be the data the
    /// index was built on.
    pub fn load(dataset: Matrix<'a, T>, reader: &mut dyn Read, distance: D) -> Result<Self> {
        let header = IndexHeader::read(reader)?;
        let mut inner = create_index(dataset, header.params.clone(), distance)
            .map_err(|e| FlannError::data_loss(format!("stored parameters: {}", e.message())))?;
        header.check_compatible(&inner.header())?;
        inner.load_body(&header, reader)?;
        info!(index_type = %inner.index_type(), rows = inner.size(), "loaded index");
        Ok(Self {
            inner,
            distance: PhantomData,
        })
    }

    /// Save to a file, replacing it.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_index(&mut writer)?;
        writer.flush()?;
        info!(index_type = %self.index_type(), path = %path.display(), "saved index");
        Ok(())
    }

    /// Load from a file written by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file<P: AsRef<Path>>(dataset: Matrix<'a, T>, path: P, distance: D) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::load(dataset, &mut reader, distance)
    }

    /// The concrete index.
    pub fn inner(&self) -> &dyn NnIndex<T> {
        self.inner.as_ref()
    }
}

impl<'a, T: DatapointValue, D: Distance> NnIndex<T> for Index<'a, T, D> {
    fn build_index(&mut self) -> Result<()> {
        self.inner.build_index()
    }

    fn is_built(&self) -> bool {
        self.inner.is_built()
    }

    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[T],
        params: &SearchParams,
    ) -> Result<()> {
        self.inner.find_neighbors(result, query, params)
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn veclen(&self) -> usize {
        self.inner.veclen()
    }

    fn used_memory(&self) -> usize {
        self.inner.used_memory()
    }

    fn index_type(&self) -> IndexType {
        self.inner.index_type()
    }

    fn parameters(&self) -> IndexParams {
        self.inner.parameters()
    }

    fn header(&self) -> IndexHeader {
        self.inner.header()
    }

    fn save_body(&self, writer: &mut dyn Write) -> Result<()> {
        self.inner.save_body(writer)
    }

    fn load_body(&mut self, header: &IndexHeader, reader: &mut dyn Read) -> Result<()> {
        self.inner.load_body(header, reader)
    }
}
