//! Binary index persistence.
//!
//! A saved index is an [`IndexHeader`] followed by an index-specific body.
//! Records are encoded with bincode (little endian, varint integers). The
//! dataset itself is never written; loading requires the same dataset the
//! index was built over, and the header is checked against it before any
//! structural data is read.

use crate::config::IndexParams;
use crate::distance_measures::Distance;
use crate::error::{FlannError, Result};
use crate::types::DatapointValue;
use crate::utils::NodeId;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Leading bytes of every saved index.
pub const MAGIC: [u8; 8] = *b"FLANNRS\0";

/// Version of the body layouts.
pub const FORMAT_VERSION: u32 = 1;

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
}

/// Write one record.
pub(crate) fn write_record<S: Serialize + ?Sized>(writer: &mut dyn Write, value: &S) -> Result<()> {
    codec().serialize_into(writer, value)?;
    Ok(())
}

/// Read one record.
pub(crate) fn read_record<S: DeserializeOwned>(reader: &mut dyn Read) -> Result<S> {
    Ok(codec().deserialize_from(reader)?)
}

/// Description of a saved index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    magic: [u8; 8],
    version: u32,
    /// Element type name of the indexed dataset.
    pub element_type: String,
    /// Distance functor name.
    pub distance: String,
    /// Number of indexed points.
    pub rows: u64,
    /// Dimensionality.
    pub cols: u64,
    /// Build parameters.
    pub params: IndexParams,
}

impl IndexHeader {
    /// Header for an index over `rows x cols` elements of `T` under `D`.
    pub fn new<T: DatapointValue, D: Distance>(params: IndexParams, rows: usize, cols: usize) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            element_type: T::NAME.to_string(),
            distance: D::NAME.to_string(),
            rows: rows as u64,
            cols: cols as u64,
            params,
        }
    }

    /// Write the header.
    pub fn write(&self, writer: &mut dyn Write) -> Result<()> {
        write_record(writer, self)
    }

    /// Read a header, checking magic and version.
    pub fn read(reader: &mut dyn Read) -> Result<Self> {
        let header: IndexHeader = read_record(reader)?;
        if header.magic != MAGIC {
            return Err(FlannError::data_loss("not a saved index: bad magic"));
        }
        if header.version != FORMAT_VERSION {
            return Err(FlannError::data_loss(format!(
                "unsupported format version {} (expected {})",
                header.version, FORMAT_VERSION
            )));
        }
        header.params.validate().map_err(|e| {
            FlannError::data_loss(format!("stored parameters are invalid: {}", e.message()))
        })?;
        Ok(header)
    }

    /// Check that this header describes an index compatible with `expected`:
    /// same element type, distance, algorithm and dataset shape.
    pub fn check_compatible(&self, expected: &IndexHeader) -> Result<()> {
        if self.element_type != expected.element_type {
            return Err(FlannError::data_loss(format!(
                "element type mismatch: stream has {}, index uses {}",
                self.element_type, expected.element_type
            )));
        }
        if self.distance != expected.distance {
            return Err(FlannError::data_loss(format!(
                "distance mismatch: stream has {}, index uses {}",
                self.distance, expected.distance
            )));
        }
        if self.params.index_type() != expected.params.index_type() {
            return Err(FlannError::data_loss(format!(
                "index type mismatch: stream has {}, expected {}",
                self.params.index_type(),
                expected.params.index_type()
            )));
        }
        if self.rows != expected.rows || self.cols != expected.cols {
            return Err(FlannError::data_loss(format!(
                "dataset shape mismatch: stream has {}x{}, dataset is {}x{}",
                self.rows, self.cols, expected.rows, expected.cols
            )));
        }
        Ok(())
    }
}

/// Check a loaded node list for forest shape.
///
/// `edges` yields `(parent, child)` pairs. Nodes are stored in pre-order, so
/// every child must come after its parent; together with "every node is
/// either a root or has exactly one parent" this rules out cycles and shared
/// subtrees.
pub(crate) fn check_forest<I>(node_count: usize, roots: &[NodeId], edges: I) -> Result<()>
where
    I: IntoIterator<Item = (usize, NodeId)>,
{
    let mut has_parent = vec![false; node_count];
    for root in roots {
        let r = root.index();
        if r >= node_count || has_parent[r] {
            return Err(FlannError::data_loss(format!("invalid root node {}", r)));
        }
        has_parent[r] = true;
    }
    for (parent, child) in edges {
        let c = child.index();
        if c >= node_count || c <= parent {
            return Err(FlannError::data_loss(format!(
                "node {} links to invalid child {}",
                parent, c
            )));
        }
        if has_parent[c] {
            return Err(FlannError::data_loss(format!("node {} has two parents", c)));
        }
        has_parent[c] = true;
    }
    if has_parent.iter().any(|&p| !p) {
        return Err(FlannError::data_loss("tree contains unreachable nodes"));
    }
    Ok(())
}

/// Check that a stored count does not exceed what the dataset allows.
pub(crate) fn check_count(what: &str, found: usize, max: usize) -> Result<()> {
    if found > max {
        return Err(FlannError::data_loss(format!(
            "{} count {} exceeds the limit {} for this dataset",
            what, found, max
        )));
    }
    Ok(())
}

/// Check that `perm` is a permutation of `0..len`.
pub(crate) fn check_permutation(perm: &[usize], len: usize) -> Result<()> {
    if perm.len() != len {
        return Err(FlannError::data_loss(format!(
            "permutation has {} entries, dataset has {} rows",
            perm.len(),
            len
        )));
    }
    let mut seen = vec![false; len];
    for &p in perm {
        if p >= len || seen[p] {
            return Err(FlannError::data_loss(format!("invalid permutation entry {}", p)));
        }
        seen[p] = true;
    }
    Ok(())
}
