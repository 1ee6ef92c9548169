//! Node pool for tree indexes.
//!
//! Trees allocate many small nodes during build. Instead of boxing each node,
//! an index owns one [`NodePool`] and refers to nodes by [`NodeId`]. The pool
//! grows in chunks and is dropped as a unit with the index.

use crate::error::{FlannError, Result};
use serde::{Deserialize, Serialize};

/// Number of nodes reserved each time the pool runs out of room.
const CHUNK_NODES: usize = 1024;

/// Stable handle to a node in a [`NodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node inside its pool.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Chunked arena of tree nodes.
///
/// Serializes as the plain node list; handles stay valid across a round
/// trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePool<N> {
    nodes: Vec<N>,
}

impl<N> NodePool<N> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Store a node and return its handle.
    ///
    /// Allocation failure is reported as `ResourceExhausted`; a partially
    /// built tree must then be discarded.
    pub fn alloc(&mut self, node: N) -> Result<NodeId> {
        if self.nodes.len() == self.nodes.capacity() {
            self.nodes.try_reserve(CHUNK_NODES).map_err(|e| {
                FlannError::resource_exhausted(format!(
                    "node pool could not grow past {} nodes: {}",
                    self.nodes.len(),
                    e
                ))
            })?;
        }
        let id = u32::try_from(self.nodes.len()).map_err(|_| {
            FlannError::resource_exhausted("node pool exceeded u32::MAX nodes")
        })?;
        self.nodes.push(node);
        Ok(NodeId(id))
    }

    /// Borrow a node.
    #[inline]
    pub fn get(&self, id: NodeId) -> &N {
        &self.nodes[id.index()]
    }

    /// Mutably borrow a node.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut N {
        &mut self.nodes[id.index()]
    }

    /// Number of allocated nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node has been allocated.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in allocation order.
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Drop every node, keeping the reserved memory.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Bytes reserved by the pool.
    pub fn used_memory(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<N>()
    }
}

impl<N> Default for NodePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut pool = NodePool::new();
        let a = pool.alloc(10u32).unwrap();
        let b = pool.alloc(20u32).unwrap();
        assert_ne!(a, b);
        assert_eq!(*pool.get(a), 10);
        *pool.get_mut(b) += 1;
        assert_eq!(*pool.get(b), 21);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_grows_in_chunks() {
        let mut pool = NodePool::new();
        pool.alloc(0u64).unwrap();
        assert!(pool.used_memory() >= CHUNK_NODES * std::mem::size_of::<u64>());
        for i in 0..(CHUNK_NODES as u64 * 2) {
            pool.alloc(i).unwrap();
        }
        assert_eq!(pool.len(), CHUNK_NODES * 2 + 1);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut pool = NodePool::new();
        let a = pool.alloc((1u8, None::<NodeId>)).unwrap();
        pool.alloc((2u8, Some(a))).unwrap();
        let json = serde_json::to_string(&pool).unwrap();
        let back: NodePool<(u8, Option<NodeId>)> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes(), pool.nodes());
    }

    #[test]
    fn test_clear() {
        let mut pool = NodePool::new();
        pool.alloc(1u8).unwrap();
        pool.clear();
        assert!(pool.is_empty());
    }
}
