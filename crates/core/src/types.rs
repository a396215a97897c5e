//! Core entity types for the property-graph data model
//!
//! Nodes, edges and embeddings are fixed-size records so the pools can
//! pre-allocate slot arrays up front. Property payloads are small fixed
//! blobs, not heap strings.

use crate::error::{Error, Result};
use crate::limits::{MAX_EDGE_PROPS, MAX_NODE_PROPS};
use std::fmt;

/// Node identity. `0` is reserved; live ids are strictly positive.
pub type NodeId = u64;

/// Edge label tag.
pub type EdgeLabel = u16;

/// Node type tag.
pub type NodeKind = u8;

/// Log sequence number: strictly monotonically increasing, assigned to
/// every WAL entry.
pub type Lsn = u64;

/// Which pre-allocated pool an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Node slots
    Node,
    /// Edge slots
    Edge,
    /// Embedding slots
    Embedding,
    /// Shared-memory participant slots
    Participant,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Node => write!(f, "node"),
            PoolKind::Edge => write!(f, "edge"),
            PoolKind::Embedding => write!(f, "embedding"),
            PoolKind::Participant => write!(f, "participant"),
        }
    }
}

/// Identity of an edge: the (from, to, label) triple.
///
/// Two live edges never share a key; re-inserting an identical triple is
/// rejected as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    /// Source node id
    pub from: NodeId,
    /// Target node id
    pub to: NodeId,
    /// Edge label
    pub label: EdgeLabel,
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -[{}]-> {})", self.from, self.label, self.to)
    }
}

/// Fixed-capacity property blob.
///
/// `N` is the compile-time maximum; the live prefix length is tracked
/// separately so slots can be zeroed on free without heap traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropBlob<const N: usize> {
    len: u16,
    bytes: [u8; N],
}

impl<const N: usize> PropBlob<N> {
    /// The empty blob.
    pub const fn empty() -> Self {
        PropBlob {
            len: 0,
            bytes: [0u8; N],
        }
    }

    /// Copy `data` into a new blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PropsTooLarge`] when `data` exceeds `N` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > N {
            return Err(Error::PropsTooLarge {
                len: data.len(),
                max: N,
            });
        }
        let mut bytes = [0u8; N];
        bytes[..data.len()].copy_from_slice(data);
        Ok(PropBlob {
            len: data.len() as u16,
            bytes,
        })
    }

    /// The live prefix of the blob.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Live length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the blob holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for PropBlob<N> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Node property payload (≤128 bytes).
pub type NodeProps = PropBlob<MAX_NODE_PROPS>;

/// Edge property payload (≤64 bytes).
pub type EdgeProps = PropBlob<MAX_EDGE_PROPS>;

/// A node as stored in its pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    /// Strictly positive node id
    pub id: NodeId,
    /// Type tag
    pub kind: NodeKind,
    /// Property blob
    pub props: NodeProps,
}

impl NodeRecord {
    /// Build a record, validating the id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] for the reserved id `0`.
    pub fn new(id: NodeId, kind: NodeKind, props: NodeProps) -> Result<Self> {
        if id == 0 {
            return Err(Error::InvalidId(0));
        }
        Ok(NodeRecord { id, kind, props })
    }
}

/// An edge as stored in its pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRecord {
    /// Source node id
    pub from: NodeId,
    /// Target node id
    pub to: NodeId,
    /// Edge label
    pub label: EdgeLabel,
    /// Property blob
    pub props: EdgeProps,
}

impl EdgeRecord {
    /// Build a record, validating both endpoint ids.
    ///
    /// Self-loops (`from == to`) are rejected at the facade, not here;
    /// replay must be able to reconstruct whatever the WAL holds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] when either endpoint is the reserved
    /// id `0`.
    pub fn new(from: NodeId, to: NodeId, label: EdgeLabel, props: EdgeProps) -> Result<Self> {
        if from == 0 || to == 0 {
            return Err(Error::InvalidId(0));
        }
        Ok(EdgeRecord {
            from,
            to,
            label,
            props,
        })
    }

    /// This edge's identity triple.
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            from: self.from,
            to: self.to,
            label: self.label,
        }
    }
}

/// A dense vector embedding attached to a node.
///
/// The vector dimension is fixed per database (configuration), not per
/// record; the store validates it on insert. At most one active embedding
/// exists per node.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    /// The node this embedding describes (a relation, not ownership)
    pub node_id: NodeId,
    /// Dense vector of the configured dimension
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    /// Build a record, validating the node id.
    pub fn new(node_id: NodeId, vector: Vec<f32>) -> Result<Self> {
        if node_id == 0 {
            return Err(Error::InvalidId(0));
        }
        Ok(EmbeddingRecord { node_id, vector })
    }
}
