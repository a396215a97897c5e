//! Structure-of-arrays graph store
//!
//! The store composes the three slot pools and mirrors their hot fields
//! into dense parallel arrays sized at pool capacity. Scans (filter by
//! kind, filter by label, per-node edge walks) touch only the mirrors;
//! cold data (property blobs, vectors) stays in the pool slots. Mirror
//! entries and pool slots share slot numbers, so the two views never
//! disagree.
//!
//! Deletion is soft: the active flag clears and the slot generation
//! advances, but nothing is compacted in place.

use crate::pool::SlotPool;
use crate::stats::{MemoryStats, PoolStats};
use nendb_core::{
    EdgeKey, EdgeLabel, EdgeRecord, EmbeddingRecord, Error, NodeId, NodeKind, NodeRecord,
    PoolCapacities, Result,
};
use std::collections::HashSet;

/// Everything removed by a cascading node delete.
///
/// Callers that need rollback (batch undo, transaction abort) re-insert
/// these records in reverse order.
#[derive(Debug, Clone)]
pub struct NodeRemoval {
    /// The node record itself
    pub node: NodeRecord,
    /// Incident edges removed to keep every live edge on live endpoints
    pub edges: Vec<EdgeRecord>,
    /// The node's embedding, if one was active
    pub embedding: Option<EmbeddingRecord>,
}

/// SoA graph store over pre-allocated pools.
#[derive(Debug, Clone)]
pub struct GraphStore {
    nodes: SlotPool<NodeRecord>,
    edges: SlotPool<EdgeRecord>,
    embeddings: SlotPool<EmbeddingRecord>,
    embedding_dim: u32,

    node_ids: Vec<NodeId>,
    node_kinds: Vec<NodeKind>,
    node_active: Vec<bool>,

    edge_from: Vec<NodeId>,
    edge_to: Vec<NodeId>,
    edge_labels: Vec<EdgeLabel>,
    edge_active: Vec<bool>,

    embedding_nodes: Vec<NodeId>,
    embedding_active: Vec<bool>,
}

impl GraphStore {
    /// Create a store with the given pool capacities and embedding
    /// dimension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for zero capacities or a
    /// zero dimension.
    pub fn new(caps: PoolCapacities, embedding_dim: u32) -> Result<Self> {
        if embedding_dim == 0 {
            return Err(Error::InvalidConfiguration(
                "embedding dimension must be non-zero".into(),
            ));
        }
        Ok(GraphStore {
            nodes: SlotPool::new(caps.nodes)?,
            edges: SlotPool::new(caps.edges)?,
            embeddings: SlotPool::new(caps.embeddings)?,
            embedding_dim,
            node_ids: vec![0; caps.nodes as usize],
            node_kinds: vec![0; caps.nodes as usize],
            node_active: vec![false; caps.nodes as usize],
            edge_from: vec![0; caps.edges as usize],
            edge_to: vec![0; caps.edges as usize],
            edge_labels: vec![0; caps.edges as usize],
            edge_active: vec![false; caps.edges as usize],
            embedding_nodes: vec![0; caps.embeddings as usize],
            embedding_active: vec![false; caps.embeddings as usize],
        })
    }

    /// Configured embedding dimension.
    pub fn embedding_dim(&self) -> u32 {
        self.embedding_dim
    }

    /// Count of live nodes.
    pub fn node_count(&self) -> u32 {
        self.nodes.len()
    }

    /// Count of live edges.
    pub fn edge_count(&self) -> u32 {
        self.edges.len()
    }

    /// Count of live embeddings.
    pub fn embedding_count(&self) -> u32 {
        self.embeddings.len()
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Insert a node.
    pub fn add_node(&mut self, record: NodeRecord) -> Result<u32> {
        if record.id == 0 {
            return Err(Error::InvalidId(0));
        }
        let slot = self.nodes.alloc(record)?;
        self.node_ids[slot as usize] = record.id;
        self.node_kinds[slot as usize] = record.kind;
        self.node_active[slot as usize] = true;
        Ok(slot)
    }

    /// Insert a batch of nodes in one pass, all-or-nothing.
    ///
    /// The batch is validated up front (capacity, reserved ids, live and
    /// intra-batch duplicates) so no partial state is left behind.
    pub fn add_nodes(&mut self, records: &[NodeRecord]) -> Result<()> {
        let remaining = self.nodes.capacity() - self.nodes.len();
        if records.len() > remaining as usize {
            return Err(Error::PoolExhausted {
                kind: nendb_core::PoolKind::Node,
                capacity: self.nodes.capacity(),
            });
        }
        let mut seen = HashSet::with_capacity(records.len());
        for r in records {
            if r.id == 0 {
                return Err(Error::InvalidId(0));
            }
            if !seen.insert(r.id) || self.nodes.slot_of(&r.id).is_some() {
                return Err(Error::DuplicateNode(r.id));
            }
        }
        for r in records {
            self.add_node(*r)?;
        }
        Ok(())
    }

    /// Replace the kind and props of a live node.
    pub fn update_node(&mut self, record: NodeRecord) -> Result<()> {
        let Some(slot) = self.nodes.slot_of(&record.id) else {
            return Err(Error::NodeNotFound(record.id));
        };
        *self.nodes.get_mut(slot).expect("live slot") = record;
        self.node_kinds[slot as usize] = record.kind;
        Ok(())
    }

    /// The live node with `id`.
    pub fn get_node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get_by_key(&id)
    }

    /// Slot number of the live node with `id`.
    pub fn node_slot(&self, id: NodeId) -> Option<u32> {
        self.nodes.slot_of(&id)
    }

    /// Generation counter of a node slot.
    pub fn node_generation(&self, slot: u32) -> Option<u32> {
        self.nodes.generation(slot)
    }

    /// Soft-delete a node and everything hanging off it.
    ///
    /// Incident edges and the node's embedding go too: a live edge must
    /// always reference two live nodes.
    pub fn delete_node(&mut self, id: NodeId) -> Result<NodeRemoval> {
        let Some(slot) = self.nodes.slot_of(&id) else {
            return Err(Error::NodeNotFound(id));
        };
        let node = *self.nodes.get(slot).expect("live slot");

        let incident: Vec<u32> = (0..self.edge_active.len() as u32)
            .filter(|&s| {
                self.edge_active[s as usize]
                    && (self.edge_from[s as usize] == id || self.edge_to[s as usize] == id)
            })
            .collect();
        let mut edges = Vec::with_capacity(incident.len());
        for s in incident {
            edges.push(*self.edges.get(s).expect("live slot"));
            self.free_edge_slot(s)?;
        }
        if !edges.is_empty() {
            tracing::debug!(
                target: "nendb::storage",
                node = id,
                cascaded = edges.len(),
                "delete_node removed incident edges"
            );
        }

        let embedding = match self.embeddings.slot_of(&id) {
            Some(s) => {
                let e = self.embeddings.get(s).expect("live slot").clone();
                self.free_embedding_slot(s)?;
                Some(e)
            }
            None => None,
        };

        self.nodes.free(slot)?;
        self.node_active[slot as usize] = false;
        self.node_ids[slot as usize] = 0;
        self.node_kinds[slot as usize] = 0;
        Ok(NodeRemoval {
            node,
            edges,
            embedding,
        })
    }

    /// Scan `node_kinds[]` for live nodes of `kind`, writing matching slot
    /// numbers into `out`. Returns the match count (which may exceed
    /// `out.len()`; only the first `out.len()` are written).
    pub fn filter_nodes_by_kind(&self, kind: NodeKind, out: &mut [u32]) -> u32 {
        let mut count = 0u32;
        for slot in 0..self.node_active.len() {
            if self.node_active[slot] && self.node_kinds[slot] == kind {
                if (count as usize) < out.len() {
                    out[count as usize] = slot as u32;
                }
                count += 1;
            }
        }
        count
    }

    /// Highest live node id, 0 when empty. Used after replay to floor
    /// the id generator.
    pub fn max_node_id(&self) -> NodeId {
        (0..self.node_active.len())
            .filter(|&s| self.node_active[s])
            .map(|s| self.node_ids[s])
            .max()
            .unwrap_or(0)
    }

    /// Live node ids of `kind`, in slot order.
    pub fn nodes_with_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        (0..self.node_active.len())
            .filter(|&s| self.node_active[s] && self.node_kinds[s] == kind)
            .map(|s| self.node_ids[s])
            .collect()
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Insert an edge. Both endpoints must be live.
    pub fn add_edge(&mut self, record: EdgeRecord) -> Result<u32> {
        if record.from == 0 || record.to == 0 {
            return Err(Error::InvalidId(0));
        }
        if self.nodes.slot_of(&record.from).is_none() {
            return Err(Error::NodeNotFound(record.from));
        }
        if self.nodes.slot_of(&record.to).is_none() {
            return Err(Error::NodeNotFound(record.to));
        }
        let slot = self.edges.alloc(record)?;
        self.edge_from[slot as usize] = record.from;
        self.edge_to[slot as usize] = record.to;
        self.edge_labels[slot as usize] = record.label;
        self.edge_active[slot as usize] = true;
        Ok(slot)
    }

    /// Insert a batch of edges in one pass, all-or-nothing.
    pub fn add_edges(&mut self, records: &[EdgeRecord]) -> Result<()> {
        let remaining = self.edges.capacity() - self.edges.len();
        if records.len() > remaining as usize {
            return Err(Error::PoolExhausted {
                kind: nendb_core::PoolKind::Edge,
                capacity: self.edges.capacity(),
            });
        }
        let mut seen = HashSet::with_capacity(records.len());
        for r in records {
            if r.from == 0 || r.to == 0 {
                return Err(Error::InvalidId(0));
            }
            if self.nodes.slot_of(&r.from).is_none() {
                return Err(Error::NodeNotFound(r.from));
            }
            if self.nodes.slot_of(&r.to).is_none() {
                return Err(Error::NodeNotFound(r.to));
            }
            if !seen.insert(r.key()) || self.edges.slot_of(&r.key()).is_some() {
                return Err(Error::DuplicateEdge(r.key()));
            }
        }
        for r in records {
            self.add_edge(*r)?;
        }
        Ok(())
    }

    /// Replace the props of a live edge. The identity triple is the key
    /// and cannot change here.
    pub fn update_edge(&mut self, record: EdgeRecord) -> Result<()> {
        let Some(slot) = self.edges.slot_of(&record.key()) else {
            return Err(Error::EdgeNotFound(record.key()));
        };
        *self.edges.get_mut(slot).expect("live slot") = record;
        Ok(())
    }

    /// The live edge with this identity.
    pub fn get_edge(&self, key: EdgeKey) -> Option<&EdgeRecord> {
        self.edges.get_by_key(&key)
    }

    /// Soft-delete an edge by identity, returning the removed record.
    pub fn delete_edge(&mut self, key: EdgeKey) -> Result<EdgeRecord> {
        let Some(slot) = self.edges.slot_of(&key) else {
            return Err(Error::EdgeNotFound(key));
        };
        let record = *self.edges.get(slot).expect("live slot");
        self.free_edge_slot(slot)?;
        Ok(record)
    }

    fn free_edge_slot(&mut self, slot: u32) -> Result<()> {
        self.edges.free(slot)?;
        self.edge_active[slot as usize] = false;
        self.edge_from[slot as usize] = 0;
        self.edge_to[slot as usize] = 0;
        self.edge_labels[slot as usize] = 0;
        Ok(())
    }

    /// Scan `edge_labels[]` for live edges with `label`, writing matching
    /// slot numbers into `out`. Returns the match count.
    pub fn filter_edges_by_label(&self, label: EdgeLabel, out: &mut [u32]) -> u32 {
        let mut count = 0u32;
        for slot in 0..self.edge_active.len() {
            if self.edge_active[slot] && self.edge_labels[slot] == label {
                if (count as usize) < out.len() {
                    out[count as usize] = slot as u32;
                }
                count += 1;
            }
        }
        count
    }

    /// Scan the from/to arrays for edges incident to `node_id`, writing
    /// matching slot numbers into `out`. Returns the match count.
    pub fn find_edges_by_node(&self, node_id: NodeId, outgoing: bool, out: &mut [u32]) -> u32 {
        let endpoints = if outgoing {
            &self.edge_from
        } else {
            &self.edge_to
        };
        let mut count = 0u32;
        for slot in 0..self.edge_active.len() {
            if self.edge_active[slot] && endpoints[slot] == node_id {
                if (count as usize) < out.len() {
                    out[count as usize] = slot as u32;
                }
                count += 1;
            }
        }
        count
    }

    /// Live edge records incident to `node_id`, in slot order.
    pub fn edges_of(&self, node_id: NodeId, outgoing: bool) -> Vec<EdgeRecord> {
        let endpoints = if outgoing {
            &self.edge_from
        } else {
            &self.edge_to
        };
        (0..self.edge_active.len())
            .filter(|&s| self.edge_active[s] && endpoints[s] == node_id)
            .filter_map(|s| self.edges.get(s as u32).copied())
            .collect()
    }

    /// The edge record in `slot`, if live.
    pub fn edge_at(&self, slot: u32) -> Option<&EdgeRecord> {
        self.edges.get(slot)
    }

    /// The node record in `slot`, if live.
    pub fn node_at(&self, slot: u32) -> Option<&NodeRecord> {
        self.nodes.get(slot)
    }

    // ------------------------------------------------------------------
    // Embeddings
    // ------------------------------------------------------------------

    /// Insert or replace the embedding for a node.
    ///
    /// Returns the slot and whether an existing vector was replaced. At
    /// most one embedding is active per node; a second insert overwrites
    /// in place rather than taking a fresh slot.
    pub fn set_embedding(&mut self, record: EmbeddingRecord) -> Result<(u32, bool)> {
        if record.node_id == 0 {
            return Err(Error::InvalidId(0));
        }
        if record.vector.len() != self.embedding_dim as usize {
            return Err(Error::DimensionMismatch {
                expected: self.embedding_dim,
                actual: record.vector.len() as u32,
            });
        }
        if self.nodes.slot_of(&record.node_id).is_none() {
            return Err(Error::NodeNotFound(record.node_id));
        }
        if let Some(slot) = self.embeddings.slot_of(&record.node_id) {
            *self.embeddings.get_mut(slot).expect("live slot") = record;
            return Ok((slot, true));
        }
        let node_id = record.node_id;
        let slot = self.embeddings.alloc(record)?;
        self.embedding_nodes[slot as usize] = node_id;
        self.embedding_active[slot as usize] = true;
        Ok((slot, false))
    }

    /// The active embedding for `node_id`.
    pub fn get_embedding(&self, node_id: NodeId) -> Option<&EmbeddingRecord> {
        self.embeddings.get_by_key(&node_id)
    }

    /// Remove the active embedding for `node_id`, returning it.
    pub fn delete_embedding(&mut self, node_id: NodeId) -> Result<EmbeddingRecord> {
        let Some(slot) = self.embeddings.slot_of(&node_id) else {
            return Err(Error::NodeNotFound(node_id));
        };
        let record = self.embeddings.get(slot).expect("live slot").clone();
        self.free_embedding_slot(slot)?;
        Ok(record)
    }

    fn free_embedding_slot(&mut self, slot: u32) -> Result<()> {
        self.embeddings.free(slot)?;
        self.embedding_active[slot as usize] = false;
        self.embedding_nodes[slot as usize] = 0;
        Ok(())
    }

    /// Iterate live embeddings as `(node_id, vector)`.
    pub fn iter_embeddings(&self) -> impl Iterator<Item = (NodeId, &[f32])> {
        self.embeddings
            .iter_live()
            .map(|(_, e)| (e.node_id, e.vector.as_slice()))
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    /// Pool fill ratios for all three pools.
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            nodes: PoolStats::of(&self.nodes),
            edges: PoolStats::of(&self.edges),
            embeddings: PoolStats::of(&self.embeddings),
        }
    }
}
