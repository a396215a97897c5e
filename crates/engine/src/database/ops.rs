//! Operation plumbing: prechecks, WAL payload mapping, apply and undo
//!
//! The write path validates an operation against the store *before*
//! appending its WAL entry, so that a successfully appended entry always
//! applies cleanly. Grouped operations get only basic validity checks up
//! front (members of a group may depend on earlier members); any apply
//! failure inside a group rolls back through the undo log and the WAL
//! frame is closed with `txn_abort`.

use nendb_concurrency::{Operation, UndoOp};
use nendb_core::{Error, PoolKind, Result};
use nendb_durability::EntryPayload;
use nendb_storage::GraphStore;

/// Full precondition check for a standalone operation.
pub fn precheck(store: &GraphStore, op: &Operation) -> Result<()> {
    match op {
        Operation::InsertNode(n) => {
            if n.id == 0 {
                return Err(Error::InvalidId(0));
            }
            if store.get_node(n.id).is_some() {
                return Err(Error::DuplicateNode(n.id));
            }
            let stats = store.memory_stats().nodes;
            if stats.used >= stats.capacity {
                return Err(Error::PoolExhausted {
                    kind: PoolKind::Node,
                    capacity: stats.capacity,
                });
            }
        }
        Operation::UpdateNode(n) => {
            if store.get_node(n.id).is_none() {
                return Err(Error::NodeNotFound(n.id));
            }
        }
        Operation::DeleteNode(id) => {
            if store.get_node(*id).is_none() {
                return Err(Error::NodeNotFound(*id));
            }
        }
        Operation::InsertEdge(e) => {
            if e.from == 0 || e.to == 0 {
                return Err(Error::InvalidId(0));
            }
            if store.get_node(e.from).is_none() {
                return Err(Error::NodeNotFound(e.from));
            }
            if store.get_node(e.to).is_none() {
                return Err(Error::NodeNotFound(e.to));
            }
            if store.get_edge(e.key()).is_some() {
                return Err(Error::DuplicateEdge(e.key()));
            }
            let stats = store.memory_stats().edges;
            if stats.used >= stats.capacity {
                return Err(Error::PoolExhausted {
                    kind: PoolKind::Edge,
                    capacity: stats.capacity,
                });
            }
        }
        Operation::UpdateEdge(e) => {
            if store.get_edge(e.key()).is_none() {
                return Err(Error::EdgeNotFound(e.key()));
            }
        }
        Operation::DeleteEdge(k) => {
            if store.get_edge(*k).is_none() {
                return Err(Error::EdgeNotFound(*k));
            }
        }
        Operation::SetEmbedding(e) => {
            if e.node_id == 0 {
                return Err(Error::InvalidId(0));
            }
            if e.vector.len() != store.embedding_dim() as usize {
                return Err(Error::DimensionMismatch {
                    expected: store.embedding_dim(),
                    actual: e.vector.len() as u32,
                });
            }
            if store.get_node(e.node_id).is_none() {
                return Err(Error::NodeNotFound(e.node_id));
            }
            if store.get_embedding(e.node_id).is_none() {
                let stats = store.memory_stats().embeddings;
                if stats.used >= stats.capacity {
                    return Err(Error::PoolExhausted {
                        kind: PoolKind::Embedding,
                        capacity: stats.capacity,
                    });
                }
            }
        }
        Operation::DeleteEmbedding(id) => {
            if store.get_embedding(*id).is_none() {
                return Err(Error::NodeNotFound(*id));
            }
        }
    }
    Ok(())
}

/// Validity-only check for operations inside a group. Deeper conditions
/// (duplicates, endpoints, capacity) may depend on earlier group members
/// and are left to the apply/rollback path.
pub fn precheck_in_group(store: &GraphStore, op: &Operation) -> Result<()> {
    match op {
        Operation::InsertNode(n) | Operation::UpdateNode(n) => {
            if n.id == 0 {
                return Err(Error::InvalidId(0));
            }
        }
        Operation::InsertEdge(e) | Operation::UpdateEdge(e) => {
            if e.from == 0 || e.to == 0 {
                return Err(Error::InvalidId(0));
            }
        }
        Operation::SetEmbedding(e) => {
            if e.node_id == 0 {
                return Err(Error::InvalidId(0));
            }
            if e.vector.len() != store.embedding_dim() as usize {
                return Err(Error::DimensionMismatch {
                    expected: store.embedding_dim(),
                    actual: e.vector.len() as u32,
                });
            }
        }
        Operation::DeleteNode(id) | Operation::DeleteEmbedding(id) => {
            if *id == 0 {
                return Err(Error::InvalidId(0));
            }
        }
        Operation::DeleteEdge(_) => {}
    }
    Ok(())
}

/// The WAL entry recording this operation.
///
/// Embedding writes pick insert vs. update from the store's current
/// state, which the write lock holds stable.
pub fn payload_for(store: &GraphStore, op: &Operation) -> EntryPayload {
    match op {
        Operation::InsertNode(n) => EntryPayload::NodeInsert(*n),
        Operation::UpdateNode(n) => EntryPayload::NodeUpdate(*n),
        Operation::DeleteNode(id) => EntryPayload::NodeDelete(*id),
        Operation::InsertEdge(e) => EntryPayload::EdgeInsert(*e),
        Operation::UpdateEdge(e) => EntryPayload::EdgeUpdate(*e),
        Operation::DeleteEdge(k) => EntryPayload::EdgeDelete(*k),
        Operation::SetEmbedding(e) => {
            if store.get_embedding(e.node_id).is_some() {
                EntryPayload::EmbeddingUpdate(e.clone())
            } else {
                EntryPayload::EmbeddingInsert(e.clone())
            }
        }
        Operation::DeleteEmbedding(id) => EntryPayload::EmbeddingDelete(*id),
    }
}

/// Apply one operation, returning its inverse for rollback.
pub fn apply(store: &mut GraphStore, op: &Operation) -> Result<UndoOp> {
    match op {
        Operation::InsertNode(n) => {
            store.add_node(*n)?;
            Ok(UndoOp::RemoveNode(n.id))
        }
        Operation::UpdateNode(n) => {
            let before = *store
                .get_node(n.id)
                .ok_or(Error::NodeNotFound(n.id))?;
            store.update_node(*n)?;
            Ok(UndoOp::RestoreNodeImage(before))
        }
        Operation::DeleteNode(id) => {
            let removal = store.delete_node(*id)?;
            Ok(UndoOp::RestoreNode {
                node: removal.node,
                edges: removal.edges,
                embedding: removal.embedding,
            })
        }
        Operation::InsertEdge(e) => {
            store.add_edge(*e)?;
            Ok(UndoOp::RemoveEdge(e.key()))
        }
        Operation::UpdateEdge(e) => {
            let before = *store
                .get_edge(e.key())
                .ok_or(Error::EdgeNotFound(e.key()))?;
            store.update_edge(*e)?;
            Ok(UndoOp::RestoreEdgeImage(before))
        }
        Operation::DeleteEdge(k) => {
            let removed = store.delete_edge(*k)?;
            Ok(UndoOp::RestoreEdge(removed))
        }
        Operation::SetEmbedding(e) => {
            let before = store.get_embedding(e.node_id).cloned();
            store.set_embedding(e.clone())?;
            Ok(match before {
                Some(prior) => UndoOp::RestoreEmbedding(prior),
                None => UndoOp::RemoveEmbedding(e.node_id),
            })
        }
        Operation::DeleteEmbedding(id) => {
            let removed = store.delete_embedding(*id)?;
            Ok(UndoOp::RestoreEmbedding(removed))
        }
    }
}

/// Apply one inverse during rollback.
pub fn apply_undo(store: &mut GraphStore, undo: &UndoOp) -> Result<()> {
    match undo {
        UndoOp::RemoveNode(id) => {
            store.delete_node(*id)?;
        }
        UndoOp::RestoreNode {
            node,
            edges,
            embedding,
        } => {
            store.add_node(*node)?;
            for edge in edges {
                store.add_edge(*edge)?;
            }
            if let Some(e) = embedding {
                store.set_embedding(e.clone())?;
            }
        }
        UndoOp::RestoreNodeImage(n) => store.update_node(*n)?,
        UndoOp::RemoveEdge(k) => {
            store.delete_edge(*k)?;
        }
        UndoOp::RestoreEdge(e) => {
            store.add_edge(*e)?;
        }
        UndoOp::RestoreEdgeImage(e) => store.update_edge(*e)?,
        UndoOp::RemoveEmbedding(id) => {
            store.delete_embedding(*id)?;
        }
        UndoOp::RestoreEmbedding(e) => {
            store.set_embedding(e.clone())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nendb_core::{EdgeProps, EdgeRecord, NodeProps, NodeRecord, PoolCapacities};

    fn store() -> GraphStore {
        GraphStore::new(PoolCapacities::for_testing(), 4).unwrap()
    }

    fn node(id: u64, kind: u8) -> NodeRecord {
        NodeRecord::new(id, kind, NodeProps::empty()).unwrap()
    }

    #[test]
    fn test_apply_then_undo_is_identity() {
        let mut g = store();
        g.add_node(node(1, 1)).unwrap();
        g.add_node(node(2, 2)).unwrap();

        let edge = EdgeRecord::new(1, 2, 5, EdgeProps::empty()).unwrap();
        let undo_edge = apply(&mut g, &Operation::InsertEdge(edge)).unwrap();
        let undo_del = apply(&mut g, &Operation::DeleteNode(2)).unwrap();
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);

        apply_undo(&mut g, &undo_del).unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1, "cascaded edge restored with node");

        apply_undo(&mut g, &undo_edge).unwrap();
        assert_eq!(g.edge_count(), 0);
        assert!(g.get_node(2).is_some());
    }

    #[test]
    fn test_precheck_matches_apply_errors() {
        let mut g = store();
        g.add_node(node(1, 1)).unwrap();

        let dup = Operation::InsertNode(node(1, 2));
        assert!(matches!(
            precheck(&g, &dup),
            Err(Error::DuplicateNode(1))
        ));

        let dangling = Operation::InsertEdge(
            EdgeRecord::new(1, 9, 0, EdgeProps::empty()).unwrap(),
        );
        assert!(matches!(
            precheck(&g, &dangling),
            Err(Error::NodeNotFound(9))
        ));
    }

    #[test]
    fn test_embedding_payload_kind_tracks_state() {
        let mut g = store();
        g.add_node(node(1, 0)).unwrap();
        let op = Operation::SetEmbedding(
            nendb_core::EmbeddingRecord::new(1, vec![0.0; 4]).unwrap(),
        );
        assert!(matches!(
            payload_for(&g, &op),
            EntryPayload::EmbeddingInsert(_)
        ));
        apply(&mut g, &op).unwrap();
        assert!(matches!(
            payload_for(&g, &op),
            EntryPayload::EmbeddingUpdate(_)
        ));
    }

    #[test]
    fn test_undo_of_embedding_replace_restores_prior_vector() {
        let mut g = store();
        g.add_node(node(1, 0)).unwrap();
        let first = nendb_core::EmbeddingRecord::new(1, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let second = nendb_core::EmbeddingRecord::new(1, vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        apply(&mut g, &Operation::SetEmbedding(first.clone())).unwrap();
        let undo = apply(&mut g, &Operation::SetEmbedding(second)).unwrap();
        apply_undo(&mut g, &undo).unwrap();
        assert_eq!(g.get_embedding(1).unwrap().vector, first.vector);
    }
}
