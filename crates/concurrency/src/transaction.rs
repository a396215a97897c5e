//! Intra-process transactions
//!
//! A transaction owns its begin LSN, an isolation level, and paired
//! redo/undo lists. The engine applies each operation as it is issued
//! (WAL first, then memory) and records the inverse; commit appends
//! `txn_commit`, abort appends `txn_abort` and replays the undo list in
//! reverse. Replay treats the `txn_begin .. txn_abort` region as
//! discarded, so the WAL and memory agree either way.

use nendb_core::{EdgeKey, EdgeRecord, EmbeddingRecord, NodeId, NodeRecord, Lsn};

/// Transaction isolation levels.
///
/// All four are accepted; they steer the read path. `ReadUncommitted`
/// reads without seqlock validation, `ReadCommitted` (the default) takes
/// a validated optimistic read, and the two stronger levels hold the
/// shared lock for the transaction's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// May observe in-progress writes
    ReadUncommitted,
    /// Sees only committed state (default)
    #[default]
    ReadCommitted,
    /// Re-reads stay stable for the transaction
    RepeatableRead,
    /// Full serialisable execution
    Serializable,
}

/// Where a transaction stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting operations
    Active,
    /// `txn_commit` durably appended
    Committed,
    /// Rolled back
    Aborted {
        /// Why the transaction was abandoned
        reason: String,
    },
}

/// A single graph mutation, as queued in transactions and batches.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Insert a node
    InsertNode(NodeRecord),
    /// Replace a live node's kind/props
    UpdateNode(NodeRecord),
    /// Soft-delete a node (cascades to incident edges and embedding)
    DeleteNode(NodeId),
    /// Insert an edge
    InsertEdge(EdgeRecord),
    /// Replace a live edge's props
    UpdateEdge(EdgeRecord),
    /// Soft-delete an edge
    DeleteEdge(EdgeKey),
    /// Attach or replace a node's embedding
    SetEmbedding(EmbeddingRecord),
    /// Remove a node's embedding
    DeleteEmbedding(NodeId),
}

impl Operation {
    /// The entity id this operation primarily touches, used for
    /// last-writer-wins merging in compaction.
    pub fn entity_id(&self) -> u64 {
        match self {
            Operation::InsertNode(n) | Operation::UpdateNode(n) => n.id,
            Operation::DeleteNode(id) => *id,
            Operation::InsertEdge(e) | Operation::UpdateEdge(e) => {
                // Edge identity folded to one word for grouping.
                e.from ^ e.to.rotate_left(17) ^ ((e.label as u64) << 1)
            }
            Operation::DeleteEdge(k) => {
                k.from ^ k.to.rotate_left(17) ^ ((k.label as u64) << 1)
            }
            Operation::SetEmbedding(e) => e.node_id,
            Operation::DeleteEmbedding(id) => *id,
        }
    }

    /// Discriminant used for homogeneous sub-batching.
    pub fn op_class(&self) -> u8 {
        match self {
            Operation::InsertNode(_) => 0,
            Operation::UpdateNode(_) => 1,
            Operation::DeleteNode(_) => 2,
            Operation::InsertEdge(_) => 3,
            Operation::UpdateEdge(_) => 4,
            Operation::DeleteEdge(_) => 5,
            Operation::SetEmbedding(_) => 6,
            Operation::DeleteEmbedding(_) => 7,
        }
    }
}

/// Inverse of an applied operation, for rollback.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOp {
    /// Undo an insert: remove the node
    RemoveNode(NodeId),
    /// Undo a delete: restore the node, its edges and embedding
    RestoreNode {
        /// The removed node
        node: NodeRecord,
        /// Edges the cascade removed
        edges: Vec<EdgeRecord>,
        /// The embedding the cascade removed
        embedding: Option<EmbeddingRecord>,
    },
    /// Undo an update: restore the before-image
    RestoreNodeImage(NodeRecord),
    /// Undo an insert: remove the edge
    RemoveEdge(EdgeKey),
    /// Undo a delete: restore the edge
    RestoreEdge(EdgeRecord),
    /// Undo an update: restore the before-image
    RestoreEdgeImage(EdgeRecord),
    /// Undo a first-time embedding insert
    RemoveEmbedding(NodeId),
    /// Undo an embedding replace or delete: restore the prior vector
    RestoreEmbedding(EmbeddingRecord),
}

/// An open transaction.
#[derive(Debug)]
pub struct Transaction {
    /// Engine-assigned transaction id
    pub txn_id: u64,
    /// LSN of the `txn_begin` entry
    pub begin_lsn: Lsn,
    /// Isolation level chosen at begin
    pub isolation: IsolationLevel,
    /// Current status
    pub status: TransactionStatus,
    redo: Vec<Operation>,
    undo: Vec<UndoOp>,
}

impl Transaction {
    /// Open a transaction.
    pub fn new(txn_id: u64, begin_lsn: Lsn, isolation: IsolationLevel) -> Self {
        Transaction {
            txn_id,
            begin_lsn,
            isolation,
            status: TransactionStatus::Active,
            redo: Vec::new(),
            undo: Vec::new(),
        }
    }

    /// Whether operations may still be added.
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Whether nothing was mutated.
    pub fn is_read_only(&self) -> bool {
        self.redo.is_empty()
    }

    /// Record an applied operation and its inverse.
    pub fn record(&mut self, op: Operation, undo: UndoOp) {
        debug_assert!(self.is_active());
        self.redo.push(op);
        self.undo.push(undo);
    }

    /// Operations in application order.
    pub fn redo_ops(&self) -> &[Operation] {
        &self.redo
    }

    /// Inverses in rollback order (reverse of application).
    pub fn undo_ops_reversed(&self) -> impl Iterator<Item = &UndoOp> {
        self.undo.iter().rev()
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.redo.len()
    }

    /// Whether the redo list is empty.
    pub fn is_empty(&self) -> bool {
        self.redo.is_empty()
    }

    /// Mark committed.
    pub fn mark_committed(&mut self) {
        self.status = TransactionStatus::Committed;
    }

    /// Mark aborted.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) {
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nendb_core::NodeProps;

    fn node(id: u64) -> NodeRecord {
        NodeRecord::new(id, 0, NodeProps::empty()).unwrap()
    }

    #[test]
    fn test_default_isolation_is_read_committed() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_record_pairs_redo_and_undo() {
        let mut txn = Transaction::new(1, 10, IsolationLevel::default());
        assert!(txn.is_read_only());

        txn.record(Operation::InsertNode(node(1)), UndoOp::RemoveNode(1));
        txn.record(Operation::InsertNode(node(2)), UndoOp::RemoveNode(2));
        assert_eq!(txn.len(), 2);
        assert!(!txn.is_read_only());

        // Undo comes back in reverse order.
        let undo: Vec<_> = txn.undo_ops_reversed().collect();
        assert_eq!(undo[0], &UndoOp::RemoveNode(2));
        assert_eq!(undo[1], &UndoOp::RemoveNode(1));
    }

    #[test]
    fn test_status_transitions() {
        let mut txn = Transaction::new(1, 1, IsolationLevel::Serializable);
        assert!(txn.is_active());
        txn.mark_committed();
        assert_eq!(txn.status, TransactionStatus::Committed);

        let mut txn2 = Transaction::new(2, 5, IsolationLevel::default());
        txn2.mark_aborted("conflict");
        assert!(matches!(txn2.status, TransactionStatus::Aborted { .. }));
    }

    #[test]
    fn test_edge_operations_fold_to_stable_entity_ids() {
        let e = EdgeRecord::new(1, 2, 3, Default::default()).unwrap();
        let insert = Operation::InsertEdge(e);
        let delete = Operation::DeleteEdge(e.key());
        assert_eq!(insert.entity_id(), delete.entity_id());

        let other = Operation::DeleteEdge(EdgeKey {
            from: 2,
            to: 1,
            label: 3,
        });
        assert_ne!(insert.entity_id(), other.entity_id());
    }
}
