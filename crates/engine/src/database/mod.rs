//! The embedded database facade
//!
//! `Database` wires the layers together: pools and SoA store behind the
//! writer-preferring rwlock, the segmented WAL, the batch processor, the
//! concurrency primitives, and multi-process coordination.
//!
//! Every mutation follows the same sequence: check lifecycle flags,
//! take exclusive multi-process access (when enabled), take the internal
//! write lock, validate preconditions, append the WAL record, then
//! mutate memory inside the seqlock's write section. Reads go through
//! the optimistic seqlock path and fall back to the shared lock when it
//! saturates.

mod ops;

pub use ops::apply_undo;

use crate::batch::lsm::LsmLevels;
use crate::batch::BatchQueue;
use crate::config::{NendbConfig, CONFIG_FILE_NAME};
use crate::process::ProcessCoordinator;
use crate::registry::OPEN_DATABASES;
use crate::stats::{BatchStats, DatabaseStats, LockMetrics};
use crate::vector::{self, SimilarityHit};
use nendb_concurrency::{
    AtomicIdGenerator, DeadlockDetector, IsolationLevel, Operation, ReadWriteLock, SeqRead,
    Seqlock, Transaction,
};
use nendb_core::{
    EdgeKey, EdgeLabel, EdgeProps, EdgeRecord, EmbeddingRecord, Error, ErrorCounters, Lsn,
    NodeId, NodeKind, NodeProps, NodeRecord, Result,
};
use nendb_durability::{
    replay, write_checkpoint, EntryPayload, WalWriter,
};
use nendb_storage::{GraphStore, MemoryStats};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// An embedded NenDB instance.
///
/// Obtain one with [`Database::open`]; instances are shared per data
/// directory within a process.
pub struct Database {
    data_dir: PathBuf,
    config: NendbConfig,
    store: ReadWriteLock<GraphStore>,
    seqlock: Seqlock,
    wal: Mutex<Option<WalWriter>>,
    batch: Mutex<BatchQueue>,
    lsm: Mutex<LsmLevels>,
    process: Mutex<Option<ProcessCoordinator>>,
    txn_ids: AtomicIdGenerator,
    node_ids: AtomicIdGenerator,
    detector: DeadlockDetector,
    errors: ErrorCounters,
    replay_errors: AtomicU64,
    closed: AtomicBool,
    degraded: Mutex<Option<String>>,
    lock_timeout: Duration,
}

impl Database {
    /// Open the database at `path`, reading `nendb.toml` from the data
    /// directory (and writing the commented default on first open).
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let config_path = path.join(CONFIG_FILE_NAME);
        NendbConfig::write_default_if_missing(&config_path)?;
        let config = NendbConfig::from_file(&config_path)?;
        Self::open_with_config(path, config)
    }

    /// Open with an explicit configuration, ignoring any `nendb.toml`.
    pub fn open_with_config(path: impl AsRef<Path>, config: NendbConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let canonical = path.canonicalize()?;

        let mut registry = OPEN_DATABASES.lock();
        if let Some(existing) = registry.get(&canonical).and_then(Weak::upgrade) {
            if !existing.is_closed() {
                info!(
                    target: "nendb::engine",
                    path = %canonical.display(),
                    "returning already-open database instance"
                );
                return Ok(existing);
            }
        }

        let mut store = GraphStore::new(config.pool_capacities(), config.pools.embedding_dim)?;

        let (wal, replay_errors) = if config.enable_wal {
            let report = replay(&canonical, &mut store)?;
            if report.entries_applied > 0 || report.segments_scanned > 0 {
                info!(
                    target: "nendb::engine",
                    applied = report.entries_applied,
                    segments = report.segments_scanned,
                    max_lsn = report.max_lsn,
                    "recovered from WAL"
                );
            }
            let writer = WalWriter::open(
                &canonical,
                config.wal_config(),
                report.max_lsn + 1,
                report.next_segment_id,
            )?;
            (Some(writer), report.replay_errors)
        } else {
            (None, 0)
        };

        let node_floor = store.max_node_id();
        let process = if config.enable_file_locking || config.enable_shared_memory {
            Some(ProcessCoordinator::attach(
                &canonical,
                config.enable_file_locking,
                config.enable_shared_memory,
                Duration::from_millis(config.lock_timeout_ms),
                config.heartbeat_timeout_ms,
            )?)
        } else {
            None
        };

        let db = Arc::new(Database {
            store: ReadWriteLock::new(store),
            seqlock: Seqlock::new(config.seqlock_max_retries),
            wal: Mutex::new(wal),
            batch: Mutex::new(BatchQueue::new(config.batch.clone())),
            lsm: Mutex::new(LsmLevels::new(
                config.batch.compaction_threshold,
                config.batch.lsm_levels,
            )),
            process: Mutex::new(process),
            txn_ids: AtomicIdGenerator::new(),
            node_ids: AtomicIdGenerator::starting_after(node_floor),
            detector: DeadlockDetector::new(),
            errors: ErrorCounters::new(),
            replay_errors: AtomicU64::new(replay_errors),
            closed: AtomicBool::new(false),
            degraded: Mutex::new(None),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            data_dir: canonical.clone(),
            config,
        });
        registry.insert(canonical, Arc::downgrade(&db));
        Ok(db)
    }

    /// The data directory this instance is bound to.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The effective configuration.
    pub fn config(&self) -> &NendbConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if let Some(reason) = self.degraded.lock().clone() {
            return Err(Error::Degraded(reason));
        }
        Ok(())
    }

    /// Note a fatal durability failure: the degraded flag blocks all
    /// subsequent writes until [`Database::repair`].
    fn enter_degraded(&self, cause: &Error) {
        let mut degraded = self.degraded.lock();
        if degraded.is_none() {
            error!(
                target: "nendb::engine",
                cause = %cause,
                "entering degraded mode; writes blocked until repair()"
            );
            *degraded = Some(cause.to_string());
        }
    }

    /// Clear the degraded flag after the operator resolved the cause
    /// (disk space, permissions). Flushes the WAL to prove the path
    /// works again.
    pub fn repair(&self) -> Result<()> {
        self.ensure_open()?;
        if let Some(w) = self.wal.lock().as_mut() {
            w.flush()?;
        }
        *self.degraded.lock() = None;
        info!(target: "nendb::engine", "degraded flag cleared");
        Ok(())
    }

    /// Whether the degraded flag is set.
    pub fn is_degraded(&self) -> bool {
        self.degraded.lock().is_some()
    }

    /// Whether [`Database::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut down: drain batches, flush and seal the WAL, release locks,
    /// detach shared memory. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        // Drain in-flight batches before refusing new operations.
        self.commit_batch()?;
        self.closed.store(true, Ordering::Release);
        if let Some(wal) = self.wal.lock().take() {
            wal.close()?;
        }
        if let Some(process) = self.process.lock().take() {
            process.detach()?;
        }
        info!(target: "nendb::engine", path = %self.data_dir.display(), "database closed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    fn read_store<T>(&self, f: impl Fn(&GraphStore) -> T) -> Result<T> {
        self.ensure_open()?;
        match self.seqlock.read(|| self.store.try_read().map(|g| f(&g))) {
            SeqRead::Consistent(value) => Ok(value),
            SeqRead::Saturated => {
                let guard = self.store.read(self.lock_timeout)?;
                Ok(f(&guard))
            }
        }
    }

    /// Look up a live node.
    pub fn find_node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        self.read_store(|s| s.get_node(id).copied())
    }

    /// Live outgoing edges of a node, in slot order.
    pub fn find_outgoing_edges(&self, id: NodeId) -> Result<Vec<EdgeRecord>> {
        self.read_store(|s| s.edges_of(id, true))
    }

    /// Live incoming edges of a node, in slot order.
    pub fn find_incoming_edges(&self, id: NodeId) -> Result<Vec<EdgeRecord>> {
        self.read_store(|s| s.edges_of(id, false))
    }

    /// Live node ids with the given kind.
    pub fn find_nodes_by_kind(&self, kind: NodeKind) -> Result<Vec<NodeId>> {
        self.read_store(|s| s.nodes_with_kind(kind))
    }

    /// The active embedding for a node.
    pub fn find_vector(&self, node_id: NodeId) -> Result<Option<Vec<f32>>> {
        self.read_store(|s| s.get_embedding(node_id).map(|e| e.vector.clone()))
    }

    /// Top-K cosine-similar embeddings, ties broken by lower node id.
    pub fn find_similar_vectors(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityHit>> {
        self.read_store(|s| vector::find_similar(s, query, k))?
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Insert a node.
    pub fn add_node(&self, id: NodeId, kind: NodeKind, props: &[u8]) -> Result<()> {
        let record = NodeRecord::new(id, kind, NodeProps::from_slice(props)?)
            .map_err(|e| self.record_error(e))?;
        self.route(Operation::InsertNode(record))
    }

    /// Replace a live node's kind and props.
    pub fn update_node(&self, id: NodeId, kind: NodeKind, props: &[u8]) -> Result<()> {
        let record = NodeRecord::new(id, kind, NodeProps::from_slice(props)?)
            .map_err(|e| self.record_error(e))?;
        self.route(Operation::UpdateNode(record))
    }

    /// Soft-delete a node, cascading to incident edges and embedding.
    pub fn delete_node(&self, id: NodeId) -> Result<()> {
        self.route(Operation::DeleteNode(id))
    }

    /// Insert a node under a generator-assigned id, returning the id.
    ///
    /// Id assignment is a single atomic increment, so concurrent callers
    /// never collide; a later failure (pool exhausted) leaves a gap in
    /// the id space, which callers must tolerate.
    pub fn insert_node_lockfree(&self, kind: NodeKind) -> Result<NodeId> {
        let id = self.node_ids.next_id();
        let record = NodeRecord::new(id, kind, NodeProps::empty())?;
        self.route(Operation::InsertNode(record))?;
        Ok(id)
    }

    /// Insert a batch of nodes as one atomic group.
    pub fn add_nodes_batch(&self, records: &[NodeRecord]) -> Result<()> {
        self.apply_group(records.iter().map(|r| Operation::InsertNode(*r)).collect())
            .map(|_| ())
    }

    /// Insert an edge. `from` and `to` must be distinct live nodes.
    pub fn add_edge(&self, from: NodeId, to: NodeId, label: EdgeLabel, props: &[u8]) -> Result<()> {
        if from == to {
            return Err(self.record_error(Error::InvalidId(from)));
        }
        let record = EdgeRecord::new(from, to, label, EdgeProps::from_slice(props)?)
            .map_err(|e| self.record_error(e))?;
        // Lock targets sorted to honor the global order.
        self.with_sorted_entity_locks(from, to, || self.route(Operation::InsertEdge(record)))
    }

    /// Replace a live edge's props.
    pub fn update_edge(
        &self,
        from: NodeId,
        to: NodeId,
        label: EdgeLabel,
        props: &[u8],
    ) -> Result<()> {
        let record = EdgeRecord::new(from, to, label, EdgeProps::from_slice(props)?)
            .map_err(|e| self.record_error(e))?;
        self.with_sorted_entity_locks(from, to, || self.route(Operation::UpdateEdge(record)))
    }

    /// Soft-delete an edge by identity.
    pub fn delete_edge(&self, from: NodeId, to: NodeId, label: EdgeLabel) -> Result<()> {
        let key = EdgeKey { from, to, label };
        self.with_sorted_entity_locks(from, to, || self.route(Operation::DeleteEdge(key)))
    }

    /// Insert a batch of edges as one atomic group.
    pub fn add_edges_batch(&self, records: &[EdgeRecord]) -> Result<()> {
        self.apply_group(records.iter().map(|r| Operation::InsertEdge(*r)).collect())
            .map(|_| ())
    }

    /// Attach or replace a node's embedding.
    pub fn add_vector(&self, node_id: NodeId, vector: &[f32]) -> Result<()> {
        let record = EmbeddingRecord::new(node_id, vector.to_vec())
            .map_err(|e| self.record_error(e))?;
        self.route(Operation::SetEmbedding(record))
    }

    /// Remove a node's embedding.
    pub fn remove_vector(&self, node_id: NodeId) -> Result<()> {
        self.route(Operation::DeleteEmbedding(node_id))
    }

    fn with_sorted_entity_locks<T>(
        &self,
        a: NodeId,
        b: NodeId,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let (lo, hi) = (a.min(b), a.max(b));
        self.detector
            .check_acquire(lo)
            .map_err(|e| self.record_error(e))?;
        self.detector.acquired(lo);
        if hi != lo {
            if let Err(e) = self.detector.check_acquire(hi) {
                self.detector.released(lo);
                return Err(self.record_error(e));
            }
            self.detector.acquired(hi);
        }
        let result = f();
        if hi != lo {
            self.detector.released(hi);
        }
        self.detector.released(lo);
        result
    }

    fn record_error(&self, e: Error) -> Error {
        self.errors.record(&e);
        e
    }

    /// Route one mutation: through the batch queue when batching is on,
    /// directly otherwise.
    fn route(&self, op: Operation) -> Result<()> {
        if self.config.enable_batching {
            self.enqueue(op)
        } else {
            self.direct_mutation(op)
        }
    }

    fn direct_mutation(&self, op: Operation) -> Result<()> {
        self.ensure_writable().map_err(|e| self.record_error(e))?;
        let mut process = self.process.lock();
        if let Some(p) = process.as_mut() {
            p.exclusive().map_err(|e| self.record_error(e))?;
        }
        let result = self.direct_mutation_locked(&op);
        if let Some(p) = process.as_mut() {
            let _ = p.release();
        }
        result.map_err(|e| self.record_error(e))
    }

    fn direct_mutation_locked(&self, op: &Operation) -> Result<()> {
        let mut store = self.store.write(self.lock_timeout)?;
        ops::precheck(&store, op)?;
        self.wal_append(ops::payload_for(&store, op))?;
        self.seqlock.write_begin();
        let applied = ops::apply(&mut store, op);
        self.seqlock.write_end();
        match applied {
            Ok(_) => Ok(()),
            Err(e) => {
                // Prechecks make this unreachable short of a bug; the WAL
                // already holds the entry, so replay will retry it.
                error!(
                    target: "nendb::engine",
                    error = %e,
                    "memory apply failed after WAL append"
                );
                Err(e)
            }
        }
    }

    fn wal_append(&self, payload: EntryPayload) -> Result<Lsn> {
        let mut wal = self.wal.lock();
        match wal.as_mut() {
            Some(w) => match w.append(payload) {
                Ok(lsn) => Ok(lsn),
                Err(e) => {
                    if matches!(e, Error::Io(_)) {
                        self.enter_degraded(&e);
                    }
                    Err(e)
                }
            },
            None => Ok(0),
        }
    }

    // ------------------------------------------------------------------
    // Atomic groups (batch flush and *_batch APIs)
    // ------------------------------------------------------------------

    /// Apply a group of operations atomically: all WAL entries inside a
    /// `txn_begin`/`txn_commit` frame, then all memory mutations; a
    /// mid-group failure rolls back the applied prefix and invalidates
    /// the frame with `txn_abort`.
    fn apply_group(&self, ops_list: Vec<Operation>) -> Result<usize> {
        if ops_list.is_empty() {
            return Ok(0);
        }
        self.ensure_writable().map_err(|e| self.record_error(e))?;
        let mut process = self.process.lock();
        if let Some(p) = process.as_mut() {
            p.exclusive().map_err(|e| self.record_error(e))?;
        }
        let result = self.apply_group_locked(&ops_list);
        if let Some(p) = process.as_mut() {
            let _ = p.release();
        }
        match result {
            Ok(count) => {
                self.lsm.lock().absorb(ops_list);
                Ok(count)
            }
            Err(e) => Err(self.record_error(e)),
        }
    }

    fn apply_group_locked(&self, ops_list: &[Operation]) -> Result<usize> {
        let mut store = self.store.write(self.lock_timeout)?;
        for op in ops_list {
            ops::precheck_in_group(&store, op)?;
        }
        let txn_id = self.txn_ids.next_id();
        self.wal_append(EntryPayload::TxnBegin(txn_id))?;
        for op in ops_list {
            self.wal_append(ops::payload_for(&store, op))?;
        }

        let mut undo_log = Vec::with_capacity(ops_list.len());
        self.seqlock.write_begin();
        let mut failure = None;
        for op in ops_list {
            match ops::apply(&mut store, op) {
                Ok(undo) => undo_log.push(undo),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if failure.is_some() {
            for undo in undo_log.iter().rev() {
                if let Err(e) = ops::apply_undo(&mut store, undo) {
                    error!(target: "nendb::engine", error = %e, "undo failed during batch rollback");
                }
            }
        }
        self.seqlock.write_end();

        match failure {
            None => {
                self.wal_append(EntryPayload::TxnCommit(txn_id))?;
                Ok(ops_list.len())
            }
            Some(e) => {
                self.wal_append(EntryPayload::TxnAbort(txn_id))?;
                Err(e)
            }
        }
    }

    fn enqueue(&self, op: Operation) -> Result<()> {
        let started = Instant::now();
        let taken = {
            let mut queue = self.batch.lock();
            if !self.config.batch.overflow_flushes_synchronously {
                // Non-blocking configuration: a full queue is the
                // caller's problem, and flushing stays explicit
                // (`commit_batch`).
                if queue.is_full() {
                    let e = Error::QueueOverflow {
                        queued: queue.len(),
                    };
                    return Err(self.record_error(e));
                }
                queue.push(op);
                None
            } else {
                if queue.is_full() {
                    let batches = queue.take();
                    queue.push(op);
                    Some(batches)
                } else {
                    queue.push(op);
                    if queue.should_flush() {
                        Some(queue.take())
                    } else {
                        None
                    }
                }
            }
        };
        if let Some(batches) = taken {
            self.flush_taken(batches, started)?;
        }
        Ok(())
    }

    fn flush_taken(
        &self,
        batches: Vec<Vec<Operation>>,
        started: Instant,
    ) -> Result<usize> {
        let mut total = 0;
        for ops_list in batches {
            if ops_list.is_empty() {
                continue;
            }
            total += self.apply_group(ops_list)?;
        }
        let micros = started.elapsed().as_micros() as u64;
        self.batch.lock().record_flush(total, micros);
        Ok(total)
    }

    /// Flush everything queued client-side. Returns how many operations
    /// were applied.
    pub fn commit_batch(&self) -> Result<usize> {
        let started = Instant::now();
        let batches = self.batch.lock().take();
        if batches.is_empty() {
            return Ok(0);
        }
        self.flush_taken(batches, started)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begin a transaction at the given isolation level.
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> Result<Transaction> {
        self.ensure_writable().map_err(|e| self.record_error(e))?;
        let txn_id = self.txn_ids.next_id();
        let begin_lsn = self.wal_append(EntryPayload::TxnBegin(txn_id))?;
        Ok(Transaction::new(txn_id, begin_lsn, isolation))
    }

    fn txn_apply(&self, txn: &mut Transaction, op: Operation) -> Result<()> {
        if !txn.is_active() {
            return Err(self.record_error(Error::TransactionInactive(txn.txn_id)));
        }
        self.ensure_writable().map_err(|e| self.record_error(e))?;
        let mut process = self.process.lock();
        if let Some(p) = process.as_mut() {
            p.exclusive().map_err(|e| self.record_error(e))?;
        }
        let result = (|| {
            let mut store = self.store.write(self.lock_timeout)?;
            ops::precheck(&store, &op)?;
            self.wal_append(ops::payload_for(&store, &op))?;
            self.seqlock.write_begin();
            let applied = ops::apply(&mut store, &op);
            self.seqlock.write_end();
            applied
        })();
        if let Some(p) = process.as_mut() {
            let _ = p.release();
        }
        let undo = result.map_err(|e| self.record_error(e))?;
        txn.record(op, undo);
        Ok(())
    }

    /// Insert a node inside a transaction.
    pub fn txn_add_node(
        &self,
        txn: &mut Transaction,
        id: NodeId,
        kind: NodeKind,
        props: &[u8],
    ) -> Result<()> {
        let record = NodeRecord::new(id, kind, NodeProps::from_slice(props)?)?;
        self.txn_apply(txn, Operation::InsertNode(record))
    }

    /// Delete a node inside a transaction.
    pub fn txn_delete_node(&self, txn: &mut Transaction, id: NodeId) -> Result<()> {
        self.txn_apply(txn, Operation::DeleteNode(id))
    }

    /// Insert an edge inside a transaction.
    pub fn txn_add_edge(
        &self,
        txn: &mut Transaction,
        from: NodeId,
        to: NodeId,
        label: EdgeLabel,
        props: &[u8],
    ) -> Result<()> {
        if from == to {
            return Err(self.record_error(Error::InvalidId(from)));
        }
        let record = EdgeRecord::new(from, to, label, EdgeProps::from_slice(props)?)?;
        self.with_sorted_entity_locks(from, to, || {
            self.txn_apply(txn, Operation::InsertEdge(record))
        })
    }

    /// Attach or replace an embedding inside a transaction.
    pub fn txn_add_vector(
        &self,
        txn: &mut Transaction,
        node_id: NodeId,
        vector: &[f32],
    ) -> Result<()> {
        let record = EmbeddingRecord::new(node_id, vector.to_vec())?;
        self.txn_apply(txn, Operation::SetEmbedding(record))
    }

    /// Look up a node under the transaction's isolation level.
    ///
    /// `ReadUncommitted` takes whatever a raw shared probe returns,
    /// `ReadCommitted` goes through the seqlock-validated path, and the
    /// two stronger levels always take the shared lock so repeated reads
    /// cannot race the optimistic path's retries.
    pub fn txn_find_node(&self, txn: &Transaction, id: NodeId) -> Result<Option<NodeRecord>> {
        self.ensure_open()?;
        match txn.isolation {
            IsolationLevel::ReadUncommitted => match self.store.try_read() {
                Some(guard) => Ok(guard.get_node(id).copied()),
                None => {
                    let guard = self.store.read(self.lock_timeout)?;
                    Ok(guard.get_node(id).copied())
                }
            },
            IsolationLevel::ReadCommitted => self.find_node(id),
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                let guard = self.store.read(self.lock_timeout)?;
                Ok(guard.get_node(id).copied())
            }
        }
    }

    /// Commit: append `txn_commit`, flush, mark the transaction done.
    pub fn commit(&self, txn: &mut Transaction) -> Result<Lsn> {
        if !txn.is_active() {
            return Err(self.record_error(Error::TransactionInactive(txn.txn_id)));
        }
        let lsn = self.wal_append(EntryPayload::TxnCommit(txn.txn_id))?;
        if let Some(w) = self.wal.lock().as_mut() {
            w.flush()?;
        }
        txn.mark_committed();
        Ok(lsn)
    }

    /// Abort: append `txn_abort` and unwind memory along the undo list.
    pub fn abort(&self, txn: &mut Transaction) -> Result<()> {
        if !txn.is_active() {
            return Err(self.record_error(Error::TransactionInactive(txn.txn_id)));
        }
        self.wal_append(EntryPayload::TxnAbort(txn.txn_id))?;
        let mut store = self.store.write(self.lock_timeout)?;
        self.seqlock.write_begin();
        for undo in txn.undo_ops_reversed() {
            if let Err(e) = ops::apply_undo(&mut store, undo) {
                error!(target: "nendb::engine", error = %e, "undo failed during abort");
            }
        }
        self.seqlock.write_end();
        txn.mark_aborted("aborted by caller");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Durability controls
    // ------------------------------------------------------------------

    /// Flush queued batches and fsync the WAL.
    pub fn flush(&self) -> Result<()> {
        self.commit_batch()?;
        if let Some(w) = self.wal.lock().as_mut() {
            w.flush().map_err(|e| {
                if matches!(e, Error::Io(_)) {
                    self.enter_degraded(&e);
                }
                e
            })?;
        }
        Ok(())
    }

    /// Append a checkpoint entry and persist its LSN to
    /// `checkpoint.meta`. Segments entirely below it may be archived.
    pub fn checkpoint(&self) -> Result<Lsn> {
        self.ensure_writable().map_err(|e| self.record_error(e))?;
        self.commit_batch()?;
        let mut wal = self.wal.lock();
        let Some(w) = wal.as_mut() else {
            return Err(self.record_error(Error::InvalidConfiguration(
                "checkpoint requires enable_wal".into(),
            )));
        };
        let lsn = w.next_lsn();
        w.append(EntryPayload::Checkpoint(lsn))?;
        w.flush()?;
        drop(wal);
        write_checkpoint(&self.data_dir, lsn)?;
        Ok(lsn)
    }

    /// Refresh this process's participant heartbeat and sweep dead
    /// peers. Call periodically when shared memory is enabled; no
    /// background thread does this for you.
    pub fn heartbeat(&self) {
        if let Some(p) = self.process.lock().as_mut() {
            p.heartbeat();
        }
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Aggregate counts, memory utilisation, lock metrics and error
    /// counters.
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let (nodes, edges, embeddings, memory) = self.read_store(|s| {
            (
                s.node_count(),
                s.edge_count(),
                s.embedding_count(),
                s.memory_stats(),
            )
        })?;
        let batch = {
            let queue = self.batch.lock();
            let lsm = self.lsm.lock();
            BatchStats {
                queued: queue.len(),
                batches_flushed: queue.batches_flushed,
                ops_flushed: queue.ops_flushed,
                compactions: lsm.compactions(),
                lsm_resident_ops: lsm.resident_ops(),
            }
        };
        Ok(DatabaseStats {
            nodes: nodes as u64,
            edges: edges as u64,
            embeddings: embeddings as u64,
            memory,
            lock_metrics: LockMetrics::combine(
                self.store.metrics(),
                self.seqlock.metrics(),
                self.detector.avoided_count(),
            ),
            wal: self.wal.lock().as_ref().map(|w| w.counters()),
            batch,
            error_counts: self.errors.snapshot(),
            replay_errors: self.replay_errors.load(Ordering::Relaxed),
            degraded: self.is_degraded(),
        })
    }

    /// Pool fill ratios.
    pub fn get_memory_stats(&self) -> Result<MemoryStats> {
        self.read_store(|s| s.memory_stats())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            if let Err(e) = self.close() {
                error!(target: "nendb::engine", error = %e, "close on drop failed");
            }
        }
    }
}
