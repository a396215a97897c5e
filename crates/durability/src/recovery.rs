//! Crash-recovery replay
//!
//! Replay walks segments in id order and applies entries through the same
//! [`GraphStore`] mutators used for fresh writes, bypassing WAL appends.
//! It tolerates exactly the failures a crash can produce:
//!
//! - a segment whose header fails validation is skipped whole;
//! - entry iteration stops at the first torn or corrupt record of a
//!   segment (never scan past a torn write);
//! - entries inside a `txn_begin` region are buffered and applied only at
//!   `txn_commit`; an abort or end-of-log discards the region;
//! - an entry referencing a node that does not exist yet (edge before
//!   node across a torn boundary) is deferred and retried after all
//!   segments; what still fails is counted and skipped.
//!
//! Duplicate effects (entry already applied) are treated as benign so
//! replaying a segment twice is idempotent.

use crate::format::EntryPayload;
use crate::wal::{ReadStop, WalReader};
use nendb_core::{Error, Lsn, Result};
use nendb_storage::GraphStore;
use std::path::Path;
use tracing::{info, warn};

/// What replay found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Segments whose headers validated
    pub segments_scanned: u32,
    /// Segments skipped for header corruption
    pub segments_skipped: u32,
    /// Segments that ended in a torn or corrupt entry
    pub torn_segments: u32,
    /// Entries applied to the store
    pub entries_applied: u64,
    /// Entries whose effect was already present (idempotent replay)
    pub entries_already_applied: u64,
    /// Entries discarded with an aborted or incomplete transaction
    pub entries_discarded: u64,
    /// Deferred entries that never became applicable
    pub replay_errors: u64,
    /// Highest LSN seen in any valid entry
    pub max_lsn: Lsn,
    /// One past the newest segment id on disk (0 when empty)
    pub next_segment_id: u32,
    /// LSN of the most recent checkpoint entry, if any
    pub last_checkpoint: Option<Lsn>,
}

enum Applied {
    Fresh,
    Already,
    Deferred,
    Failed,
}

/// Replay every segment in `dir` into `store`.
///
/// # Errors
///
/// Filesystem failures and pool exhaustion (the configured capacities
/// cannot hold the log's contents) are fatal; per-entry corruption is not.
pub fn replay(dir: &Path, store: &mut GraphStore) -> Result<RecoveryReport> {
    let reader = WalReader::new();
    let segments = reader.list_segments(dir)?;
    let mut report = RecoveryReport::default();
    let mut deferred: Vec<EntryPayload> = Vec::new();
    let mut txn_region: Option<(u64, Vec<EntryPayload>)> = None;

    for &segment_id in &segments {
        report.next_segment_id = report.next_segment_id.max(segment_id + 1);
        let read = match reader.read_segment(dir, segment_id) {
            Ok(read) => read,
            Err(Error::CorruptedData(detail)) => {
                warn!(
                    target: "nendb::recovery",
                    segment = segment_id,
                    detail = %detail,
                    "skipping segment with invalid header"
                );
                report.segments_skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        report.segments_scanned += 1;
        if read.stop != ReadStop::EndOfData {
            report.torn_segments += 1;
        }

        for entry in read.entries {
            report.max_lsn = report.max_lsn.max(entry.lsn);
            match entry.payload {
                EntryPayload::TxnBegin(txn_id) => {
                    if let Some((stale, buffered)) = txn_region.take() {
                        warn!(
                            target: "nendb::recovery",
                            txn = stale,
                            "transaction never resolved before the next began; discarding"
                        );
                        report.entries_discarded += buffered.len() as u64;
                    }
                    txn_region = Some((txn_id, Vec::new()));
                }
                EntryPayload::TxnCommit(txn_id) => match txn_region.take() {
                    Some((open, buffered)) if open == txn_id => {
                        for payload in buffered {
                            apply_one(store, payload, &mut deferred, &mut report)?;
                        }
                    }
                    other => {
                        warn!(
                            target: "nendb::recovery",
                            txn = txn_id,
                            "commit without a matching begin"
                        );
                        txn_region = other;
                    }
                },
                EntryPayload::TxnAbort(txn_id) => match txn_region.take() {
                    Some((open, buffered)) if open == txn_id => {
                        report.entries_discarded += buffered.len() as u64;
                    }
                    other => txn_region = other,
                },
                EntryPayload::Checkpoint(lsn) => {
                    report.last_checkpoint = Some(lsn);
                }
                EntryPayload::SegmentRotate => {}
                payload => match &mut txn_region {
                    Some((_, buffered)) => buffered.push(payload),
                    None => apply_one(store, payload, &mut deferred, &mut report)?,
                },
            }
        }
    }

    if let Some((txn_id, buffered)) = txn_region.take() {
        warn!(
            target: "nendb::recovery",
            txn = txn_id,
            entries = buffered.len(),
            "discarding incomplete transaction at end of log"
        );
        report.entries_discarded += buffered.len() as u64;
    }

    // Re-attempt deferred entries until a pass makes no progress.
    while !deferred.is_empty() {
        let before = deferred.len();
        let pending = std::mem::take(&mut deferred);
        for payload in pending {
            apply_one(store, payload, &mut deferred, &mut report)?;
        }
        if deferred.len() == before {
            break;
        }
    }
    for payload in deferred.drain(..) {
        warn!(
            target: "nendb::recovery",
            kind = ?payload.kind(),
            "replay entry never became applicable; skipping"
        );
        report.replay_errors += 1;
    }

    info!(
        target: "nendb::recovery",
        segments = report.segments_scanned,
        skipped = report.segments_skipped,
        applied = report.entries_applied,
        errors = report.replay_errors,
        max_lsn = report.max_lsn,
        "WAL replay complete"
    );
    Ok(report)
}

fn apply_one(
    store: &mut GraphStore,
    payload: EntryPayload,
    deferred: &mut Vec<EntryPayload>,
    report: &mut RecoveryReport,
) -> Result<()> {
    let outcome = dispatch(store, &payload)?;
    match outcome {
        Applied::Fresh => report.entries_applied += 1,
        Applied::Already => report.entries_already_applied += 1,
        Applied::Deferred => deferred.push(payload),
        Applied::Failed => {
            warn!(
                target: "nendb::recovery",
                kind = ?payload.kind(),
                "entry cannot be applied; skipping"
            );
            report.replay_errors += 1;
        }
    }
    Ok(())
}

fn dispatch(store: &mut GraphStore, payload: &EntryPayload) -> Result<Applied> {
    let outcome = match payload {
        EntryPayload::NodeInsert(n) => match store.add_node(*n) {
            Ok(_) => Applied::Fresh,
            Err(Error::DuplicateNode(_)) => Applied::Already,
            Err(Error::InvalidId(_)) => Applied::Failed,
            Err(e) => return Err(e),
        },
        EntryPayload::NodeUpdate(n) => match store.update_node(*n) {
            Ok(()) => Applied::Fresh,
            Err(Error::NodeNotFound(_)) => Applied::Deferred,
            Err(e) => return Err(e),
        },
        EntryPayload::NodeDelete(id) => match store.delete_node(*id) {
            Ok(_) => Applied::Fresh,
            Err(Error::NodeNotFound(_)) => Applied::Already,
            Err(e) => return Err(e),
        },
        EntryPayload::EdgeInsert(e) => match store.add_edge(*e) {
            Ok(_) => Applied::Fresh,
            Err(Error::NodeNotFound(_)) => Applied::Deferred,
            Err(Error::DuplicateEdge(_)) => Applied::Already,
            Err(Error::InvalidId(_)) => Applied::Failed,
            Err(e) => return Err(e),
        },
        EntryPayload::EdgeUpdate(e) => match store.update_edge(*e) {
            Ok(()) => Applied::Fresh,
            Err(Error::EdgeNotFound(_)) | Err(Error::NodeNotFound(_)) => Applied::Deferred,
            Err(e) => return Err(e),
        },
        EntryPayload::EdgeDelete(k) => match store.delete_edge(*k) {
            Ok(_) => Applied::Fresh,
            Err(Error::EdgeNotFound(_)) => Applied::Already,
            Err(e) => return Err(e),
        },
        EntryPayload::EmbeddingInsert(e) | EntryPayload::EmbeddingUpdate(e) => {
            match store.set_embedding(e.clone()) {
                Ok(_) => Applied::Fresh,
                Err(Error::NodeNotFound(_)) => Applied::Deferred,
                Err(Error::DimensionMismatch { .. }) => Applied::Failed,
                Err(e) => return Err(e),
            }
        }
        EntryPayload::EmbeddingDelete(id) => match store.delete_embedding(*id) {
            Ok(_) => Applied::Fresh,
            Err(Error::NodeNotFound(_)) => Applied::Already,
            Err(e) => return Err(e),
        },
        EntryPayload::TxnBegin(_)
        | EntryPayload::TxnCommit(_)
        | EntryPayload::TxnAbort(_)
        | EntryPayload::Checkpoint(_)
        | EntryPayload::SegmentRotate => Applied::Already,
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{WalConfig, WalWriter};
    use nendb_core::{EdgeProps, EdgeRecord, NodeProps, NodeRecord, PoolCapacities};
    use tempfile::tempdir;

    fn node(id: u64, kind: u8) -> NodeRecord {
        NodeRecord::new(id, kind, NodeProps::empty()).unwrap()
    }

    fn edge(from: u64, to: u64, label: u16) -> EdgeRecord {
        EdgeRecord::new(from, to, label, EdgeProps::empty()).unwrap()
    }

    fn fresh_store() -> GraphStore {
        GraphStore::new(
            PoolCapacities {
                nodes: 256,
                edges: 256,
                embeddings: 32,
            },
            4,
        )
        .unwrap()
    }

    #[test]
    fn test_replay_restores_nodes_and_edges() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), WalConfig::for_testing(), 1, 0).unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(1, 10)))
            .unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(2, 20)))
            .unwrap();
        writer
            .append(EntryPayload::EdgeInsert(edge(1, 2, 50)))
            .unwrap();
        writer.close().unwrap();

        let mut store = fresh_store();
        let report = replay(dir.path(), &mut store).unwrap();
        assert_eq!(report.entries_applied, 3);
        assert_eq!(report.max_lsn, 3);
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.get_node(1).unwrap().kind, 10);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), WalConfig::for_testing(), 1, 0).unwrap();
        for id in 1..=5u64 {
            writer
                .append(EntryPayload::NodeInsert(node(id, 1)))
                .unwrap();
        }
        writer
            .append(EntryPayload::NodeDelete(3))
            .unwrap();
        writer.close().unwrap();

        let mut store = fresh_store();
        replay(dir.path(), &mut store).unwrap();
        let first_nodes = store.node_count();

        let second = replay(dir.path(), &mut store).unwrap();
        assert_eq!(store.node_count(), first_nodes);
        assert_eq!(second.entries_applied, 0, "second pass changes nothing");
        assert_eq!(second.entries_already_applied, 6);
    }

    #[test]
    fn test_edge_before_node_is_deferred() {
        // Hand-build a log where the edge precedes its endpoints; the
        // deferred pass must still land it.
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), WalConfig::for_testing(), 1, 0).unwrap();
        writer
            .append(EntryPayload::EdgeInsert(edge(1, 2, 9)))
            .unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(1, 0)))
            .unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(2, 0)))
            .unwrap();
        writer.close().unwrap();

        let mut store = fresh_store();
        let report = replay(dir.path(), &mut store).unwrap();
        assert_eq!(report.replay_errors, 0);
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn test_unsatisfiable_entry_counts_as_error() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), WalConfig::for_testing(), 1, 0).unwrap();
        writer
            .append(EntryPayload::EdgeInsert(edge(7, 8, 1)))
            .unwrap();
        writer.close().unwrap();

        let mut store = fresh_store();
        let report = replay(dir.path(), &mut store).unwrap();
        assert_eq!(report.replay_errors, 1);
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_committed_txn_applies_aborted_discards() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), WalConfig::for_testing(), 1, 0).unwrap();
        writer.append(EntryPayload::TxnBegin(1)).unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(1, 1)))
            .unwrap();
        writer.append(EntryPayload::TxnCommit(1)).unwrap();

        writer.append(EntryPayload::TxnBegin(2)).unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(2, 2)))
            .unwrap();
        writer.append(EntryPayload::TxnAbort(2)).unwrap();
        writer.close().unwrap();

        let mut store = fresh_store();
        let report = replay(dir.path(), &mut store).unwrap();
        assert!(store.get_node(1).is_some());
        assert!(store.get_node(2).is_none());
        assert_eq!(report.entries_discarded, 1);
    }

    #[test]
    fn test_incomplete_txn_discarded_at_end_of_log() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), WalConfig::for_testing(), 1, 0).unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(1, 1)))
            .unwrap();
        writer.append(EntryPayload::TxnBegin(9)).unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(2, 2)))
            .unwrap();
        // No commit: crash before the transaction resolved.
        writer.close().unwrap();

        let mut store = fresh_store();
        let report = replay(dir.path(), &mut store).unwrap();
        assert!(store.get_node(1).is_some());
        assert!(store.get_node(2).is_none());
        assert_eq!(report.entries_discarded, 1);
    }

    #[test]
    fn test_checkpoint_lsn_surfaces() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), WalConfig::for_testing(), 1, 0).unwrap();
        writer
            .append(EntryPayload::NodeInsert(node(1, 1)))
            .unwrap();
        let lsn = writer.append(EntryPayload::Checkpoint(1)).unwrap();
        writer.close().unwrap();

        let mut store = fresh_store();
        let report = replay(dir.path(), &mut store).unwrap();
        assert_eq!(report.last_checkpoint, Some(1));
        assert_eq!(report.max_lsn, lsn);
    }

    #[test]
    fn test_empty_directory_yields_empty_report() {
        let dir = tempdir().unwrap();
        let mut store = fresh_store();
        let report = replay(dir.path(), &mut store).unwrap();
        assert_eq!(report, RecoveryReport::default());
    }
}
