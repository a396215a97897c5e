//! Replay behavior across corrupted and torn segments.

use nendb_core::{NodeProps, NodeRecord, PoolCapacities};
use nendb_durability::{replay, EntryPayload, WalConfig, WalWriter, SegmentHeader};
use nendb_storage::GraphStore;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

fn node(id: u64, kind: u8) -> NodeRecord {
    NodeRecord::new(id, kind, NodeProps::empty()).unwrap()
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

fn segment_file(dir: &Path, id: u32) -> std::path::PathBuf {
    dir.join(format!("wal_segment_{:06}.log", id))
}

/// Write 12 node inserts across three 4-entry segments.
fn write_three_segments(dir: &Path) {
    let config = WalConfig::for_testing().with_entries_per_segment(4);
    let mut writer = WalWriter::open(dir, config, 1, 0).unwrap();
    for id in 1..=12u64 {
        writer.append(EntryPayload::NodeInsert(node(id, 7))).unwrap();
    }
    writer.close().unwrap();
}

#[test]
fn corrupt_first_entry_skips_rest_of_segment_only() {
    let dir = tempfile::tempdir().unwrap();
    write_three_segments(dir.path());

    // Corrupt the first entry of segment 1 (nodes 5..8).
    let path = segment_file(dir.path(), 1);
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    file.seek(SeekFrom::Start(34 + 30)).unwrap();
    file.write_all(&[0xAA]).unwrap();

    let mut store = fresh_store();
    let report = replay(dir.path(), &mut store).unwrap();

    // Segment 0 (1..4) and segment 2 (9..12) apply; segment 1 is lost
    // from its first entry onward.
    assert_eq!(store.node_count(), 8);
    for id in 1..=4u64 {
        assert!(store.get_node(id).is_some());
    }
    for id in 5..=8u64 {
        assert!(store.get_node(id).is_none());
    }
    for id in 9..=12u64 {
        assert!(store.get_node(id).is_some());
    }
    assert_eq!(report.torn_segments, 1);
}

#[test]
fn corrupt_header_skips_whole_segment_later_segments_apply() {
    let dir = tempfile::tempdir().unwrap();
    write_three_segments(dir.path());

    let path = segment_file(dir.path(), 0);
    let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(b"JUNKJUNK").unwrap();

    let mut store = fresh_store();
    let report = replay(dir.path(), &mut store).unwrap();

    assert_eq!(report.segments_skipped, 1);
    assert_eq!(report.segments_scanned, 2);
    assert_eq!(store.node_count(), 8);
    assert!(store.get_node(1).is_none());
    assert!(store.get_node(5).is_some());
}

#[test]
fn sealed_headers_carry_lsn_ranges() {
    let dir = tempfile::tempdir().unwrap();
    write_three_segments(dir.path());

    let bytes = std::fs::read(segment_file(dir.path(), 1)).unwrap();
    let header = SegmentHeader::from_bytes(bytes[..34].try_into().unwrap()).unwrap();
    assert_eq!(header.segment_id, 1);
    assert_eq!(header.lsn_start, 5);
    assert_eq!(header.lsn_end, 8);
    assert_eq!(header.entry_count, 4);
}

#[test]
fn replay_resumes_writer_past_old_segments() {
    let dir = tempfile::tempdir().unwrap();
    write_three_segments(dir.path());

    let mut store = fresh_store();
    let report = replay(dir.path(), &mut store).unwrap();
    assert_eq!(report.max_lsn, 12);
    assert_eq!(report.next_segment_id, 3);

    // A writer opened from the report continues the LSN sequence.
    let config = WalConfig::for_testing().with_entries_per_segment(4);
    let mut writer = WalWriter::open(
        dir.path(),
        config,
        report.max_lsn + 1,
        report.next_segment_id,
    )
    .unwrap();
    let lsn = writer
        .append(EntryPayload::NodeInsert(node(13, 7)))
        .unwrap();
    assert_eq!(lsn, 13);
    writer.close().unwrap();
}
