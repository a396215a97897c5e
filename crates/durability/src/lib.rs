//! Durability for NenDB: segmented WAL and crash recovery
//!
//! Layout of responsibilities:
//!
//! - [`format`]: the exact on-disk byte layouts (segment header, entry
//!   framing, payload codecs), all CRC32-protected.
//! - [`wal`]: the buffered writer (rotation, sync policy, sealing) and
//!   the verifying reader.
//! - [`recovery`]: replay of every segment into a [`nendb_storage::GraphStore`],
//!   with transaction-region handling and deferred entries.
//! - [`checkpoint`]: the `checkpoint.meta` sidecar and archival queries.
//!
//! The crash-consistency rule lives with the callers: format the record,
//! checksum it, hand it to the writer, and only then mutate memory.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod format;
pub mod recovery;
pub mod wal;

pub use checkpoint::{archivable_segments, read_checkpoint, write_checkpoint, CHECKPOINT_FILE};
pub use format::{EntryKind, EntryPayload, SegmentHeader, WalEntry};
pub use recovery::{replay, RecoveryReport};
pub use wal::{ReadStop, SegmentRead, WalConfig, WalCounters, WalReader, WalWriter};

/// Microseconds since the Unix epoch, for WAL entry timestamps.
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
