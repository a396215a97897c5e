//! Buffered WAL writer with segment rotation
//!
//! The writer owns LSN assignment: every appended entry gets the next
//! sequence number, so LSN order matches append order, which matches the
//! order the engine held the write lock.
//!
//! Crash-consistency contract: a record is formatted and checksummed, then
//! written into the buffer, and only afterwards does the caller mutate
//! memory. A crash before the buffer reaches disk loses the tail the
//! caller never saw fsynced; a crash after leaves replay to reapply it.

use crate::format::{
    segment_path, EntryPayload, SegmentHeader, WalEntry, SEGMENT_HEADER_SIZE,
};
use crate::now_micros;
use crate::wal::config::WalConfig;
use nendb_core::{Lsn, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Writer-side counters, snapshotted into stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Entries appended since open
    pub entries_appended: u64,
    /// Entry bytes handed to the buffer
    pub bytes_written: u64,
    /// fsync calls issued
    pub fsyncs: u64,
    /// Segment rotations performed
    pub rotations: u64,
}

/// Append-only writer over the active segment.
pub struct WalWriter {
    dir: PathBuf,
    config: WalConfig,
    file: File,
    header: SegmentHeader,
    buffer: Vec<u8>,
    /// Header plus all entry bytes, flushed or still buffered.
    segment_bytes: u64,
    next_lsn: Lsn,
    ops_since_sync: u32,
    bytes_since_sync: u64,
    counters: WalCounters,
}

impl WalWriter {
    /// Open a writer on a fresh segment.
    ///
    /// `next_lsn` is 1 for an empty database or `max_replayed_lsn + 1`
    /// after recovery; `segment_id` is 0 or one past the newest existing
    /// segment. The writer never appends to a pre-existing file: sealed
    /// headers are rewritten in place, so resuming a possibly-torn
    /// segment would lose that bookkeeping.
    pub fn open(dir: &Path, config: WalConfig, next_lsn: Lsn, segment_id: u32) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let header = SegmentHeader::new(segment_id, next_lsn);
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(segment_path(dir, segment_id))?;
        file.write_all(&header.to_bytes())?;

        Ok(WalWriter {
            dir: dir.to_path_buf(),
            buffer: Vec::with_capacity(config.buffer_size),
            config,
            file,
            header,
            segment_bytes: SEGMENT_HEADER_SIZE as u64,
            next_lsn,
            ops_since_sync: 0,
            bytes_since_sync: 0,
            counters: WalCounters::default(),
        })
    }

    /// Append one entry, assigning it the next LSN.
    ///
    /// Rotates first when the entry would push the segment past its size
    /// or entry-count limit; syncs afterwards when the policy interval
    /// elapses.
    pub fn append(&mut self, payload: EntryPayload) -> Result<Lsn> {
        let lsn = self.next_lsn;
        let entry = WalEntry::new(lsn, now_micros(), payload);
        let bytes = entry.to_bytes();

        let over_count = self.header.entry_count + 1 > self.config.entries_per_segment;
        let over_size = self.segment_bytes + bytes.len() as u64 > self.config.segment_size;
        if over_count || over_size {
            self.rotate()?;
        }

        if self.buffer.len() + bytes.len() > self.config.buffer_size {
            self.drain_buffer()?;
        }
        self.buffer.extend_from_slice(&bytes);

        self.header.lsn_end = lsn;
        self.header.entry_count += 1;
        self.segment_bytes += bytes.len() as u64;
        self.next_lsn += 1;
        self.ops_since_sync += 1;
        self.bytes_since_sync += bytes.len() as u64;
        self.counters.entries_appended += 1;
        self.counters.bytes_written += bytes.len() as u64;

        if self.ops_since_sync >= self.config.sync_interval_ops
            || self.bytes_since_sync >= self.config.sync_interval_bytes
        {
            self.flush()?;
        }
        Ok(lsn)
    }

    /// Write the buffer out and fsync the segment.
    pub fn flush(&mut self) -> Result<()> {
        self.drain_buffer()?;
        self.file.sync_all()?;
        self.counters.fsyncs += 1;
        self.ops_since_sync = 0;
        self.bytes_since_sync = 0;
        Ok(())
    }

    fn drain_buffer(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.file.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Seal the active segment: flush, rewrite the header with the final
    /// `lsn_end` / `entry_count`, fsync.
    fn seal(&mut self) -> Result<()> {
        self.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;
        self.file.sync_all()?;
        self.counters.fsyncs += 1;
        Ok(())
    }

    /// Seal the active segment and open the next one.
    fn rotate(&mut self) -> Result<()> {
        self.seal()?;
        let sealed = self.header;

        let segment_id = self.header.segment_id + 1;
        self.header = SegmentHeader::new(segment_id, self.next_lsn);
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(segment_path(&self.dir, segment_id))?;
        file.write_all(&self.header.to_bytes())?;
        self.file = file;
        self.segment_bytes = SEGMENT_HEADER_SIZE as u64;
        self.counters.rotations += 1;

        tracing::debug!(
            target: "nendb::wal",
            sealed_segment = sealed.segment_id,
            entries = sealed.entry_count,
            lsn_end = sealed.lsn_end,
            new_segment = segment_id,
            "rotated WAL segment"
        );
        Ok(())
    }

    /// Seal the active segment and consume the writer.
    pub fn close(mut self) -> Result<()> {
        self.seal()
    }

    /// LSN the next append will receive.
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }

    /// Id of the active segment.
    pub fn current_segment(&self) -> u32 {
        self.header.segment_id
    }

    /// Entries appended to the active segment so far.
    pub fn current_entry_count(&self) -> u32 {
        self.header.entry_count
    }

    /// Writer counters.
    pub fn counters(&self) -> WalCounters {
        self.counters
    }
}
