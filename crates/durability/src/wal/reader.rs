//! Checksum-verified WAL reading
//!
//! The reader never trusts a header's `entry_count` for an unsealed
//! (crashed) segment: it walks entries front to back, stopping at the
//! first torn or corrupt record. Recovery decides what to do with the
//! prefix.

use crate::format::{segment_path, SegmentHeader, WalEntry, SEGMENT_HEADER_SIZE};
use nendb_core::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Why entry iteration ended for a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStop {
    /// Every byte parsed cleanly
    EndOfData,
    /// A partial entry at the tail (expected after a crash)
    Torn {
        /// Byte offset of the partial entry
        offset: u64,
    },
    /// A CRC or format violation; nothing past it is trusted
    Corrupt {
        /// Byte offset of the bad entry
        offset: u64,
        /// Human-readable cause
        detail: String,
    },
}

/// The verified contents of one segment.
#[derive(Debug, Clone)]
pub struct SegmentRead {
    /// Parsed header
    pub header: SegmentHeader,
    /// Entries up to the first torn/corrupt record
    pub entries: Vec<WalEntry>,
    /// Why iteration stopped
    pub stop: ReadStop,
}

/// Reader over a WAL directory.
#[derive(Debug, Default)]
pub struct WalReader;

impl WalReader {
    /// Create a reader.
    pub fn new() -> Self {
        WalReader
    }

    /// Segment ids present in `dir`, ascending.
    pub fn list_segments(&self, dir: &Path) -> Result<Vec<u32>> {
        let mut segments = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            // Expected: "wal_segment_NNNNNN.log" (12 + 6 + 4 chars).
            if name.starts_with("wal_segment_") && name.ends_with(".log") && name.len() == 22 {
                if let Ok(id) = name[12..18].parse::<u32>() {
                    segments.push(id);
                }
            }
        }
        segments.sort_unstable();
        Ok(segments)
    }

    /// Read and verify one segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] when the header itself fails
    /// validation (the caller skips the whole segment), or [`Error::Io`]
    /// on filesystem failures. Entry-level corruption is reported through
    /// [`SegmentRead::stop`], not as an error.
    pub fn read_segment(&self, dir: &Path, segment_id: u32) -> Result<SegmentRead> {
        let path = segment_path(dir, segment_id);
        let mut file = File::open(&path)?;

        let mut header_bytes = [0u8; SEGMENT_HEADER_SIZE];
        file.read_exact(&mut header_bytes).map_err(|_| {
            Error::CorruptedData(format!(
                "segment {segment_id}: file shorter than a header"
            ))
        })?;
        let header = SegmentHeader::from_bytes(&header_bytes)?;
        if header.segment_id != segment_id {
            return Err(Error::CorruptedData(format!(
                "segment file {segment_id} carries header id {}",
                header.segment_id
            )));
        }

        let mut body = Vec::new();
        file.read_to_end(&mut body)?;

        let mut entries = Vec::new();
        let mut offset = 0usize;
        let stop = loop {
            if offset == body.len() {
                break ReadStop::EndOfData;
            }
            match WalEntry::from_bytes(&body[offset..]) {
                Ok(Some((entry, consumed))) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Ok(None) => {
                    break ReadStop::Torn {
                        offset: (SEGMENT_HEADER_SIZE + offset) as u64,
                    }
                }
                Err(e) => {
                    let at = (SEGMENT_HEADER_SIZE + offset) as u64;
                    warn!(
                        target: "nendb::wal",
                        segment = segment_id,
                        offset = at,
                        error = %e,
                        "stopping replay of segment at corrupt entry"
                    );
                    break ReadStop::Corrupt {
                        offset: at,
                        detail: e.to_string(),
                    };
                }
            }
        };

        // A sealed segment's bookkeeping should match what we parsed.
        if header.entry_count > 0
            && stop == ReadStop::EndOfData
            && entries.len() != header.entry_count as usize
        {
            warn!(
                target: "nendb::wal",
                segment = segment_id,
                expected = header.entry_count,
                parsed = entries.len(),
                "segment entry count disagrees with header"
            );
        }

        Ok(SegmentRead {
            header,
            entries,
            stop,
        })
    }

    /// Highest LSN across all readable segments, 0 when none.
    pub fn max_lsn(&self, dir: &Path) -> Result<u64> {
        let mut max = 0u64;
        for id in self.list_segments(dir)? {
            match self.read_segment(dir, id) {
                Ok(read) => {
                    if let Some(last) = read.entries.last() {
                        max = max.max(last.lsn);
                    }
                }
                Err(Error::CorruptedData(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(max)
    }
}
