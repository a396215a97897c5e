//! WAL segment header format
//!
//! Segments are named `wal_segment_NNNNNN.log` with a zero-padded decimal
//! segment id. The 34-byte header sits at offset 0:
//!
//! ```text
//! ┌──────────┬─────────┬────────────┬───────────┬─────────┬─────────────┬───────┐
//! │ magic u32│ ver u16 │ seg_id u32 │ lsn_start │ lsn_end │ entries u32 │ crc32 │
//! │          │         │            │    u64    │   u64   │             │  u32  │
//! └──────────┴─────────┴────────────┴───────────┴─────────┴─────────────┴───────┘
//! ```
//!
//! `lsn_end` and `entry_count` are rewritten in place when the segment is
//! sealed (rotation or close); until then they reflect creation time and
//! recovery must walk entry checksums instead of trusting them.

use crc32fast::Hasher;
use nendb_core::{Error, Lsn, Result};
use std::path::{Path, PathBuf};

/// Magic identifying a WAL segment file: "NEND".
pub const SEGMENT_MAGIC: u32 = 0x4E45_4E44;

/// Current WAL format version.
pub const WAL_VERSION: u16 = 2;

/// Size of the segment header in bytes.
pub const SEGMENT_HEADER_SIZE: usize = 34;

/// Segment file path: `wal_segment_NNNNNN.log`.
pub fn segment_path(dir: &Path, segment_id: u32) -> PathBuf {
    dir.join(format!("wal_segment_{:06}.log", segment_id))
}

/// Parsed segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Segment id (monotonically increasing, starts at 0)
    pub segment_id: u32,
    /// First LSN that may appear in this segment
    pub lsn_start: Lsn,
    /// Last LSN in this segment (valid once sealed)
    pub lsn_end: Lsn,
    /// Number of entries (valid once sealed)
    pub entry_count: u32,
}

impl SegmentHeader {
    /// Header for a freshly created segment.
    pub fn new(segment_id: u32, lsn_start: Lsn) -> Self {
        SegmentHeader {
            segment_id,
            lsn_start,
            lsn_end: lsn_start,
            entry_count: 0,
        }
    }

    /// Serialize, computing the trailing CRC over the first 30 bytes.
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&SEGMENT_MAGIC.to_le_bytes());
        bytes[4..6].copy_from_slice(&WAL_VERSION.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.segment_id.to_le_bytes());
        bytes[10..18].copy_from_slice(&self.lsn_start.to_le_bytes());
        bytes[18..26].copy_from_slice(&self.lsn_end.to_le_bytes());
        bytes[26..30].copy_from_slice(&self.entry_count.to_le_bytes());
        let mut hasher = Hasher::new();
        hasher.update(&bytes[0..30]);
        bytes[30..34].copy_from_slice(&hasher.finalize().to_le_bytes());
        bytes
    }

    /// Parse and verify magic, version and CRC.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedData`] on any mismatch.
    pub fn from_bytes(bytes: &[u8; SEGMENT_HEADER_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != SEGMENT_MAGIC {
            return Err(Error::CorruptedData(format!(
                "bad segment magic {magic:#010x}"
            )));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != WAL_VERSION {
            return Err(Error::CorruptedData(format!(
                "unsupported WAL version {version}"
            )));
        }
        let stored_crc = u32::from_le_bytes(bytes[30..34].try_into().unwrap());
        let mut hasher = Hasher::new();
        hasher.update(&bytes[0..30]);
        let computed = hasher.finalize();
        if stored_crc != computed {
            return Err(Error::CorruptedData(format!(
                "segment header crc mismatch: stored {stored_crc:#010x}, computed {computed:#010x}"
            )));
        }
        Ok(SegmentHeader {
            segment_id: u32::from_le_bytes(bytes[6..10].try_into().unwrap()),
            lsn_start: u64::from_le_bytes(bytes[10..18].try_into().unwrap()),
            lsn_end: u64::from_le_bytes(bytes[18..26].try_into().unwrap()),
            entry_count: u32::from_le_bytes(bytes[26..30].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = SegmentHeader::new(3, 1001);
        header.lsn_end = 2000;
        header.entry_count = 1000;

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), SEGMENT_HEADER_SIZE);
        let parsed = SegmentHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_bad_magic() {
        let header = SegmentHeader::new(0, 1);
        let mut bytes = header.to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            SegmentHeader::from_bytes(&bytes),
            Err(Error::CorruptedData(_))
        ));
    }

    #[test]
    fn test_header_crc_detects_field_corruption() {
        let header = SegmentHeader::new(7, 500);
        let mut bytes = header.to_bytes();
        bytes[12] ^= 0xFF; // inside lsn_start
        assert!(matches!(
            SegmentHeader::from_bytes(&bytes),
            Err(Error::CorruptedData(_))
        ));
    }

    #[test]
    fn test_segment_path_format() {
        let dir = Path::new("/data");
        assert_eq!(
            segment_path(dir, 0),
            PathBuf::from("/data/wal_segment_000000.log")
        );
        assert_eq!(
            segment_path(dir, 42),
            PathBuf::from("/data/wal_segment_000042.log")
        );
    }
}
