//! Checkpoint metadata sidecar
//!
//! `checkpoint.meta` records the LSN of the most recent checkpoint entry.
//! Segments whose `lsn_end` lies entirely before it are safe to archive.

use crate::wal::WalReader;
use crc32fast::Hasher;
use nendb_core::{Error, Lsn, Result};
use std::io::Write;
use std::path::Path;

/// Sidecar file name, placed next to the segments.
pub const CHECKPOINT_FILE: &str = "checkpoint.meta";

/// Magic identifying the sidecar: "NENC".
const CHECKPOINT_MAGIC: u32 = 0x4E45_4E43;

/// Persist the checkpoint LSN (atomically via rename).
pub fn write_checkpoint(dir: &Path, lsn: Lsn) -> Result<()> {
    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&CHECKPOINT_MAGIC.to_le_bytes());
    bytes[4..12].copy_from_slice(&lsn.to_le_bytes());
    let mut hasher = Hasher::new();
    hasher.update(&bytes[0..12]);
    bytes[12..16].copy_from_slice(&hasher.finalize().to_le_bytes());

    let tmp = dir.join(format!("{CHECKPOINT_FILE}.tmp"));
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    std::fs::rename(&tmp, dir.join(CHECKPOINT_FILE))?;
    Ok(())
}

/// Read the checkpoint LSN; `None` when no sidecar exists.
///
/// # Errors
///
/// Returns [`Error::CorruptedData`] for a malformed sidecar.
pub fn read_checkpoint(dir: &Path) -> Result<Option<Lsn>> {
    let path = dir.join(CHECKPOINT_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if bytes.len() != 16 {
        return Err(Error::CorruptedData(format!(
            "checkpoint.meta is {} bytes, expected 16",
            bytes.len()
        )));
    }
    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if magic != CHECKPOINT_MAGIC {
        return Err(Error::CorruptedData("bad checkpoint magic".into()));
    }
    let stored_crc = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
    let mut hasher = Hasher::new();
    hasher.update(&bytes[0..12]);
    if hasher.finalize() != stored_crc {
        return Err(Error::CorruptedData("checkpoint crc mismatch".into()));
    }
    Ok(Some(u64::from_le_bytes(bytes[4..12].try_into().unwrap())))
}

/// Segment ids whose entries all precede `checkpoint_lsn`.
///
/// Unreadable segments are excluded (never archive what cannot be
/// verified).
pub fn archivable_segments(dir: &Path, checkpoint_lsn: Lsn) -> Result<Vec<u32>> {
    let reader = WalReader::new();
    let mut out = Vec::new();
    for id in reader.list_segments(dir)? {
        match reader.read_segment(dir, id) {
            Ok(read) => {
                let all_before = read
                    .entries
                    .last()
                    .map(|e| e.lsn < checkpoint_lsn)
                    .unwrap_or(false);
                if all_before {
                    out.push(id);
                }
            }
            Err(Error::CorruptedData(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::EntryPayload;
    use crate::wal::{WalConfig, WalWriter};
    use tempfile::tempdir;

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempdir().unwrap();
        assert_eq!(read_checkpoint(dir.path()).unwrap(), None);
        write_checkpoint(dir.path(), 1234).unwrap();
        assert_eq!(read_checkpoint(dir.path()).unwrap(), Some(1234));
        // Overwrite with a newer checkpoint.
        write_checkpoint(dir.path(), 5678).unwrap();
        assert_eq!(read_checkpoint(dir.path()).unwrap(), Some(5678));
    }

    #[test]
    fn test_corrupt_sidecar_detected() {
        let dir = tempdir().unwrap();
        write_checkpoint(dir.path(), 10).unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[6] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            read_checkpoint(dir.path()),
            Err(Error::CorruptedData(_))
        ));
    }

    #[test]
    fn test_archivable_segments() {
        let dir = tempdir().unwrap();
        let config = WalConfig::for_testing().with_entries_per_segment(4);
        let mut writer = WalWriter::open(dir.path(), config, 1, 0).unwrap();
        for i in 1..=10u64 {
            writer.append(EntryPayload::NodeDelete(i)).unwrap();
        }
        writer.close().unwrap();
        // Segments: 0 (lsn 1..4), 1 (5..8), 2 (9..10).
        assert_eq!(archivable_segments(dir.path(), 9).unwrap(), vec![0, 1]);
        assert_eq!(archivable_segments(dir.path(), 5).unwrap(), vec![0]);
        assert!(archivable_segments(dir.path(), 1).unwrap().is_empty());
    }
}
