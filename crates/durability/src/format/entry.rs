//! WAL entry format
//!
//! Entry layout on disk:
//!
//! ```text
//! ┌─────────┬──────────┬─────────┬───────────────┬───────────┬─────────┐
//! │ type u8 │ size u32 │ lsn u64 │ timestamp i64 │ crc32 u32 │ payload │
//! └─────────┴──────────┴─────────┴───────────────┴───────────┴─────────┘
//! ```
//!
//! `size` counts the whole entry (25-byte header + payload). The CRC
//! covers `type ‖ size ‖ lsn ‖ timestamp ‖ payload`: everything except
//! the CRC field itself.

use crc32fast::Hasher;
use nendb_core::{
    EdgeKey, EdgeProps, EdgeRecord, EmbeddingRecord, Error, Lsn, NodeProps, NodeRecord, Result,
};

/// Size of the entry header in bytes.
pub const ENTRY_HEADER_SIZE: usize = 25;

/// Entry type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// Node inserted
    NodeInsert = 1,
    /// Node updated in place
    NodeUpdate = 2,
    /// Node soft-deleted
    NodeDelete = 3,
    /// Edge inserted
    EdgeInsert = 4,
    /// Edge updated in place
    EdgeUpdate = 5,
    /// Edge soft-deleted
    EdgeDelete = 6,
    /// Embedding attached
    EmbeddingInsert = 7,
    /// Embedding replaced
    EmbeddingUpdate = 8,
    /// Embedding removed
    EmbeddingDelete = 9,
    /// Transaction opened
    TxnBegin = 10,
    /// Transaction committed
    TxnCommit = 11,
    /// Transaction rolled back
    TxnAbort = 12,
    /// Durability checkpoint
    Checkpoint = 13,
    /// Segment rotation marker
    SegmentRotate = 14,
}

impl EntryKind {
    fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            1 => EntryKind::NodeInsert,
            2 => EntryKind::NodeUpdate,
            3 => EntryKind::NodeDelete,
            4 => EntryKind::EdgeInsert,
            5 => EntryKind::EdgeUpdate,
            6 => EntryKind::EdgeDelete,
            7 => EntryKind::EmbeddingInsert,
            8 => EntryKind::EmbeddingUpdate,
            9 => EntryKind::EmbeddingDelete,
            10 => EntryKind::TxnBegin,
            11 => EntryKind::TxnCommit,
            12 => EntryKind::TxnAbort,
            13 => EntryKind::Checkpoint,
            14 => EntryKind::SegmentRotate,
            other => {
                return Err(Error::CorruptedData(format!(
                    "unknown WAL entry type {other}"
                )))
            }
        })
    }
}

/// Typed entry payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryPayload {
    /// `u64 id | u8 kind | u32 props_len | bytes`
    NodeInsert(NodeRecord),
    /// Same layout as insert
    NodeUpdate(NodeRecord),
    /// `u64 id`
    NodeDelete(u64),
    /// `u64 from | u64 to | u16 label | u32 props_len | bytes`
    EdgeInsert(EdgeRecord),
    /// Same layout as insert
    EdgeUpdate(EdgeRecord),
    /// `u64 from | u64 to | u16 label`
    EdgeDelete(EdgeKey),
    /// `u64 node_id | u32 dim | f32[dim]`
    EmbeddingInsert(EmbeddingRecord),
    /// Same layout as insert
    EmbeddingUpdate(EmbeddingRecord),
    /// `u64 node_id`
    EmbeddingDelete(u64),
    /// `u64 txn_id`
    TxnBegin(u64),
    /// `u64 txn_id`
    TxnCommit(u64),
    /// `u64 txn_id`
    TxnAbort(u64),
    /// `u64 lsn`
    Checkpoint(Lsn),
    /// Empty payload
    SegmentRotate,
}

impl EntryPayload {
    /// The entry type tag for this payload.
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryPayload::NodeInsert(_) => EntryKind::NodeInsert,
            EntryPayload::NodeUpdate(_) => EntryKind::NodeUpdate,
            EntryPayload::NodeDelete(_) => EntryKind::NodeDelete,
            EntryPayload::EdgeInsert(_) => EntryKind::EdgeInsert,
            EntryPayload::EdgeUpdate(_) => EntryKind::EdgeUpdate,
            EntryPayload::EdgeDelete(_) => EntryKind::EdgeDelete,
            EntryPayload::EmbeddingInsert(_) => EntryKind::EmbeddingInsert,
            EntryPayload::EmbeddingUpdate(_) => EntryKind::EmbeddingUpdate,
            EntryPayload::EmbeddingDelete(_) => EntryKind::EmbeddingDelete,
            EntryPayload::TxnBegin(_) => EntryKind::TxnBegin,
            EntryPayload::TxnCommit(_) => EntryKind::TxnCommit,
            EntryPayload::TxnAbort(_) => EntryKind::TxnAbort,
            EntryPayload::Checkpoint(_) => EntryKind::Checkpoint,
            EntryPayload::SegmentRotate => EntryKind::SegmentRotate,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            EntryPayload::NodeInsert(n) | EntryPayload::NodeUpdate(n) => {
                out.extend_from_slice(&n.id.to_le_bytes());
                out.push(n.kind);
                let props = n.props.as_slice();
                out.extend_from_slice(&(props.len() as u32).to_le_bytes());
                out.extend_from_slice(props);
            }
            EntryPayload::NodeDelete(id) => out.extend_from_slice(&id.to_le_bytes()),
            EntryPayload::EdgeInsert(e) | EntryPayload::EdgeUpdate(e) => {
                out.extend_from_slice(&e.from.to_le_bytes());
                out.extend_from_slice(&e.to.to_le_bytes());
                out.extend_from_slice(&e.label.to_le_bytes());
                let props = e.props.as_slice();
                out.extend_from_slice(&(props.len() as u32).to_le_bytes());
                out.extend_from_slice(props);
            }
            EntryPayload::EdgeDelete(k) => {
                out.extend_from_slice(&k.from.to_le_bytes());
                out.extend_from_slice(&k.to.to_le_bytes());
                out.extend_from_slice(&k.label.to_le_bytes());
            }
            EntryPayload::EmbeddingInsert(e) | EntryPayload::EmbeddingUpdate(e) => {
                out.extend_from_slice(&e.node_id.to_le_bytes());
                out.extend_from_slice(&(e.vector.len() as u32).to_le_bytes());
                for v in &e.vector {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            EntryPayload::EmbeddingDelete(id) => out.extend_from_slice(&id.to_le_bytes()),
            EntryPayload::TxnBegin(id) | EntryPayload::TxnCommit(id) | EntryPayload::TxnAbort(id) => {
                out.extend_from_slice(&id.to_le_bytes())
            }
            EntryPayload::Checkpoint(lsn) => out.extend_from_slice(&lsn.to_le_bytes()),
            EntryPayload::SegmentRotate => {}
        }
    }

    fn decode(kind: EntryKind, bytes: &[u8]) -> Result<Self> {
        let truncated = || Error::CorruptedData(format!("truncated {kind:?} payload"));
        let read_u64 = |b: &[u8], at: usize| -> Result<u64> {
            b.get(at..at + 8)
                .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
                .ok_or_else(truncated)
        };
        let read_u32 = |b: &[u8], at: usize| -> Result<u32> {
            b.get(at..at + 4)
                .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
                .ok_or_else(truncated)
        };
        let read_u16 = |b: &[u8], at: usize| -> Result<u16> {
            b.get(at..at + 2)
                .map(|s| u16::from_le_bytes(s.try_into().unwrap()))
                .ok_or_else(truncated)
        };

        Ok(match kind {
            EntryKind::NodeInsert | EntryKind::NodeUpdate => {
                let id = read_u64(bytes, 0)?;
                let node_kind = *bytes.get(8).ok_or_else(truncated)?;
                let props_len = read_u32(bytes, 9)? as usize;
                let props = bytes.get(13..13 + props_len).ok_or_else(truncated)?;
                let record = NodeRecord {
                    id,
                    kind: node_kind,
                    props: NodeProps::from_slice(props)?,
                };
                if kind == EntryKind::NodeInsert {
                    EntryPayload::NodeInsert(record)
                } else {
                    EntryPayload::NodeUpdate(record)
                }
            }
            EntryKind::NodeDelete => EntryPayload::NodeDelete(read_u64(bytes, 0)?),
            EntryKind::EdgeInsert | EntryKind::EdgeUpdate => {
                let from = read_u64(bytes, 0)?;
                let to = read_u64(bytes, 8)?;
                let label = read_u16(bytes, 16)?;
                let props_len = read_u32(bytes, 18)? as usize;
                let props = bytes.get(22..22 + props_len).ok_or_else(truncated)?;
                let record = EdgeRecord {
                    from,
                    to,
                    label,
                    props: EdgeProps::from_slice(props)?,
                };
                if kind == EntryKind::EdgeInsert {
                    EntryPayload::EdgeInsert(record)
                } else {
                    EntryPayload::EdgeUpdate(record)
                }
            }
            EntryKind::EdgeDelete => EntryPayload::EdgeDelete(EdgeKey {
                from: read_u64(bytes, 0)?,
                to: read_u64(bytes, 8)?,
                label: read_u16(bytes, 16)?,
            }),
            EntryKind::EmbeddingInsert | EntryKind::EmbeddingUpdate => {
                let node_id = read_u64(bytes, 0)?;
                let dim = read_u32(bytes, 8)? as usize;
                let mut vector = Vec::with_capacity(dim);
                for i in 0..dim {
                    let at = 12 + i * 4;
                    let bits = bytes
                        .get(at..at + 4)
                        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
                        .ok_or_else(truncated)?;
                    vector.push(f32::from_bits(bits));
                }
                let record = EmbeddingRecord { node_id, vector };
                if kind == EntryKind::EmbeddingInsert {
                    EntryPayload::EmbeddingInsert(record)
                } else {
                    EntryPayload::EmbeddingUpdate(record)
                }
            }
            EntryKind::EmbeddingDelete => EntryPayload::EmbeddingDelete(read_u64(bytes, 0)?),
            EntryKind::TxnBegin => EntryPayload::TxnBegin(read_u64(bytes, 0)?),
            EntryKind::TxnCommit => EntryPayload::TxnCommit(read_u64(bytes, 0)?),
            EntryKind::TxnAbort => EntryPayload::TxnAbort(read_u64(bytes, 0)?),
            EntryKind::Checkpoint => EntryPayload::Checkpoint(read_u64(bytes, 0)?),
            EntryKind::SegmentRotate => EntryPayload::SegmentRotate,
        })
    }
}

/// A WAL entry: LSN, wall-clock timestamp, and typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Log sequence number
    pub lsn: Lsn,
    /// Microseconds since epoch at append time
    pub timestamp: i64,
    /// The operation this entry records
    pub payload: EntryPayload,
}

impl WalEntry {
    /// Build an entry.
    pub fn new(lsn: Lsn, timestamp: i64, payload: EntryPayload) -> Self {
        WalEntry {
            lsn,
            timestamp,
            payload,
        }
    }

    /// Serialize: header fields, CRC, payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.payload.encode(&mut payload);
        let size = (ENTRY_HEADER_SIZE + payload.len()) as u32;

        // CRC input: type ‖ size ‖ lsn ‖ timestamp ‖ payload.
        let mut hasher = Hasher::new();
        hasher.update(&[self.payload.kind() as u8]);
        hasher.update(&size.to_le_bytes());
        hasher.update(&self.lsn.to_le_bytes());
        hasher.update(&self.timestamp.to_le_bytes());
        hasher.update(&payload);
        let crc = hasher.finalize();

        let mut bytes = Vec::with_capacity(size as usize);
        bytes.push(self.payload.kind() as u8);
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&payload);
        bytes
    }

    /// Parse one entry from the front of `bytes`.
    ///
    /// Returns the entry and the bytes consumed. `None` when `bytes` holds
    /// only a partial entry (a torn tail is expected after a crash);
    /// [`Error::CorruptedData`] on CRC or format violations.
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<(Self, usize)>> {
        if bytes.len() < ENTRY_HEADER_SIZE {
            return Ok(None);
        }
        let kind_byte = bytes[0];
        let size = u32::from_le_bytes(bytes[1..5].try_into().unwrap()) as usize;
        if size < ENTRY_HEADER_SIZE {
            return Err(Error::CorruptedData(format!(
                "entry size {size} below header size"
            )));
        }
        if bytes.len() < size {
            return Ok(None);
        }
        let lsn = u64::from_le_bytes(bytes[5..13].try_into().unwrap());
        let timestamp = i64::from_le_bytes(bytes[13..21].try_into().unwrap());
        let stored_crc = u32::from_le_bytes(bytes[21..25].try_into().unwrap());
        let payload_bytes = &bytes[ENTRY_HEADER_SIZE..size];

        let mut hasher = Hasher::new();
        hasher.update(&bytes[0..21]);
        hasher.update(payload_bytes);
        let computed = hasher.finalize();
        if stored_crc != computed {
            return Err(Error::CorruptedData(format!(
                "entry crc mismatch at lsn {lsn}: stored {stored_crc:#010x}, computed {computed:#010x}"
            )));
        }

        let kind = EntryKind::from_u8(kind_byte)?;
        let payload = EntryPayload::decode(kind, payload_bytes)?;
        Ok(Some((
            WalEntry {
                lsn,
                timestamp,
                payload,
            },
            size,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nendb_core::{EdgeProps, NodeProps};

    fn roundtrip(payload: EntryPayload) -> WalEntry {
        let entry = WalEntry::new(42, 1_700_000_000_000_000, payload);
        let bytes = entry.to_bytes();
        let (parsed, consumed) = WalEntry::from_bytes(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, entry);
        parsed
    }

    #[test]
    fn test_node_insert_roundtrip() {
        let node = NodeRecord::new(7, 3, NodeProps::from_slice(b"payload").unwrap()).unwrap();
        let parsed = roundtrip(EntryPayload::NodeInsert(node));
        assert_eq!(parsed.payload.kind(), EntryKind::NodeInsert);
    }

    #[test]
    fn test_edge_insert_roundtrip() {
        let edge = EdgeRecord::new(1, 2, 50, EdgeProps::from_slice(b"e").unwrap()).unwrap();
        roundtrip(EntryPayload::EdgeInsert(edge));
    }

    #[test]
    fn test_embedding_roundtrip_preserves_bits() {
        let rec = EmbeddingRecord::new(9, vec![1.0, -0.5, f32::MIN_POSITIVE, 0.0]).unwrap();
        roundtrip(EntryPayload::EmbeddingInsert(rec));
    }

    #[test]
    fn test_delete_and_txn_payloads() {
        roundtrip(EntryPayload::NodeDelete(11));
        roundtrip(EntryPayload::EdgeDelete(EdgeKey {
            from: 1,
            to: 2,
            label: 3,
        }));
        roundtrip(EntryPayload::EmbeddingDelete(4));
        roundtrip(EntryPayload::TxnBegin(100));
        roundtrip(EntryPayload::TxnCommit(100));
        roundtrip(EntryPayload::TxnAbort(100));
        roundtrip(EntryPayload::Checkpoint(2500));
        roundtrip(EntryPayload::SegmentRotate);
    }

    #[test]
    fn test_header_size_constant() {
        let entry = WalEntry::new(1, 0, EntryPayload::SegmentRotate);
        assert_eq!(entry.to_bytes().len(), ENTRY_HEADER_SIZE);
    }

    #[test]
    fn test_crc_detects_payload_corruption() {
        let node = NodeRecord::new(7, 3, NodeProps::empty()).unwrap();
        let mut bytes = WalEntry::new(1, 0, EntryPayload::NodeInsert(node)).to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            WalEntry::from_bytes(&bytes),
            Err(Error::CorruptedData(_))
        ));
    }

    #[test]
    fn test_crc_detects_header_corruption() {
        let mut bytes = WalEntry::new(1, 0, EntryPayload::NodeDelete(5)).to_bytes();
        bytes[6] ^= 0x01; // inside lsn
        assert!(matches!(
            WalEntry::from_bytes(&bytes),
            Err(Error::CorruptedData(_))
        ));
    }

    #[test]
    fn test_partial_entry_is_not_an_error() {
        let bytes = WalEntry::new(1, 0, EntryPayload::NodeDelete(5)).to_bytes();
        assert!(WalEntry::from_bytes(&bytes[..10]).unwrap().is_none());
        assert!(WalEntry::from_bytes(&bytes[..bytes.len() - 1])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut bytes = WalEntry::new(1, 0, EntryPayload::NodeDelete(5)).to_bytes();
        bytes[0] = 99;
        // CRC no longer matches either way; rewrite it so the kind check
        // is what trips.
        let size = bytes.len() as u32;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[99]);
        hasher.update(&size.to_le_bytes());
        hasher.update(&bytes[5..21]);
        hasher.update(&bytes[25..]);
        let crc = hasher.finalize();
        bytes[21..25].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            WalEntry::from_bytes(&bytes),
            Err(Error::CorruptedData(_))
        ));
    }

    #[test]
    fn test_multiple_entries_in_sequence() {
        let entries = vec![
            WalEntry::new(1, 10, EntryPayload::NodeDelete(1)),
            WalEntry::new(2, 20, EntryPayload::TxnBegin(9)),
            WalEntry::new(3, 30, EntryPayload::Checkpoint(3)),
        ];
        let mut all = Vec::new();
        for e in &entries {
            all.extend_from_slice(&e.to_bytes());
        }
        let mut offset = 0;
        for expected in &entries {
            let (parsed, consumed) = WalEntry::from_bytes(&all[offset..]).unwrap().unwrap();
            assert_eq!(&parsed, expected);
            offset += consumed;
        }
        assert_eq!(offset, all.len());
    }
}
