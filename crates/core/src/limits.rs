//! Capacity and size constants
//!
//! Pools are sized once at open time and never grown. The defaults here
//! are the documented baseline; databases override them through
//! configuration at open.

/// Default node pool capacity.
pub const DEFAULT_NODE_CAPACITY: u32 = 4096;

/// Default edge pool capacity.
pub const DEFAULT_EDGE_CAPACITY: u32 = 16_384;

/// Default embedding pool capacity.
pub const DEFAULT_EMBEDDING_CAPACITY: u32 = 1024;

/// Default embedding vector dimension.
pub const DEFAULT_EMBEDDING_DIM: u32 = 256;

/// Maximum node property blob size in bytes.
pub const MAX_NODE_PROPS: usize = 128;

/// Maximum edge property blob size in bytes.
pub const MAX_EDGE_PROPS: usize = 64;

/// Default maximum WAL segment size in bytes (64 MiB).
pub const DEFAULT_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Default maximum entries per WAL segment.
pub const DEFAULT_ENTRIES_PER_SEGMENT: u32 = 10_000;

/// WAL write buffer size in bytes. Must be at least [`MIN_WAL_BUFFER`].
pub const DEFAULT_WAL_BUFFER: usize = 128 * 1024;

/// Lower bound on the WAL write buffer.
pub const MIN_WAL_BUFFER: usize = 64 * 1024;

/// Sync policy: flush + fsync after this many appended entries.
pub const DEFAULT_SYNC_INTERVAL_OPS: u32 = 1000;

/// Sync policy: flush + fsync after this many buffered bytes.
pub const DEFAULT_SYNC_INTERVAL_BYTES: u64 = 64 * 1024;

/// Bounded seqlock read retries before falling back to the rwlock.
pub const DEFAULT_SEQLOCK_MAX_RETRIES: u32 = 10;

/// Default lock acquisition timeout in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Participant heartbeat staleness threshold in milliseconds.
pub const HEARTBEAT_TIMEOUT_MS: i64 = 5000;

/// Fixed participant table size.
pub const PARTICIPANT_SLOTS: usize = 32;

/// Default client-side batch queue capacity.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 8192;

/// Default auto-flush deadline in milliseconds.
pub const DEFAULT_MAX_BATCH_WAIT_MS: u64 = 50;

/// Default size-based auto-flush threshold.
pub const DEFAULT_AUTO_FLUSH_THRESHOLD: usize = 4096;

/// Default L0 compaction threshold in operations.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 1024;

/// Default number of LSM levels.
pub const DEFAULT_LSM_LEVELS: usize = 4;

/// Pool capacities fixed at database open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCapacities {
    /// Node slots
    pub nodes: u32,
    /// Edge slots
    pub edges: u32,
    /// Embedding slots
    pub embeddings: u32,
}

impl Default for PoolCapacities {
    fn default() -> Self {
        PoolCapacities {
            nodes: DEFAULT_NODE_CAPACITY,
            edges: DEFAULT_EDGE_CAPACITY,
            embeddings: DEFAULT_EMBEDDING_CAPACITY,
        }
    }
}

impl PoolCapacities {
    /// Small capacities for tests that exercise exhaustion paths.
    pub fn for_testing() -> Self {
        PoolCapacities {
            nodes: 16,
            edges: 32,
            embeddings: 8,
        }
    }

    /// Check that every capacity is non-zero.
    pub fn is_valid(&self) -> bool {
        self.nodes > 0 && self.edges > 0 && self.embeddings > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacities_match_documented_baseline() {
        let caps = PoolCapacities::default();
        assert_eq!(caps.nodes, 4096);
        assert_eq!(caps.edges, 16_384);
        assert_eq!(caps.embeddings, 1024);
        assert!(caps.is_valid());
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let caps = PoolCapacities {
            nodes: 0,
            ..Default::default()
        };
        assert!(!caps.is_valid());
    }

    #[test]
    fn wal_buffer_meets_minimum() {
        assert!(DEFAULT_WAL_BUFFER >= MIN_WAL_BUFFER);
    }
}
