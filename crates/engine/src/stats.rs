//! Aggregated database statistics

use nendb_concurrency::{RwLockMetrics, SeqlockMetrics};
use nendb_durability::WalCounters;
use nendb_storage::MemoryStats;

/// Combined lock activity across the concurrency layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockMetrics {
    /// Successful shared acquisitions of the store lock
    pub read_acquisitions: u64,
    /// Successful exclusive acquisitions of the store lock
    pub write_acquisitions: u64,
    /// Acquisitions that hit their timeout
    pub lock_timeouts: u64,
    /// Seqlock read retries
    pub seqlock_retries: u64,
    /// Seqlock reads that saturated and fell back to the rwlock
    pub seqlock_fallbacks: u64,
    /// Acquisitions rejected by deadlock avoidance
    pub deadlocks_avoided: u64,
}

impl LockMetrics {
    pub(crate) fn combine(
        rwlock: RwLockMetrics,
        seqlock: SeqlockMetrics,
        deadlocks_avoided: u64,
    ) -> Self {
        LockMetrics {
            read_acquisitions: rwlock.read_acquisitions,
            write_acquisitions: rwlock.write_acquisitions,
            lock_timeouts: rwlock.timeouts,
            seqlock_retries: seqlock.retries,
            seqlock_fallbacks: seqlock.fallbacks,
            deadlocks_avoided,
        }
    }
}

/// Batch-processor activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Operations currently queued client-side
    pub queued: usize,
    /// Batches flushed
    pub batches_flushed: u64,
    /// Operations applied through batches
    pub ops_flushed: u64,
    /// LSM compactions performed
    pub compactions: u64,
    /// Operations resident across LSM levels after merging
    pub lsm_resident_ops: usize,
}

/// The `get_stats()` snapshot.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Live node count
    pub nodes: u64,
    /// Live edge count
    pub edges: u64,
    /// Live embedding count
    pub embeddings: u64,
    /// Pool fill ratios
    pub memory: MemoryStats,
    /// Lock activity
    pub lock_metrics: LockMetrics,
    /// WAL writer counters (`None` with durability disabled)
    pub wal: Option<WalCounters>,
    /// Batch activity
    pub batch: BatchStats,
    /// Non-zero per-kind error counts
    pub error_counts: Vec<(&'static str, u64)>,
    /// Entries that replay could not satisfy at the last open
    pub replay_errors: u64,
    /// Whether a fatal failure has the store degraded
    pub degraded: bool,
}
