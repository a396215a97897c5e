//! Error types for the NenDB storage core
//!
//! This module defines the unified error type used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! ## Error Categories
//!
//! - **Capacity**: a pre-allocated pool is full
//! - **Identity**: duplicate or unknown node/edge identities
//! - **Durability**: WAL corruption or filesystem failures
//! - **Concurrency**: lock timeouts and deadlock avoidance rejections
//! - **Lifecycle**: operations against a closed or degraded database
//!
//! Recoverable failures (a single corrupt WAL entry, a dead peer in the
//! participant table) are handled locally and counted; fatal failures are
//! surfaced to the caller.

use crate::types::{EdgeKey, NodeId, PoolKind};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Result type alias for NenDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the NenDB storage core
#[derive(Debug, Error)]
pub enum Error {
    /// A pool reached its configured capacity
    #[error("{kind} pool exhausted: capacity {capacity} reached")]
    PoolExhausted {
        /// Which pool is full
        kind: PoolKind,
        /// Configured capacity of the pool
        capacity: u32,
    },

    /// A node with this id is already live
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),

    /// An edge with this (from, to, label) triple is already live
    #[error("duplicate edge {0}")]
    DuplicateEdge(EdgeKey),

    /// No live node with this id
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// No live edge with this identity
    #[error("edge {0} not found")]
    EdgeNotFound(EdgeKey),

    /// Identity is reserved, out of range, or refers to a freed slot
    #[error("invalid id: {0}")]
    InvalidId(u64),

    /// Initialisation parameters are contradictory
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A property blob exceeds its fixed maximum size
    #[error("property blob of {len} bytes exceeds maximum {max}")]
    PropsTooLarge {
        /// Provided blob length
        len: usize,
        /// Fixed maximum for this entity kind
        max: usize,
    },

    /// An embedding vector does not match the configured dimension
    #[error("embedding dimension {actual} does not match configured {expected}")]
    DimensionMismatch {
        /// Configured dimension
        expected: u32,
        /// Dimension of the supplied vector
        actual: u32,
    },

    /// WAL magic or CRC mismatch; surfaces during replay
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A blocking acquisition expired
    #[error("lock acquisition timed out after {waited_ms}ms")]
    LockTimeout {
        /// How long the caller waited before giving up
        waited_ms: u64,
    },

    /// Acquiring this lock would violate the global lock order
    #[error("deadlock potential: lock {requested} requested while holding {held}")]
    DeadlockPotential {
        /// Ordinal of the requested lock
        requested: u64,
        /// Highest ordinal currently held by this thread
        held: u64,
    },

    /// Batch queue is full under a non-blocking configuration
    #[error("batch queue overflow: {queued} operations pending")]
    QueueOverflow {
        /// Operations already queued
        queued: usize,
    },

    /// Operation on a shut-down database
    #[error("database is closed")]
    Closed,

    /// Operation on a committed or aborted transaction
    #[error("transaction {0} is no longer active")]
    TransactionInactive(u64),

    /// A fatal failure left the store degraded; writes blocked until repair
    #[error("database is degraded: {0}")]
    Degraded(String),
}

impl Error {
    /// Check if this error indicates a transient condition worth retrying.
    ///
    /// Lock timeouts and queue overflows clear on their own; everything
    /// else requires caller intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::LockTimeout { .. } | Error::QueueOverflow { .. }
        )
    }

    /// Check if this error was caused by on-disk corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptedData(_))
    }

    /// The counter bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            Error::DuplicateNode(_) => ErrorKind::DuplicateNode,
            Error::DuplicateEdge(_) => ErrorKind::DuplicateEdge,
            Error::NodeNotFound(_) => ErrorKind::NodeNotFound,
            Error::EdgeNotFound(_) => ErrorKind::EdgeNotFound,
            Error::InvalidId(_) => ErrorKind::InvalidId,
            Error::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Error::PropsTooLarge { .. } | Error::DimensionMismatch { .. } => {
                ErrorKind::InvalidConfiguration
            }
            Error::CorruptedData(_) => ErrorKind::CorruptedData,
            Error::Io(_) => ErrorKind::Io,
            Error::LockTimeout { .. } => ErrorKind::LockTimeout,
            Error::DeadlockPotential { .. } => ErrorKind::DeadlockPotential,
            Error::QueueOverflow { .. } => ErrorKind::QueueOverflow,
            Error::Closed | Error::TransactionInactive(_) => ErrorKind::Closed,
            Error::Degraded(_) => ErrorKind::Degraded,
        }
    }
}

/// Coarse error classification used for per-kind statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ErrorKind {
    /// Capacity reached
    PoolExhausted = 0,
    /// Node identity already live
    DuplicateNode,
    /// Edge identity already live
    DuplicateEdge,
    /// Unknown node
    NodeNotFound,
    /// Unknown edge
    EdgeNotFound,
    /// Reserved or out-of-range identity
    InvalidId,
    /// Contradictory parameters
    InvalidConfiguration,
    /// Magic/CRC mismatch
    CorruptedData,
    /// Filesystem failure
    Io,
    /// Acquisition expired
    LockTimeout,
    /// Lock order violation
    DeadlockPotential,
    /// Batch queue full
    QueueOverflow,
    /// Database shut down
    Closed,
    /// Degraded flag set
    Degraded,
}

const ERROR_KIND_COUNT: usize = 14;

const ERROR_KIND_NAMES: [&str; ERROR_KIND_COUNT] = [
    "pool_exhausted",
    "duplicate_node",
    "duplicate_edge",
    "node_not_found",
    "edge_not_found",
    "invalid_id",
    "invalid_configuration",
    "corrupted_data",
    "io",
    "lock_timeout",
    "deadlock_potential",
    "queue_overflow",
    "closed",
    "degraded",
];

/// Per-kind error counters, updated lock-free.
///
/// Statistics expose one monotonic counter per [`ErrorKind`]. Recording is
/// `Relaxed`: counts feed dashboards, not control flow.
#[derive(Debug, Default)]
pub struct ErrorCounters {
    counts: [AtomicU64; ERROR_KIND_COUNT],
}

impl ErrorCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of the error's kind.
    pub fn record(&self, error: &Error) {
        self.counts[error.kind() as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Current count for a kind.
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counts[kind as usize].load(Ordering::Relaxed)
    }

    /// Snapshot all non-zero counters as `(name, count)` pairs.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        self.counts
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let n = c.load(Ordering::Relaxed);
                (n > 0).then(|| (ERROR_KIND_NAMES[i], n))
            })
            .collect()
    }
}
