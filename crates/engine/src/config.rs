//! Database configuration via `nendb.toml`
//!
//! A config file lives in the data directory. On first open a commented
//! default `nendb.toml` is created; to change settings, edit the file and
//! reopen. Explicit configs can also be passed programmatically through
//! [`crate::Database::open_with_config`]. No environment variables are
//! consulted.

use nendb_core::limits::{
    DEFAULT_AUTO_FLUSH_THRESHOLD, DEFAULT_COMPACTION_THRESHOLD, DEFAULT_EMBEDDING_DIM,
    DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_LSM_LEVELS, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_MAX_BATCH_WAIT_MS, DEFAULT_SEQLOCK_MAX_RETRIES, HEARTBEAT_TIMEOUT_MS,
};
use nendb_core::{Error, PoolCapacities, Result};
use nendb_durability::WalConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "nendb.toml";

/// Pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolsConfig {
    /// Node slots (fixed at open)
    pub nodes: u32,
    /// Edge slots
    pub edges: u32,
    /// Embedding slots
    pub embeddings: u32,
    /// Embedding vector dimension
    pub embedding_dim: u32,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        let caps = PoolCapacities::default();
        PoolsConfig {
            nodes: caps.nodes,
            edges: caps.edges,
            embeddings: caps.embeddings,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

/// WAL sizing and sync policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalSection {
    /// Segment byte limit
    pub segment_size: u64,
    /// Segment entry limit
    pub entries_per_segment: u32,
    /// Write buffer bytes (min 64 KiB)
    pub buffer_size: usize,
    /// fsync every N entries
    pub sync_interval_ops: u32,
    /// fsync every M buffered bytes
    pub sync_interval_bytes: u64,
}

impl Default for WalSection {
    fn default() -> Self {
        let wal = WalConfig::default();
        WalSection {
            segment_size: wal.segment_size,
            entries_per_segment: wal.entries_per_segment,
            buffer_size: wal.buffer_size,
            sync_interval_ops: wal.sync_interval_ops,
            sync_interval_bytes: wal.sync_interval_bytes,
        }
    }
}

/// Client-side batching and server-side LSM knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchSection {
    /// Queue capacity
    pub max_batch_size: usize,
    /// Auto-flush deadline in milliseconds
    pub max_batch_wait_ms: u64,
    /// Size-based auto-flush threshold
    pub auto_flush_threshold: usize,
    /// Split flushes into per-op-type sub-batches
    pub enable_homogeneous_batching: bool,
    /// Move the flush threshold with observed flush times
    pub enable_adaptive_batching: bool,
    /// Full queue flushes synchronously instead of failing
    pub overflow_flushes_synchronously: bool,
    /// L0 compaction threshold in operations
    pub compaction_threshold: usize,
    /// Number of LSM levels
    pub lsm_levels: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        BatchSection {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_wait_ms: DEFAULT_MAX_BATCH_WAIT_MS,
            auto_flush_threshold: DEFAULT_AUTO_FLUSH_THRESHOLD,
            enable_homogeneous_batching: true,
            enable_adaptive_batching: false,
            overflow_flushes_synchronously: true,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            lsm_levels: DEFAULT_LSM_LEVELS,
        }
    }
}

/// Database configuration loaded from `nendb.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NendbConfig {
    /// Append to the WAL before every memory mutation
    pub enable_wal: bool,
    /// Route mutations through the client-side batch queue
    pub enable_batching: bool,
    /// Take the advisory file lock around mutations
    pub enable_file_locking: bool,
    /// Join the shared-memory participant table
    pub enable_shared_memory: bool,
    /// Buffered sync policy; off means fsync on every append
    pub enable_production_wal: bool,
    /// Optimistic read retry bound before the rwlock fallback
    pub seqlock_max_retries: u32,
    /// Lock acquisition timeout in milliseconds
    pub lock_timeout_ms: u64,
    /// Participant heartbeat staleness threshold in milliseconds
    pub heartbeat_timeout_ms: i64,
    /// Pool sizing
    pub pools: PoolsConfig,
    /// WAL knobs
    pub wal: WalSection,
    /// Batch knobs
    pub batch: BatchSection,
}

impl Default for NendbConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl NendbConfig {
    /// The documented defaults: WAL on, batching off, single-process.
    pub fn defaults() -> Self {
        NendbConfig {
            enable_wal: true,
            enable_batching: false,
            enable_file_locking: false,
            enable_shared_memory: false,
            enable_production_wal: true,
            seqlock_max_retries: DEFAULT_SEQLOCK_MAX_RETRIES,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            heartbeat_timeout_ms: HEARTBEAT_TIMEOUT_MS,
            pools: PoolsConfig::default(),
            wal: WalSection::default(),
            batch: BatchSection::default(),
        }
    }

    /// Small capacities and aggressive rotation for tests.
    pub fn for_testing() -> Self {
        let mut config = Self::defaults();
        config.pools = PoolsConfig {
            nodes: 64,
            edges: 128,
            embeddings: 16,
            embedding_dim: 4,
        };
        config.wal.segment_size = 64 * 1024;
        config.wal.entries_per_segment = 32;
        config
    }

    /// Pool capacities view.
    pub fn pool_capacities(&self) -> PoolCapacities {
        PoolCapacities {
            nodes: self.pools.nodes,
            edges: self.pools.edges,
            embeddings: self.pools.embeddings,
        }
    }

    /// WAL config view.
    ///
    /// With `enable_production_wal` off, the sync policy degenerates to
    /// an fsync after every append.
    pub fn wal_config(&self) -> WalConfig {
        let mut wal = WalConfig {
            segment_size: self.wal.segment_size,
            entries_per_segment: self.wal.entries_per_segment,
            buffer_size: self.wal.buffer_size,
            sync_interval_ops: self.wal.sync_interval_ops,
            sync_interval_bytes: self.wal.sync_interval_bytes,
        };
        if !self.enable_production_wal {
            wal.sync_interval_ops = 1;
        }
        wal
    }

    /// Check the whole config for contradictions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] naming the first problem.
    pub fn validate(&self) -> Result<()> {
        if !self.pool_capacities().is_valid() {
            return Err(Error::InvalidConfiguration(
                "pool capacities must all be non-zero".into(),
            ));
        }
        if self.pools.embedding_dim == 0 {
            return Err(Error::InvalidConfiguration(
                "embedding_dim must be non-zero".into(),
            ));
        }
        if self.enable_wal {
            self.wal_config().validate()?;
        }
        if self.batch.max_batch_size == 0 || self.batch.auto_flush_threshold == 0 {
            return Err(Error::InvalidConfiguration(
                "batch sizes must be non-zero".into(),
            ));
        }
        if self.batch.auto_flush_threshold > self.batch.max_batch_size {
            return Err(Error::InvalidConfiguration(
                "auto_flush_threshold cannot exceed max_batch_size".into(),
            ));
        }
        if self.batch.lsm_levels == 0 || self.batch.compaction_threshold == 0 {
            return Err(Error::InvalidConfiguration(
                "LSM levels and compaction threshold must be non-zero".into(),
            ));
        }
        if self.seqlock_max_retries == 0 || self.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "retry and timeout knobs must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// The default config file content, commented.
    pub fn default_toml() -> &'static str {
        r#"# NenDB database configuration
#
# Feature toggles. WAL durability is on by default; multi-process
# coordination is opt-in.
enable_wal = true
enable_batching = false
enable_file_locking = false
enable_shared_memory = false
# Buffered WAL sync policy. Off = fsync after every append.
enable_production_wal = true

# Optimistic reads retry this many times before taking the rwlock.
seqlock_max_retries = 10
# Every blocking acquisition gives up after this many milliseconds.
lock_timeout_ms = 5000
# Participant table entries older than this are reclaimed.
heartbeat_timeout_ms = 5000

[pools]
# Slot counts are fixed at open; the pools never grow.
nodes = 4096
edges = 16384
embeddings = 1024
embedding_dim = 256

[wal]
segment_size = 67108864        # 64 MiB
entries_per_segment = 10000
buffer_size = 131072           # 128 KiB
sync_interval_ops = 1000
sync_interval_bytes = 65536

[batch]
max_batch_size = 8192
max_batch_wait_ms = 50
auto_flush_threshold = 4096
enable_homogeneous_batching = true
enable_adaptive_batching = false
overflow_flushes_synchronously = true
compaction_threshold = 1024
lsm_levels = 4
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NendbConfig = toml::from_str(&content).map_err(|e| {
            Error::InvalidConfiguration(format!(
                "failed to parse '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config and write it to `path`.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            Error::InvalidConfiguration(format!("failed to serialize config: {e}"))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
