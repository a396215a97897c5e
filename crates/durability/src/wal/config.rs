//! WAL configuration

use nendb_core::limits::{
    DEFAULT_ENTRIES_PER_SEGMENT, DEFAULT_SEGMENT_SIZE, DEFAULT_SYNC_INTERVAL_BYTES,
    DEFAULT_SYNC_INTERVAL_OPS, DEFAULT_WAL_BUFFER, MIN_WAL_BUFFER,
};
use nendb_core::{Error, Result};

/// Size, rotation and sync-policy knobs for the WAL.
///
/// The sync policy fires a flush + fsync after `sync_interval_ops`
/// appended entries or `sync_interval_bytes` buffered bytes, whichever
/// comes first. `flush()` always syncs regardless of policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalConfig {
    /// Rotate when appending would push a segment past this many bytes
    pub segment_size: u64,
    /// Rotate when appending would push a segment past this many entries
    pub entries_per_segment: u32,
    /// In-memory write buffer size (≥ 64 KiB)
    pub buffer_size: usize,
    /// Sync every N appended entries
    pub sync_interval_ops: u32,
    /// Sync every M buffered bytes
    pub sync_interval_bytes: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            segment_size: DEFAULT_SEGMENT_SIZE,
            entries_per_segment: DEFAULT_ENTRIES_PER_SEGMENT,
            buffer_size: DEFAULT_WAL_BUFFER,
            sync_interval_ops: DEFAULT_SYNC_INTERVAL_OPS,
            sync_interval_bytes: DEFAULT_SYNC_INTERVAL_BYTES,
        }
    }
}

impl WalConfig {
    /// Defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Small limits for tests that exercise rotation.
    pub fn for_testing() -> Self {
        WalConfig {
            segment_size: 4 * 1024,
            entries_per_segment: 16,
            buffer_size: MIN_WAL_BUFFER,
            sync_interval_ops: 4,
            sync_interval_bytes: 1024,
        }
    }

    /// Override the segment byte limit.
    pub fn with_segment_size(mut self, bytes: u64) -> Self {
        self.segment_size = bytes;
        self
    }

    /// Override the per-segment entry limit.
    pub fn with_entries_per_segment(mut self, entries: u32) -> Self {
        self.entries_per_segment = entries;
        self
    }

    /// Override the sync policy.
    pub fn with_sync_interval(mut self, ops: u32, bytes: u64) -> Self {
        self.sync_interval_ops = ops;
        self.sync_interval_bytes = bytes;
        self
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a zero entry limit, a
    /// buffer below the minimum, or a zero sync interval.
    pub fn validate(&self) -> Result<()> {
        if self.entries_per_segment == 0 {
            return Err(Error::InvalidConfiguration(
                "entries_per_segment must be non-zero".into(),
            ));
        }
        if self.buffer_size < MIN_WAL_BUFFER {
            return Err(Error::InvalidConfiguration(format!(
                "WAL buffer of {} bytes is below the {} byte minimum",
                self.buffer_size, MIN_WAL_BUFFER
            )));
        }
        if self.sync_interval_ops == 0 || self.sync_interval_bytes == 0 {
            return Err(Error::InvalidConfiguration(
                "sync intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(WalConfig::default().validate().is_ok());
    }

    #[test]
    fn undersized_buffer_rejected() {
        let config = WalConfig {
            buffer_size: 1024,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_entry_limit_rejected() {
        let config = WalConfig::default().with_entries_per_segment(0);
        assert!(config.validate().is_err());
    }
}
