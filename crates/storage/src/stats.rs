//! Pool utilisation statistics

use crate::pool::{PoolEntity, SlotPool};

/// Utilisation of a single pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStats {
    /// Configured capacity
    pub capacity: u32,
    /// Live slots
    pub used: u32,
    /// `used / capacity`
    pub fill_ratio: f32,
}

impl PoolStats {
    /// Snapshot a pool.
    pub fn of<T: PoolEntity>(pool: &SlotPool<T>) -> Self {
        PoolStats {
            capacity: pool.capacity(),
            used: pool.len(),
            fill_ratio: pool.fill_ratio(),
        }
    }
}

/// Fill ratios for every pool in a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryStats {
    /// Node pool utilisation
    pub nodes: PoolStats,
    /// Edge pool utilisation
    pub edges: PoolStats,
    /// Embedding pool utilisation
    pub embeddings: PoolStats,
}
