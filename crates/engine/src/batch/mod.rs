//! Client-side batch accumulation
//!
//! Mutations queue here when batching is enabled and flush as one atomic
//! group: the flush takes the write lock, frames the operations between
//! `txn_begin` and `txn_commit` in the WAL, applies them to memory, and
//! rolls the whole group back (undo + `txn_abort`) if any single
//! application fails. The server-side LSM leveling lives in [`lsm`].

pub mod lsm;

use crate::config::BatchSection;
use nendb_concurrency::Operation;
use std::time::Instant;

/// Adaptive flush target: a flush slower than this shrinks the
/// threshold, faster grows it.
const ADAPTIVE_TARGET_MICROS: f64 = 1000.0;

/// Smallest threshold the adaptive policy will shrink to.
const ADAPTIVE_FLOOR: usize = 64;

/// The in-memory operation queue.
#[derive(Debug)]
pub struct BatchQueue {
    config: BatchSection,
    ops: Vec<Operation>,
    opened_at: Option<Instant>,
    /// Current size-based flush threshold (moves when adaptive)
    threshold: usize,
    avg_flush_micros: f64,
    pub(crate) batches_flushed: u64,
    pub(crate) ops_flushed: u64,
}

impl BatchQueue {
    /// Empty queue with the section's knobs.
    pub fn new(config: BatchSection) -> Self {
        let threshold = config.auto_flush_threshold;
        BatchQueue {
            config,
            ops: Vec::new(),
            opened_at: None,
            threshold,
            avg_flush_micros: 0.0,
            batches_flushed: 0,
            ops_flushed: 0,
        }
    }

    /// Operations waiting to flush.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the queue holds nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.ops.len() >= self.config.max_batch_size
    }

    /// Queue one operation. The caller checks [`BatchQueue::is_full`]
    /// first and either flushes or reports overflow.
    pub fn push(&mut self, op: Operation) {
        debug_assert!(!self.is_full());
        if self.ops.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.ops.push(op);
    }

    /// Whether the size threshold or the wait deadline has been reached.
    pub fn should_flush(&self) -> bool {
        if self.ops.is_empty() {
            return false;
        }
        if self.ops.len() >= self.threshold {
            return true;
        }
        self.opened_at
            .map(|t| t.elapsed().as_millis() as u64 >= self.config.max_batch_wait_ms)
            .unwrap_or(false)
    }

    /// Take everything queued, split into sub-batches.
    ///
    /// With homogeneous batching on, operations are partitioned by op
    /// class (stable within each class) so each sub-batch drives one code
    /// path; order across classes follows first appearance.
    pub fn take(&mut self) -> Vec<Vec<Operation>> {
        self.opened_at = None;
        let ops = std::mem::take(&mut self.ops);
        if ops.is_empty() {
            return Vec::new();
        }
        if !self.config.enable_homogeneous_batching {
            return vec![ops];
        }
        let mut order: Vec<u8> = Vec::new();
        let mut buckets: Vec<Vec<Operation>> = Vec::new();
        for op in ops {
            let class = op.op_class();
            match order.iter().position(|&c| c == class) {
                Some(i) => buckets[i].push(op),
                None => {
                    order.push(class);
                    buckets.push(vec![op]);
                }
            }
        }
        buckets
    }

    /// Feed a flush duration into the adaptive threshold.
    pub fn record_flush(&mut self, ops: usize, micros: u64) {
        self.batches_flushed += 1;
        self.ops_flushed += ops as u64;
        if !self.config.enable_adaptive_batching {
            return;
        }
        // Exponential moving average, quarter weight to the new sample.
        self.avg_flush_micros = if self.avg_flush_micros == 0.0 {
            micros as f64
        } else {
            self.avg_flush_micros * 0.75 + micros as f64 * 0.25
        };
        if self.avg_flush_micros > ADAPTIVE_TARGET_MICROS {
            self.threshold = (self.threshold * 3 / 4).max(ADAPTIVE_FLOOR);
        } else {
            self.threshold = (self.threshold + self.threshold / 4)
                .min(self.config.auto_flush_threshold.max(ADAPTIVE_FLOOR));
        }
    }

    /// Current size-based flush threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
