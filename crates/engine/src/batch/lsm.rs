//! Server-side LSM leveling of applied batches
//!
//! Flushed batches land in L0; when a level outgrows its capacity it is
//! merged into the next (each level twice the size of the one above),
//! keeping only the last-seen version per entity. This bounds how much
//! history a checkpoint or re-application has to walk; it never changes
//! the externally observable store state, which was already mutated when
//! the batch flushed.

use nendb_concurrency::Operation;
use rustc_hash::FxHashMap;

/// Leveled history of applied operations.
#[derive(Debug)]
pub struct LsmLevels {
    levels: Vec<Vec<Operation>>,
    threshold: usize,
    compactions: u64,
}

impl LsmLevels {
    /// `level_count` levels; L0 holds `threshold` ops, each level below
    /// doubles.
    pub fn new(threshold: usize, level_count: usize) -> Self {
        LsmLevels {
            levels: vec![Vec::new(); level_count.max(1)],
            threshold: threshold.max(1),
            compactions: 0,
        }
    }

    fn capacity(&self, level: usize) -> usize {
        self.threshold << level
    }

    /// Absorb one applied batch into L0 and cascade compactions.
    pub fn absorb(&mut self, batch: Vec<Operation>) {
        self.levels[0].extend(batch);
        for level in 0..self.levels.len() {
            if self.levels[level].len() <= self.capacity(level) {
                break;
            }
            let overflow = std::mem::take(&mut self.levels[level]);
            if level + 1 < self.levels.len() {
                let mut merged = std::mem::take(&mut self.levels[level + 1]);
                merged.extend(overflow);
                self.levels[level + 1] = Self::merge(merged);
            } else {
                // Bottom level merges in place.
                self.levels[level] = Self::merge(overflow);
            }
            self.compactions += 1;
        }
    }

    /// Last-writer-wins merge by entity id, preserving first-seen order.
    fn merge(ops: Vec<Operation>) -> Vec<Operation> {
        let mut position: FxHashMap<(u8, u64), usize> = FxHashMap::default();
        let mut out: Vec<Option<Operation>> = Vec::with_capacity(ops.len());
        for op in ops {
            // Nodes, edges and embeddings live in distinct id spaces;
            // group by (entity family, id).
            let family = match op.op_class() {
                0..=2 => 0u8,
                3..=5 => 1,
                _ => 2,
            };
            let key = (family, op.entity_id());
            match position.get(&key) {
                Some(&i) => out[i] = Some(op),
                None => {
                    position.insert(key, out.len());
                    out.push(Some(op));
                }
            }
        }
        out.into_iter().flatten().collect()
    }

    /// Operations resident across every level.
    pub fn resident_ops(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Compactions performed since open.
    pub fn compactions(&self) -> u64 {
        self.compactions
    }

    /// Occupancy per level, top first (test support).
    pub fn occupancy(&self) -> Vec<usize> {
        self.levels.iter().map(Vec::len).collect()
    }
}
