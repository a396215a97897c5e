//! Optimistic read validation (seqlock)
//!
//! Writers bracket every mutation with [`Seqlock::write_begin`] /
//! [`Seqlock::write_end`], taking the version counter from even to odd
//! and back. Readers snapshot the counter, attempt a non-blocking read,
//! and accept the result only if the counter is even and unchanged;
//! otherwise they retry, up to a configurable bound, and then fall back
//! to the blocking rwlock path. Retries and saturations are counted.

use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of an optimistic read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqRead<T> {
    /// A consistent snapshot
    Consistent(T),
    /// The retry bound was exhausted; take the rwlock instead
    Saturated,
}

/// Retry and saturation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeqlockMetrics {
    /// Individual read retries
    pub retries: u64,
    /// Reads that exhausted the bound and fell back
    pub fallbacks: u64,
}

/// Even/odd version counter with bounded-retry reads.
#[derive(Debug)]
pub struct Seqlock {
    version: AtomicU64,
    max_retries: u32,
    retries: AtomicU64,
    fallbacks: AtomicU64,
}

impl Seqlock {
    /// Counter at version 0 with the given retry bound (≥ 1).
    pub fn new(max_retries: u32) -> Self {
        Seqlock {
            version: AtomicU64::new(0),
            max_retries: max_retries.max(1),
            retries: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Enter a write section: version becomes odd.
    ///
    /// The caller must already hold exclusive access; this only publishes
    /// the in-progress state to optimistic readers.
    pub fn write_begin(&self) {
        let v = self.version.fetch_add(1, Ordering::AcqRel);
        debug_assert!(v % 2 == 0, "write_begin without matching write_end");
    }

    /// Leave a write section: version becomes even again.
    pub fn write_end(&self) {
        let v = self.version.fetch_add(1, Ordering::AcqRel);
        debug_assert!(v % 2 == 1, "write_end without matching write_begin");
    }

    /// Current version (even = quiescent).
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Attempt an optimistic read.
    ///
    /// `attempt` returns `None` when it could not read at all (e.g. a
    /// non-blocking lock probe failed); a `Some` result is accepted only
    /// if the version was even before and unchanged after.
    pub fn read<T>(&self, mut attempt: impl FnMut() -> Option<T>) -> SeqRead<T> {
        for _ in 0..self.max_retries {
            let before = self.version.load(Ordering::Acquire);
            if before % 2 == 1 {
                self.retries.fetch_add(1, Ordering::Relaxed);
                hint::spin_loop();
                continue;
            }
            if let Some(value) = attempt() {
                let after = self.version.load(Ordering::Acquire);
                if before == after {
                    return SeqRead::Consistent(value);
                }
            }
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        SeqRead::Saturated
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> SeqlockMetrics {
        SeqlockMetrics {
            retries: self.retries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

impl Default for Seqlock {
    fn default() -> Self {
        Self::new(nendb_core::limits::DEFAULT_SEQLOCK_MAX_RETRIES)
    }
}
