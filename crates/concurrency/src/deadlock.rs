//! Deadlock avoidance
//!
//! Two mechanisms, both cheap:
//!
//! 1. A global lock order. Every lock carries an ordinal; a thread may
//!    only acquire ordinals above everything it already holds. Violations
//!    are rejected up front with [`Error::DeadlockPotential`]. Multi-entity
//!    operations sort their targets (edge insert locks `min(from, to)`
//!    first) so they always comply.
//! 2. A wait-for relation. While a thread blocks on a lock, the edge
//!    `waiter → holders` is published; a cycle in that relation would
//!    mean mutual waiting, and the acquisition is rejected instead.

use dashmap::DashMap;
use nendb_core::{Error, Result};
use smallvec::SmallVec;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

fn current_thread_key() -> u64 {
    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}

/// Process-wide deadlock avoidance state.
#[derive(Debug, Default)]
pub struct DeadlockDetector {
    /// Lock ordinals held, per thread
    held: DashMap<u64, SmallVec<[u64; 8]>>,
    /// Lock ordinal each blocked thread is waiting for
    waiting: DashMap<u64, u64>,
    /// Threads currently holding each lock ordinal
    holders: DashMap<u64, SmallVec<[u64; 4]>>,
    avoided: AtomicU64,
}

impl DeadlockDetector {
    /// Fresh detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce intent to acquire `lock_id` on this thread.
    ///
    /// Checks the global order (no held ordinal may exceed `lock_id`) and
    /// walks the wait-for relation for a cycle. On success the caller may
    /// block on the lock; it must then call [`DeadlockDetector::acquired`]
    /// or [`DeadlockDetector::cancel_wait`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeadlockPotential`] when either check fails.
    pub fn check_acquire(&self, lock_id: u64) -> Result<()> {
        let thread = current_thread_key();
        if let Some(held) = self.held.get(&thread) {
            if let Some(&max_held) = held.iter().max() {
                if max_held > lock_id {
                    self.avoided.fetch_add(1, Ordering::Relaxed);
                    return Err(Error::DeadlockPotential {
                        requested: lock_id,
                        held: max_held,
                    });
                }
            }
        }
        if self.would_cycle(thread, lock_id) {
            self.avoided.fetch_add(1, Ordering::Relaxed);
            let max_held = self
                .held
                .get(&thread)
                .and_then(|h| h.iter().max().copied())
                .unwrap_or(0);
            return Err(Error::DeadlockPotential {
                requested: lock_id,
                held: max_held,
            });
        }
        self.waiting.insert(thread, lock_id);
        Ok(())
    }

    /// The wait succeeded; record this thread as a holder.
    pub fn acquired(&self, lock_id: u64) {
        let thread = current_thread_key();
        self.waiting.remove(&thread);
        self.held.entry(thread).or_default().push(lock_id);
        self.holders.entry(lock_id).or_default().push(thread);
    }

    /// The wait was abandoned (timeout or error).
    pub fn cancel_wait(&self) {
        self.waiting.remove(&current_thread_key());
    }

    /// Release a held lock on this thread.
    pub fn released(&self, lock_id: u64) {
        let thread = current_thread_key();
        if let Some(mut held) = self.held.get_mut(&thread) {
            if let Some(pos) = held.iter().position(|&l| l == lock_id) {
                held.swap_remove(pos);
            }
        }
        if let Some(mut holders) = self.holders.get_mut(&lock_id) {
            if let Some(pos) = holders.iter().position(|&t| t == thread) {
                holders.swap_remove(pos);
            }
        }
    }

    /// Ordinals held by the current thread (test support).
    pub fn held_by_current(&self) -> Vec<u64> {
        self.held
            .get(&current_thread_key())
            .map(|h| h.to_vec())
            .unwrap_or_default()
    }

    /// How many acquisitions were rejected.
    pub fn avoided_count(&self) -> u64 {
        self.avoided.load(Ordering::Relaxed)
    }

    /// Would `thread` waiting on `lock_id` close a cycle in the wait-for
    /// relation?
    fn would_cycle(&self, thread: u64, lock_id: u64) -> bool {
        // DFS over: lock -> holders -> the lock each holder waits for.
        let mut stack: SmallVec<[u64; 8]> = SmallVec::new();
        let mut visited: SmallVec<[u64; 16]> = SmallVec::new();
        stack.push(lock_id);
        while let Some(lock) = stack.pop() {
            if visited.contains(&lock) {
                continue;
            }
            visited.push(lock);
            let Some(holders) = self.holders.get(&lock) else {
                continue;
            };
            for &holder in holders.iter() {
                if holder == thread {
                    return true;
                }
                if let Some(next) = self.waiting.get(&holder) {
                    stack.push(*next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_in_order_acquisition_allowed() {
        let detector = DeadlockDetector::new();
        detector.check_acquire(1).unwrap();
        detector.acquired(1);
        detector.check_acquire(2).unwrap();
        detector.acquired(2);
        assert_eq!(detector.avoided_count(), 0);

        detector.released(2);
        detector.released(1);
        assert!(detector.held_by_current().is_empty());
    }

    #[test]
    fn test_out_of_order_acquisition_rejected() {
        let detector = DeadlockDetector::new();
        detector.check_acquire(5).unwrap();
        detector.acquired(5);

        let err = detector.check_acquire(3).unwrap_err();
        assert!(matches!(
            err,
            Error::DeadlockPotential {
                requested: 3,
                held: 5
            }
        ));
        assert_eq!(detector.avoided_count(), 1);
        detector.released(5);
    }

    #[test]
    fn test_reacquire_same_ordinal_allowed() {
        // Equal ordinals model re-entrant intent on the same entity; the
        // order rule only rejects strictly higher held ordinals.
        let detector = DeadlockDetector::new();
        detector.check_acquire(4).unwrap();
        detector.acquired(4);
        assert!(detector.check_acquire(4).is_ok());
        detector.cancel_wait();
        detector.released(4);
    }

    #[test]
    fn test_release_clears_order_constraint() {
        let detector = DeadlockDetector::new();
        detector.check_acquire(9).unwrap();
        detector.acquired(9);
        detector.released(9);
        // Nothing held any more: a low ordinal is fine again.
        assert!(detector.check_acquire(1).is_ok());
        detector.cancel_wait();
    }

    #[test]
    fn test_cross_thread_cycle_detected() {
        let detector = Arc::new(DeadlockDetector::new());

        // Thread B holds lock 1 and blocks waiting for lock 2.
        let other = Arc::clone(&detector);
        let handle = std::thread::spawn(move || {
            other.check_acquire(1).unwrap();
            other.acquired(1);
            other.check_acquire(2).unwrap(); // starts waiting
            std::thread::sleep(std::time::Duration::from_millis(200));
            other.cancel_wait();
            other.released(1);
        });
        std::thread::sleep(std::time::Duration::from_millis(50));

        // This thread snatched lock 2 before B got it...
        detector.check_acquire(2).unwrap();
        detector.acquired(2);
        // ...and asking for lock 1 now would close the cycle
        // (1 is held by B, B waits on 2, 2 is held by us).
        let err = detector.check_acquire(1).unwrap_err();
        assert!(matches!(err, Error::DeadlockPotential { .. }));
        detector.released(2);
        handle.join().unwrap();
    }
}
