//! Atomic counters and id generation

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event counter.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Start at `initial`.
    pub fn new(initial: u64) -> Self {
        AtomicCounter {
            value: AtomicU64::new(initial),
        }
    }

    /// Add one, returning the previous value.
    #[inline]
    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }

    /// Add `delta`, returning the previous value.
    #[inline]
    pub fn add(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, Ordering::Relaxed)
    }

    /// Current value.
    #[inline]
    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Monotonic id generator.
///
/// Ids start at 1 (0 is reserved across the system) and never wrap; the
/// generator lives as long as the process.
#[derive(Debug, Default)]
pub struct AtomicIdGenerator {
    last: AtomicU64,
}

impl AtomicIdGenerator {
    /// Generator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator whose first id is `floor + 1`.
    ///
    /// Used after recovery so fresh ids never collide with replayed ones.
    pub fn starting_after(floor: u64) -> Self {
        AtomicIdGenerator {
            last: AtomicU64::new(floor),
        }
    }

    /// Allocate the next id.
    ///
    /// # Panics
    ///
    /// Panics if the counter reaches `u64::MAX` (overflow).
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .expect("id generator overflow: u64::MAX reached")
            + 1
    }

    /// Raise the floor so subsequent ids exceed `floor`.
    pub fn observe(&self, floor: u64) {
        self.last.fetch_max(floor, Ordering::SeqCst);
    }

    /// Last id handed out (0 if none).
    pub fn last_id(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_counter_increment_returns_previous() {
        let c = AtomicCounter::new(10);
        assert_eq!(c.increment(), 10);
        assert_eq!(c.increment(), 11);
        assert_eq!(c.load(), 12);
    }

    #[test]
    fn test_id_generator_starts_at_one() {
        let gen = AtomicIdGenerator::new();
        assert_eq!(gen.next_id(), 1);
        assert_eq!(gen.next_id(), 2);
        assert_eq!(gen.last_id(), 2);
    }

    #[test]
    fn test_id_generator_observe_floor() {
        let gen = AtomicIdGenerator::new();
        gen.observe(100);
        assert_eq!(gen.next_id(), 101);
        // Lower floors never move the counter backwards.
        gen.observe(5);
        assert_eq!(gen.next_id(), 102);
    }

    #[test]
    fn test_concurrent_ids_are_unique_and_dense() {
        let gen = Arc::new(AtomicIdGenerator::new());
        let threads = 8;
        let per_thread = 1000;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let gen = Arc::clone(&gen);
                std::thread::spawn(move || {
                    (0..per_thread).map(|_| gen.next_id()).collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "id {id} handed out twice");
            }
        }
        let expected: HashSet<u64> = (1..=(threads * per_thread) as u64).collect();
        assert_eq!(all, expected);
    }
}
