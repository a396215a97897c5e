//! Open-addressed identity index for slot pools
//!
//! Maps an entity's identity hash to its slot number with linear probing
//! over a fixed table of `2·N` buckets (N = pool capacity), so the load
//! factor never exceeds 0.5 and probe chains stay short.
//!
//! The table stores only slot numbers. Key comparison and re-hashing go
//! through callbacks into the pool's slot array, so each key exists in
//! exactly one place (the slot) and every occupied slot has exactly one
//! bucket pointing at it.
//!
//! Deletion is backward-shift: after clearing a bucket, subsequent entries
//! in the probe chain are moved back if their ideal bucket permits it,
//! leaving no tombstones. A null-on-delete scheme would break lookups for
//! colliding keys that probed past the deleted bucket.

/// Fixed-size open-addressed slot index.
#[derive(Debug, Clone)]
pub struct SlotIndex {
    buckets: Vec<Option<u32>>,
}

/// splitmix64 finalizer.
///
/// Deterministic, fast, and well-distributed for sequential ids; at the
/// pool's maximum load factor of 0.5 the expected probe chain stays under
/// two buckets.
pub fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

impl SlotIndex {
    /// Create an index for a pool of `capacity` slots (`2·capacity`
    /// buckets, minimum 2).
    pub fn with_pool_capacity(capacity: u32) -> Self {
        let buckets = (capacity as usize * 2).max(2);
        SlotIndex {
            buckets: vec![None; buckets],
        }
    }

    fn ideal(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Insert a slot under `hash`.
    ///
    /// The pool guarantees `used < capacity`, so a free bucket always
    /// exists within the probe chain.
    pub fn insert(&mut self, hash: u64, slot: u32) {
        let len = self.buckets.len();
        let mut i = self.ideal(hash);
        loop {
            if self.buckets[i].is_none() {
                self.buckets[i] = Some(slot);
                return;
            }
            i = (i + 1) % len;
        }
    }

    /// Probe for a slot whose entity matches, starting at `hash`'s ideal
    /// bucket. `matches` is called with each candidate slot number.
    pub fn find(&self, hash: u64, mut matches: impl FnMut(u32) -> bool) -> Option<u32> {
        let len = self.buckets.len();
        let mut i = self.ideal(hash);
        for _ in 0..len {
            match self.buckets[i] {
                None => return None,
                Some(slot) if matches(slot) => return Some(slot),
                Some(_) => i = (i + 1) % len,
            }
        }
        None
    }

    /// Remove the bucket pointing at `slot` (probing from `hash`), then
    /// shift displaced entries back so probe chains stay intact.
    ///
    /// `hash_of` re-hashes the entity in a given slot; it is only invoked
    /// for slots still present in the table.
    ///
    /// Returns `false` if no bucket pointed at `slot`.
    pub fn remove(
        &mut self,
        hash: u64,
        slot: u32,
        mut hash_of: impl FnMut(u32) -> u64,
    ) -> bool {
        let len = self.buckets.len();
        let mut i = self.ideal(hash);
        let mut found = false;
        for _ in 0..len {
            match self.buckets[i] {
                None => return false,
                Some(s) if s == slot => {
                    found = true;
                    break;
                }
                Some(_) => i = (i + 1) % len,
            }
        }
        if !found {
            return false;
        }

        // Backward-shift: walk the chain after the hole. An entry may move
        // into the hole only if its ideal bucket is not cyclically inside
        // (hole, entry], otherwise moving it would strand later lookups.
        self.buckets[i] = None;
        let mut hole = i;
        let mut j = i;
        loop {
            j = (j + 1) % len;
            let Some(s) = self.buckets[j] else { break };
            let h = self.ideal(hash_of(s));
            let in_range = if hole <= j {
                h > hole && h <= j
            } else {
                h > hole || h <= j
            };
            if !in_range {
                self.buckets[hole] = Some(s);
                self.buckets[j] = None;
                hole = j;
            }
        }
        true
    }

    /// Number of occupied buckets (test support).
    pub fn occupied(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Identity hash keyed by slot number itself: slot s holds "key" keys[s].
    fn hash_for(keys: &[u64], slot: u32) -> u64 {
        mix64(keys[slot as usize])
    }

    #[test]
    fn test_insert_and_find() {
        let keys: Vec<u64> = (100..110).collect();
        let mut idx = SlotIndex::with_pool_capacity(16);
        for (slot, &k) in keys.iter().enumerate() {
            idx.insert(mix64(k), slot as u32);
        }
        for (slot, &k) in keys.iter().enumerate() {
            let found = idx.find(mix64(k), |s| keys[s as usize] == k);
            assert_eq!(found, Some(slot as u32));
        }
        assert_eq!(idx.find(mix64(999), |s| keys[s as usize] == 999), None);
    }

    #[test]
    fn test_remove_keeps_chains_intact() {
        // Force collisions with a tiny table: capacity 2 -> 4 buckets.
        let keys: Vec<u64> = vec![1, 5, 9, 13];
        let mut idx = SlotIndex::with_pool_capacity(2);
        // Insert three entries that all probe around the same region.
        for slot in 0..3u32 {
            idx.insert(hash_for(&keys, slot), slot);
        }
        // Remove the middle of whatever chain formed.
        assert!(idx.remove(hash_for(&keys, 1), 1, |s| hash_for(&keys, s)));
        // The survivors must still be reachable.
        for slot in [0u32, 2u32] {
            let k = keys[slot as usize];
            let found = idx.find(mix64(k), |s| keys[s as usize] == k);
            assert_eq!(found, Some(slot), "slot {slot} lost after shift-back");
        }
        assert_eq!(idx.occupied(), 2);
    }

    #[test]
    fn test_remove_missing_slot() {
        let keys: Vec<u64> = vec![7];
        let mut idx = SlotIndex::with_pool_capacity(4);
        idx.insert(hash_for(&keys, 0), 0);
        assert!(!idx.remove(mix64(42), 3, |s| hash_for(&keys, s)));
        assert_eq!(idx.occupied(), 1);
    }

    #[test]
    fn test_full_load_round_trip() {
        // Insert capacity-many entries (load factor 0.5), remove half,
        // verify the rest.
        let n = 64u32;
        let keys: Vec<u64> = (0..n as u64).map(|i| i * 7919 + 3).collect();
        let mut idx = SlotIndex::with_pool_capacity(n);
        for slot in 0..n {
            idx.insert(hash_for(&keys, slot), slot);
        }
        for slot in (0..n).step_by(2) {
            assert!(idx.remove(hash_for(&keys, slot), slot, |s| hash_for(&keys, s)));
        }
        for slot in (1..n).step_by(2) {
            let k = keys[slot as usize];
            assert_eq!(
                idx.find(mix64(k), |s| keys[s as usize] == k),
                Some(slot),
                "odd slot {slot} must survive the sweep"
            );
        }
        assert_eq!(idx.occupied(), n as usize / 2);
    }

    #[test]
    fn test_mix64_is_deterministic() {
        assert_eq!(mix64(0), mix64(0));
        assert_ne!(mix64(1), mix64(2));
    }
}
