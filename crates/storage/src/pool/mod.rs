//! Static slot pools with O(1) identity lookup
//!
//! One pool per entity kind. Capacity is fixed at construction and never
//! grows; slots come off a LIFO free stack, and a generation counter per
//! slot invalidates stale references after a free. An open-addressed index
//! (see [`index`]) maps identities to slots.

mod index;

pub use index::{mix64, SlotIndex};

use nendb_core::{
    EdgeKey, EdgeRecord, EmbeddingRecord, Error, NodeId, NodeRecord, PoolKind, Result,
};
use std::fmt;

/// An entity that can live in a [`SlotPool`].
pub trait PoolEntity: Clone {
    /// Identity key: unique among live entities of this kind.
    type Key: Copy + Eq + fmt::Debug;

    /// Which pool this entity belongs to (for error reporting).
    const KIND: PoolKind;

    /// A zeroed slot value.
    fn empty() -> Self;

    /// This entity's identity.
    fn key(&self) -> Self::Key;

    /// Deterministic identity hash (splitmix64-based, see [`mix64`]).
    fn key_hash(key: &Self::Key) -> u64;

    /// The duplicate-identity error for this kind.
    fn duplicate_error(key: Self::Key) -> Error;
}

impl PoolEntity for NodeRecord {
    type Key = NodeId;
    const KIND: PoolKind = PoolKind::Node;

    fn empty() -> Self {
        NodeRecord {
            id: 0,
            kind: 0,
            props: Default::default(),
        }
    }

    fn key(&self) -> NodeId {
        self.id
    }

    fn key_hash(key: &NodeId) -> u64 {
        mix64(*key)
    }

    fn duplicate_error(key: NodeId) -> Error {
        Error::DuplicateNode(key)
    }
}

impl PoolEntity for EdgeRecord {
    type Key = EdgeKey;
    const KIND: PoolKind = PoolKind::Edge;

    fn empty() -> Self {
        EdgeRecord {
            from: 0,
            to: 0,
            label: 0,
            props: Default::default(),
        }
    }

    fn key(&self) -> EdgeKey {
        self.key()
    }

    fn key_hash(key: &EdgeKey) -> u64 {
        mix64(key.from ^ mix64(key.to ^ ((key.label as u64) << 48)))
    }

    fn duplicate_error(key: EdgeKey) -> Error {
        Error::DuplicateEdge(key)
    }
}

impl PoolEntity for EmbeddingRecord {
    type Key = NodeId;
    const KIND: PoolKind = PoolKind::Embedding;

    fn empty() -> Self {
        EmbeddingRecord {
            node_id: 0,
            vector: Vec::new(),
        }
    }

    fn key(&self) -> NodeId {
        self.node_id
    }

    fn key_hash(key: &NodeId) -> u64 {
        mix64(*key)
    }

    fn duplicate_error(key: NodeId) -> Error {
        // A second embedding for the same node collides on the node id.
        Error::DuplicateNode(key)
    }
}

/// A generation-tagged reference to a pool slot.
///
/// Resolving the reference fails once the slot's generation has advanced
/// past the one captured here (the slot was freed, possibly reused).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    /// Slot number
    pub slot: u32,
    /// Generation at capture time
    pub generation: u32,
}

/// Fixed-capacity slot pool with identity index and generation counters.
#[derive(Debug, Clone)]
pub struct SlotPool<T: PoolEntity> {
    slots: Vec<T>,
    is_free: Vec<bool>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
    used: u32,
    index: SlotIndex,
}

impl<T: PoolEntity> SlotPool<T> {
    /// Create a pool of exactly `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a zero capacity.
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "{} pool capacity must be non-zero",
                T::KIND
            )));
        }
        let n = capacity as usize;
        Ok(SlotPool {
            slots: vec![T::empty(); n],
            is_free: vec![true; n],
            generation: vec![0; n],
            // LIFO stack seeded {N-1, ..., 0}: the first alloc pops slot 0.
            free_list: (0..capacity).rev().collect(),
            used: 0,
            index: SlotIndex::with_pool_capacity(capacity),
        })
    }

    /// Configured capacity.
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Count of live (non-free) slots.
    pub fn len(&self) -> u32 {
        self.used
    }

    /// Whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Live slots over capacity.
    pub fn fill_ratio(&self) -> f32 {
        self.used as f32 / self.slots.len() as f32
    }

    fn hash_of_slot(&self, slot: u32) -> u64 {
        T::key_hash(&self.slots[slot as usize].key())
    }

    /// Store `entity` in a fresh slot and index its identity.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolExhausted`] when every slot is live.
    /// - the kind's duplicate error when the identity is already live.
    pub fn alloc(&mut self, entity: T) -> Result<u32> {
        let key = entity.key();
        let hash = T::key_hash(&key);
        if self
            .index
            .find(hash, |s| self.slots[s as usize].key() == key)
            .is_some()
        {
            return Err(T::duplicate_error(key));
        }
        let Some(slot) = self.free_list.pop() else {
            return Err(Error::PoolExhausted {
                kind: T::KIND,
                capacity: self.capacity(),
            });
        };
        self.slots[slot as usize] = entity;
        self.is_free[slot as usize] = false;
        self.used += 1;
        self.index.insert(hash, slot);
        Ok(slot)
    }

    /// Release a slot: unindex it, zero it, bump its generation.
    ///
    /// Freeing an already-free slot is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] for an out-of-range slot number.
    pub fn free(&mut self, slot: u32) -> Result<()> {
        if slot >= self.capacity() {
            return Err(Error::InvalidId(slot as u64));
        }
        if self.is_free[slot as usize] {
            return Ok(());
        }
        let hash = self.hash_of_slot(slot);
        let slots = &self.slots;
        self.index
            .remove(hash, slot, |s| T::key_hash(&slots[s as usize].key()));
        self.slots[slot as usize] = T::empty();
        self.is_free[slot as usize] = true;
        self.generation[slot as usize] = self.generation[slot as usize].wrapping_add(1);
        self.free_list.push(slot);
        self.used -= 1;
        Ok(())
    }

    /// Free the slot holding `key`, returning its slot number.
    ///
    /// # Errors
    ///
    /// Returns the kind-appropriate not-found error via `missing`.
    pub fn free_by_key(&mut self, key: T::Key, missing: impl FnOnce() -> Error) -> Result<u32> {
        let Some(slot) = self.slot_of(&key) else {
            return Err(missing());
        };
        self.free(slot)?;
        Ok(slot)
    }

    /// The entity in `slot`, `None` for free or out-of-range slots.
    pub fn get(&self, slot: u32) -> Option<&T> {
        let i = slot as usize;
        if i < self.slots.len() && !self.is_free[i] {
            Some(&self.slots[i])
        } else {
            None
        }
    }

    /// Mutable access to a live slot.
    pub fn get_mut(&mut self, slot: u32) -> Option<&mut T> {
        let i = slot as usize;
        if i < self.slots.len() && !self.is_free[i] {
            Some(&mut self.slots[i])
        } else {
            None
        }
    }

    /// Slot number of the live entity with `key`.
    pub fn slot_of(&self, key: &T::Key) -> Option<u32> {
        self.index
            .find(T::key_hash(key), |s| self.slots[s as usize].key() == *key)
    }

    /// The live entity with `key`.
    pub fn get_by_key(&self, key: &T::Key) -> Option<&T> {
        self.slot_of(key).map(|s| &self.slots[s as usize])
    }

    /// Generation counter of a slot.
    pub fn generation(&self, slot: u32) -> Option<u32> {
        self.generation.get(slot as usize).copied()
    }

    /// Whether `slot` currently holds a live entity.
    pub fn is_live(&self, slot: u32) -> bool {
        (slot as usize) < self.slots.len() && !self.is_free[slot as usize]
    }

    /// A generation-tagged reference to a live slot.
    pub fn slot_ref(&self, slot: u32) -> Option<SlotRef> {
        self.is_live(slot).then(|| SlotRef {
            slot,
            generation: self.generation[slot as usize],
        })
    }

    /// Resolve a tagged reference; `None` once the generation advanced.
    pub fn resolve(&self, r: SlotRef) -> Option<&T> {
        if self.generation(r.slot) == Some(r.generation) {
            self.get(r.slot)
        } else {
            None
        }
    }

    /// Iterate live slots as `(slot, entity)`.
    pub fn iter_live(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.is_free[*i])
            .map(|(i, e)| (i as u32, e))
    }
}
