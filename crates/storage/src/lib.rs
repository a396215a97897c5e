//! In-memory storage for NenDB
//!
//! Two views over the same pre-allocated memory:
//!
//! - [`pool`]: fixed-capacity slot pools with a LIFO free stack,
//!   per-slot generation counters, and an open-addressed identity index.
//! - [`graph`]: the structure-of-arrays store that composes the pools and
//!   keeps hot fields in dense parallel arrays for scan-friendly filters.
//!
//! Nothing here locks or touches disk; the concurrency and durability
//! layers wrap this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod pool;
pub mod stats;

pub use graph::{GraphStore, NodeRemoval};
pub use pool::{mix64, PoolEntity, SlotIndex, SlotPool, SlotRef};
pub use stats::{MemoryStats, PoolStats};
