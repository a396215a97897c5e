//! Core types for the NenDB storage engine
//!
//! This crate holds what every other layer needs: the error taxonomy, the
//! entity records of the property-graph data model, and the capacity and
//! size constants the pre-allocated pools are built from.
//!
//! Layering: `core` depends on nothing else in the workspace. Storage,
//! durability, concurrency and the engine all depend on it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod types;

pub use error::{Error, ErrorCounters, ErrorKind, Result};
pub use limits::PoolCapacities;
pub use types::{
    EdgeKey, EdgeLabel, EdgeProps, EdgeRecord, EmbeddingRecord, Lsn, NodeId, NodeKind, NodeProps,
    NodeRecord, PoolKind, PropBlob,
};
