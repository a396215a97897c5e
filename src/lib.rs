//! NenDB: an embedded property-graph database core
//!
//! In-process storage with pre-allocated pools, an SoA graph store,
//! segmented write-ahead logging with crash recovery, a multi-reader /
//! single-writer concurrency layer, batch processing with LSM leveling,
//! and advisory multi-process coordination.
//!
//! ```no_run
//! use nendb::{Database, IsolationLevel};
//!
//! # fn main() -> nendb::Result<()> {
//! let db = Database::open("/tmp/graph")?;
//! db.add_node(1, 10, b"")?;
//! db.add_node(2, 20, b"")?;
//! db.add_edge(1, 2, 50, b"")?;
//!
//! let out = db.find_outgoing_edges(1)?;
//! assert_eq!(out[0].to, 2);
//!
//! let mut txn = db.begin_transaction(IsolationLevel::default())?;
//! db.txn_add_node(&mut txn, 3, 10, b"")?;
//! db.commit(&mut txn)?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub use nendb_core::{
    EdgeKey, EdgeLabel, EdgeProps, EdgeRecord, EmbeddingRecord, Error, ErrorKind, Lsn, NodeId,
    NodeKind, NodeProps, NodeRecord, PoolCapacities, PoolKind, Result,
};
pub use nendb_engine::{
    BatchSection, Database, DatabaseStats, IsolationLevel, LockMetrics, NendbConfig, PoolsConfig,
    SimilarityHit, Transaction, WalSection,
};

/// Storage internals, exposed for embedding and testing.
pub use nendb_storage as storage;

/// WAL internals, exposed for tooling (log inspection, archival).
pub use nendb_durability as durability;

/// Concurrency primitives.
pub use nendb_concurrency as concurrency;
