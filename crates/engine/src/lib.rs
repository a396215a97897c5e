//! Database engine for NenDB
//!
//! This crate orchestrates the lower layers:
//!
//! - [`database`]: the `Database` facade with open/close, CRUD, vector
//!   search, transactions, and recovery integration
//! - [`config`]: `nendb.toml` configuration
//! - [`batch`]: client-side batching and server-side LSM leveling
//! - [`process`]: advisory file locks and the shared-memory participant
//!   table
//! - [`vector`]: cosine top-K over the embedding pool
//! - [`stats`]: the aggregated statistics surface
//!
//! The engine is the only component that knows about cross-layer
//! ordering: WAL before memory, process lock before the store lock,
//! replay before the first write.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod database;
pub mod process;
pub mod registry;
pub mod stats;
pub mod vector;

pub use batch::lsm::LsmLevels;
pub use batch::BatchQueue;
pub use config::{BatchSection, NendbConfig, PoolsConfig, WalSection, CONFIG_FILE_NAME};
pub use database::Database;
pub use process::{FileLock, LockMode, ParticipantInfo, ParticipantTable, ProcessCoordinator};
pub use registry::OPEN_DATABASES;
pub use stats::{BatchStats, DatabaseStats, LockMetrics};
pub use vector::{cosine_similarity, SimilarityHit};

// The transaction vocabulary callers need alongside the facade.
pub use nendb_concurrency::{IsolationLevel, Transaction};
