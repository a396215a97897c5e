//! Segmented write-ahead log
//!
//! - [`config`]: size, rotation and sync-policy knobs
//! - [`writer`]: buffered, fsynced appends with segment rotation
//! - [`reader`]: checksum-verified iteration for recovery

mod config;
mod reader;
mod writer;

pub use config::WalConfig;
pub use reader::{ReadStop, SegmentRead, WalReader};
pub use writer::{WalCounters, WalWriter};
