//! Global registry of open databases
//!
//! Opening the same data directory twice in one process returns the same
//! [`crate::Database`] instance. Two instances would fight over the WAL
//! writer and the participant slot. Weak references let an unused
//! database drop normally; the stale entry is replaced on the next open.

use crate::Database;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Weak;

/// Open databases by canonical data directory.
pub static OPEN_DATABASES: Lazy<Mutex<HashMap<PathBuf, Weak<Database>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
