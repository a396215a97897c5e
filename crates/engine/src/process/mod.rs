//! Multi-process coordination
//!
//! Two cooperating mechanisms, both optional per configuration:
//!
//! - an advisory file lock serialising writers across processes
//!   ([`file_lock`]);
//! - a shared-memory participant table with heartbeat-based cleanup of
//!   crashed peers ([`shm`]).
//!
//! Both are advisory. A process that opens the data directory without
//! going through NenDB is not stopped by either.

pub mod file_lock;
pub mod shm;

pub use file_lock::{FileLock, LockMode, LOCK_FILE_NAME};
pub use shm::{ParticipantInfo, ParticipantTable};

use nendb_core::Result;
use std::path::Path;
use std::time::Duration;

/// The engine's handle on both coordination mechanisms.
#[derive(Debug)]
pub struct ProcessCoordinator {
    lock: Option<FileLock>,
    table: Option<ParticipantTable>,
    timeout: Duration,
}

impl ProcessCoordinator {
    /// Attach per the toggles: the lock file when `use_file_lock`, the
    /// participant table when `use_shared_memory`.
    pub fn attach(
        data_dir: &Path,
        use_file_lock: bool,
        use_shared_memory: bool,
        timeout: Duration,
        heartbeat_timeout_ms: i64,
    ) -> Result<Self> {
        let lock = if use_file_lock {
            Some(FileLock::open(data_dir)?)
        } else {
            None
        };
        let table = if use_shared_memory {
            let mut table = ParticipantTable::attach(data_dir, heartbeat_timeout_ms)?;
            table.register(0)?;
            Some(table)
        } else {
            None
        };
        Ok(ProcessCoordinator {
            lock,
            table,
            timeout,
        })
    }

    /// Take the exclusive file lock (no-op when locking is off).
    pub fn exclusive(&mut self) -> Result<()> {
        if let Some(lock) = &mut self.lock {
            lock.acquire(LockMode::Exclusive, self.timeout)?;
            if let Some(table) = &mut self.table {
                table.heartbeat();
            }
        }
        Ok(())
    }

    /// Take the shared file lock (no-op when locking is off).
    pub fn shared(&mut self) -> Result<()> {
        if let Some(lock) = &mut self.lock {
            lock.acquire(LockMode::Shared, self.timeout)?;
            if let Some(table) = &mut self.table {
                table.heartbeat();
            }
        }
        Ok(())
    }

    /// Release the file lock.
    pub fn release(&mut self) -> Result<()> {
        if let Some(lock) = &mut self.lock {
            lock.release()?;
        }
        Ok(())
    }

    /// Refresh this process's heartbeat and sweep stale peers.
    pub fn heartbeat(&mut self) {
        if let Some(table) = &mut self.table {
            table.heartbeat();
            table.reclaim_stale();
        }
    }

    /// Live peers in the participant table (empty when disabled).
    pub fn participants(&self) -> Vec<ParticipantInfo> {
        self.table
            .as_ref()
            .map(|t| t.live_participants())
            .unwrap_or_default()
    }

    /// Release the lock and clear this process's table slot.
    pub fn detach(mut self) -> Result<()> {
        self.release()?;
        if let Some(table) = &mut self.table {
            table.deregister();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disabled_coordinator_is_inert() {
        let dir = tempdir().unwrap();
        let mut coordinator =
            ProcessCoordinator::attach(dir.path(), false, false, Duration::from_millis(100), 5000)
                .unwrap();
        coordinator.exclusive().unwrap();
        coordinator.release().unwrap();
        assert!(coordinator.participants().is_empty());
        coordinator.detach().unwrap();
    }

    #[test]
    fn test_attach_registers_participant() {
        let dir = tempdir().unwrap();
        let coordinator =
            ProcessCoordinator::attach(dir.path(), true, true, Duration::from_millis(100), 5000)
                .unwrap();
        let peers = coordinator.participants();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].pid, std::process::id());
        coordinator.detach().unwrap();

        // Slot released: a fresh attach sees an empty table.
        let coordinator =
            ProcessCoordinator::attach(dir.path(), false, true, Duration::from_millis(100), 5000)
                .unwrap();
        assert_eq!(coordinator.participants().len(), 1); // just us
    }

    #[test]
    fn test_exclusive_conflict_times_out() {
        let dir = tempdir().unwrap();
        let mut a =
            ProcessCoordinator::attach(dir.path(), true, false, Duration::from_millis(200), 5000)
                .unwrap();
        let mut b =
            ProcessCoordinator::attach(dir.path(), true, false, Duration::from_millis(40), 5000)
                .unwrap();
        a.exclusive().unwrap();
        assert!(b.exclusive().is_err());
        a.release().unwrap();
        assert!(b.exclusive().is_ok());
    }
}
