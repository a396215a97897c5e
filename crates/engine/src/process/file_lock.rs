//! Advisory file locking
//!
//! An `fs2` advisory lock on `<data_dir>/nendb.lock`. Shared mode admits
//! any number of readers; exclusive mode admits one holder. Acquisition
//! retries with bounded backoff until the timeout.
//!
//! Advisory means advisory: a process that never asks for the lock can
//! still open and corrupt the files. This protects cooperating NenDB
//! processes from each other, nothing more.

use fs2::FileExt;
use nendb_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lock file name inside the data directory.
pub const LOCK_FILE_NAME: &str = "nendb.lock";

/// Requested lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Unlimited readers, no exclusive holder
    Shared,
    /// Single holder
    Exclusive,
}

/// Handle on the advisory lock file.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    held: Option<LockMode>,
}

impl FileLock {
    /// Open (creating if needed) the lock file in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(FileLock {
            file,
            path,
            held: None,
        })
    }

    /// Acquire the lock in `mode`, retrying with backoff up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] when the deadline passes without
    /// the lock becoming available.
    pub fn acquire(&mut self, mode: LockMode, timeout: Duration) -> Result<()> {
        if self.held == Some(mode) {
            return Ok(());
        }
        if self.held.is_some() {
            self.release()?;
        }
        let started = Instant::now();
        let mut backoff = Duration::from_millis(5);
        loop {
            let attempt: std::io::Result<()> = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&self.file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&self.file),
            };
            match attempt {
                Ok(()) => {
                    self.held = Some(mode);
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if started.elapsed() >= timeout {
                        return Err(Error::LockTimeout {
                            waited_ms: timeout.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(backoff.min(timeout.saturating_sub(started.elapsed())));
                    backoff = (backoff * 2).min(Duration::from_millis(100));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drop the lock.
    pub fn release(&mut self) -> Result<()> {
        if self.held.take().is_some() {
            FileExt::unlock(&self.file)?;
        }
        Ok(())
    }

    /// The mode currently held, if any.
    pub fn held(&self) -> Option<LockMode> {
        self.held
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
