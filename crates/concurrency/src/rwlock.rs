//! Timeout-bearing reader/writer lock
//!
//! A thin layer over `parking_lot::RwLock`: its queued locking already
//! blocks new readers behind a waiting writer, which is the
//! writer-preference the engine needs. This wrapper adds bounded
//! acquisition (every blocking call takes a timeout and surfaces
//! [`Error::LockTimeout`]) and acquisition metrics.

use nendb_core::{Error, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of lock activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RwLockMetrics {
    /// Successful read acquisitions
    pub read_acquisitions: u64,
    /// Successful write acquisitions
    pub write_acquisitions: u64,
    /// Acquisitions that timed out
    pub timeouts: u64,
}

/// Many readers or one writer, with bounded waits.
#[derive(Debug, Default)]
pub struct ReadWriteLock<T> {
    inner: RwLock<T>,
    reads: AtomicU64,
    writes: AtomicU64,
    timeouts: AtomicU64,
}

impl<T> ReadWriteLock<T> {
    /// Wrap `value`.
    pub fn new(value: T) -> Self {
        ReadWriteLock {
            inner: RwLock::new(value),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    /// Acquire shared access, waiting at most `timeout`.
    pub fn read(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, T>> {
        match self.inner.try_read_for(timeout) {
            Some(guard) => {
                self.reads.fetch_add(1, Ordering::Relaxed);
                Ok(guard)
            }
            None => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(Error::LockTimeout {
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Acquire exclusive access, waiting at most `timeout`.
    pub fn write(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, T>> {
        match self.inner.try_write_for(timeout) {
            Some(guard) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(guard)
            }
            None => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(Error::LockTimeout {
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Non-blocking shared access, for the optimistic read path.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        let guard = self.inner.try_read();
        if guard.is_some() {
            self.reads.fetch_add(1, Ordering::Relaxed);
        }
        guard
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> RwLockMetrics {
        RwLockMetrics {
            read_acquisitions: self.reads.load(Ordering::Relaxed),
            write_acquisitions: self.writes.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_many_readers_coexist() {
        let lock = ReadWriteLock::new(5u32);
        let a = lock.read(Duration::from_millis(100)).unwrap();
        let b = lock.read(Duration::from_millis(100)).unwrap();
        assert_eq!((*a, *b), (5, 5));
        drop((a, b));
        assert_eq!(lock.metrics().read_acquisitions, 2);
    }

    #[test]
    fn test_write_excludes_and_times_out() {
        let lock = Arc::new(ReadWriteLock::new(0u32));
        let held = lock.write(Duration::from_millis(100)).unwrap();

        let contender = Arc::clone(&lock);
        let handle = std::thread::spawn(move || {
            contender.write(Duration::from_millis(50)).err()
        });
        let err = handle.join().unwrap().expect("second writer must time out");
        assert!(matches!(err, Error::LockTimeout { .. }));
        drop(held);
        assert_eq!(lock.metrics().timeouts, 1);
    }

    #[test]
    fn test_writer_sees_reader_departure() {
        let lock = Arc::new(ReadWriteLock::new(1u32));
        let reader = lock.read(Duration::from_millis(100)).unwrap();

        let writer_lock = Arc::clone(&lock);
        let handle = std::thread::spawn(move || {
            let mut guard = writer_lock.write(Duration::from_secs(2)).unwrap();
            *guard = 2;
        });
        std::thread::sleep(Duration::from_millis(20));
        drop(reader);
        handle.join().unwrap();
        assert_eq!(*lock.read(Duration::from_millis(100)).unwrap(), 2);
    }

    #[test]
    fn test_try_read_fails_under_writer() {
        let lock = ReadWriteLock::new(0u32);
        let guard = lock.write(Duration::from_millis(100)).unwrap();
        assert!(lock.try_read().is_none());
        drop(guard);
        assert!(lock.try_read().is_some());
    }
}
