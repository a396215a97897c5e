//! Concurrency primitives for NenDB
//!
//! Multi-reader / single-writer, multi-threaded and parallel: no
//! coroutines, no event loop. Every blocking acquisition takes a timeout
//! and either completes or surfaces an error; nothing deadlocks silently.
//!
//! - [`rwlock`]: the writer-preferring store lock with timed acquisition
//! - [`seqlock`]: optimistic lock-free-style reads with bounded retries
//! - [`atomic`]: monotonic counters and the id generator
//! - [`deadlock`]: global lock order plus a wait-for cycle check
//! - [`transaction`]: redo/undo transaction contexts and the operation
//!   vocabulary shared with the batch processor

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod deadlock;
pub mod rwlock;
pub mod seqlock;
pub mod transaction;

pub use atomic::{AtomicCounter, AtomicIdGenerator};
pub use deadlock::DeadlockDetector;
pub use rwlock::{ReadWriteLock, RwLockMetrics};
pub use seqlock::{SeqRead, Seqlock, SeqlockMetrics};
pub use transaction::{IsolationLevel, Operation, Transaction, TransactionStatus, UndoOp};
