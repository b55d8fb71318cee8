// SimpleDBM Concurrency Module
//
// Latches protect in-memory structures for short periods; locks protect
// database objects for the duration chosen by a transaction. Both share
// the same request queue and grant protocol.

pub mod error;
pub mod latch;
pub mod lock_manager;
pub mod mode;
mod queue;

pub use error::{LatchError, LockError};
pub use latch::{Latch, LatchConfig};
pub use lock_manager::{LockDuration, LockManager, LockManagerConfig, Lockable};
pub use mode::{LockMode, Timeout};
