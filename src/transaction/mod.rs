// SimpleDBM Transaction Module

pub mod checkpoint;
pub mod error;
pub mod handler;
pub mod isolation;
pub mod manager;
pub mod recovery;
#[allow(clippy::module_inception)]
pub mod transaction;
pub mod wal;


pub use checkpoint::{CheckpointConfig, CheckpointData, HeldLock, TransactionTableEntry};
pub use error::{ErrorKind, RecoveryError, Result, TransactionError};
pub use handler::{HandlerRegistry, LogHandler};
pub use isolation::IsolationMode;
pub use manager::TransactionManager;
pub use recovery::RestartSummary;
pub use transaction::{Savepoint, Transaction, TransactionState};
