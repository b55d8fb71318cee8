// SimpleDBM storage engine

pub mod common;
pub mod concurrency;
pub mod database;
pub mod index;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use common::config::DatabaseConfig;
pub use common::types::{Lsn, PageId, TxnId};
pub use concurrency::{LockDuration, LockMode, Lockable};
pub use database::Database;
pub use index::btree::{BTreeError, BTreeIndex, BTreeManager, IndexScan};
pub use storage::buffer::{BufferManager, BufferPoolError};
pub use transaction::{IsolationMode, Transaction, TransactionError, TransactionManager};
