use thiserror::Error;

use crate::common::registry::RegistryError;
use crate::common::types::{Lsn, PageId, TxnId};
use crate::concurrency::{LatchError, LockError};
use crate::storage::buffer::BufferPoolError;
use crate::storage::disk::ContainerError;
use crate::storage::page::PageError;
use crate::transaction::transaction::TransactionState;
use crate::transaction::wal::log_record::LogRecordError;
use crate::transaction::wal::LogManagerError;

/// Broad classes of failure, deciding what a caller may do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lock or latch not obtained in time; the operation may be retried
    Contention,
    /// Protocol or usage error; retrying cannot help
    Validation,
    /// Storage failure; the transaction should be aborted
    Io,
    /// The database cannot be opened safely
    RecoveryFatal,
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {txn_id} is {state:?}, expected {expected}")]
    InvalidState {
        txn_id: TxnId,
        state: TransactionState,
        expected: &'static str,
    },

    #[error("Transaction {0} has an open nested top action")]
    NestedTopActionOpen(TxnId),

    #[error("Transaction {0} has no open nested top action")]
    NoNestedTopAction(TxnId),

    #[error("Savepoint {savepoint} is not part of transaction {txn_id}")]
    InvalidSavepoint { txn_id: TxnId, savepoint: Lsn },

    #[error("No handler registered for module {0}")]
    UnknownModule(u16),

    #[error("Handler for module {0} is already registered")]
    DuplicateModule(u16),

    #[error("Log record at {lsn} cannot be applied: {reason}")]
    InvalidLogRecord { lsn: Lsn, reason: String },

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Latch error: {0}")]
    Latch(#[from] LatchError),

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Log error: {0}")]
    Log(#[from] LogManagerError),

    #[error("Log record error: {0}")]
    Record(#[from] LogRecordError),

    #[error("Page error on {page_id}: {source}")]
    Page { page_id: PageId, source: PageError },

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Recovery failed: {0}")]
    Recovery(#[from] RecoveryError),

    /// Failure reported by a module handler
    #[error("{module}: {message}")]
    Module {
        module: &'static str,
        kind: ErrorKind,
        message: String,
    },
}

/// Conditions that make restart impossible
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Log record {lsn} belongs to unregistered module {module_id}")]
    UnknownModule { lsn: Lsn, module_id: u16 },

    #[error("Page {page_id} has LSN {page_lsn} beyond the end of the log at {end_of_log}")]
    PageLsnBeyondLog {
        page_id: PageId,
        page_lsn: Lsn,
        end_of_log: Lsn,
    },

    #[error("Page {page_id} referenced by log record {lsn} does not exist")]
    MissingPage { page_id: PageId, lsn: Lsn },

    #[error("Corrupt log: {0}")]
    CorruptLog(String),

    #[error("Restart of transaction {txn_id} failed at {lsn}: {reason}")]
    UndoFailed { txn_id: TxnId, lsn: Lsn, reason: String },
}

impl TransactionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::Lock(e) if e.is_retryable() => ErrorKind::Contention,
            TransactionError::Latch(e) if e.is_retryable() => ErrorKind::Contention,
            TransactionError::Lock(_) | TransactionError::Latch(_) => ErrorKind::Validation,
            TransactionError::Buffer(BufferPoolError::Latch(e)) if e.is_retryable() => ErrorKind::Contention,
            TransactionError::Buffer(BufferPoolError::Latch(_))
            | TransactionError::Buffer(BufferPoolError::InvalidOperation(_)) => ErrorKind::Validation,
            TransactionError::Buffer(_)
            | TransactionError::Log(_)
            | TransactionError::Container(_) => ErrorKind::Io,
            TransactionError::Recovery(_)
            | TransactionError::UnknownModule(_)
            | TransactionError::Record(_)
            | TransactionError::Page { .. } => ErrorKind::RecoveryFatal,
            TransactionError::Module { kind, .. } => *kind,
            TransactionError::InvalidState { .. }
            | TransactionError::NestedTopActionOpen(_)
            | TransactionError::NoNestedTopAction(_)
            | TransactionError::InvalidSavepoint { .. }
            | TransactionError::DuplicateModule(_)
            | TransactionError::InvalidLogRecord { .. }
            | TransactionError::Registry(_) => ErrorKind::Validation,
        }
    }

    /// Whether the failed operation may succeed if retried
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Contention
    }

    pub fn page(page_id: PageId, source: PageError) -> Self {
        TransactionError::Page { page_id, source }
    }
}

pub type Result<T> = std::result::Result<T, TransactionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::{Lockable, LockMode};

    #[test]
    fn test_contention_is_retryable() {
        let err = TransactionError::from(LockError::Timeout {
            owner: 1,
            lockable: Lockable::Container(3),
            mode: LockMode::Exclusive,
        });
        assert_eq!(err.kind(), ErrorKind::Contention);
        assert!(err.is_retryable());

        let err = TransactionError::from(LatchError::Timeout {
            owner: 1,
            mode: LockMode::Shared,
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_fatal_and_validation_kinds() {
        let err = TransactionError::from(RecoveryError::CorruptLog("bad frame".into()));
        assert_eq!(err.kind(), ErrorKind::RecoveryFatal);
        assert!(!err.is_retryable());

        let err = TransactionError::NoNestedTopAction(4);
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = TransactionError::from(BufferPoolError::PageNotFound(PageId::new(1, 2)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
