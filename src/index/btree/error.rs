use thiserror::Error;

use crate::common::registry::RegistryError;
use crate::common::types::PageId;
use crate::storage::buffer::BufferPoolError;
use crate::storage::fsm::SpaceError;
use crate::storage::page::PageError;
use crate::transaction::wal::log_record::LogRecordError;
use crate::transaction::{ErrorKind, TransactionError};

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Key not found")]
    KeyNotFound,

    #[error("Unique constraint violated by key {0}")]
    UniqueConstraintViolation(String),

    #[error("Entry ({key}, {location}) already exists")]
    DuplicateEntry { key: String, location: String },

    #[error("Key of {size} bytes exceeds the limit of {limit}")]
    KeyTooLarge { size: usize, limit: usize },

    #[error("Location of {size} bytes exceeds the limit of {limit}")]
    LocationTooLarge { size: usize, limit: usize },

    #[error("Container {0} already holds an index")]
    IndexExists(i32),

    #[error("Container {0} holds no index")]
    NoIndex(i32),

    #[error("Page {page_id} is not a valid index node: {reason}")]
    InvalidNode { page_id: PageId, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Scan is closed")]
    ScanClosed,

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Log record error: {0}")]
    Record(#[from] LogRecordError),

    #[error("Space manager error: {0}")]
    Space(#[from] SpaceError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

pub type Result<T> = std::result::Result<T, BTreeError>;

impl BTreeError {
    /// Lock or latch contention; the caller may retry or abort
    pub fn is_retryable(&self) -> bool {
        match self {
            BTreeError::Transaction(e) => e.is_retryable(),
            BTreeError::Space(SpaceError::Transaction(e)) => e.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn invalid_node(page_id: PageId, reason: impl Into<String>) -> Self {
        BTreeError::InvalidNode {
            page_id,
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for BTreeError {
    fn from(err: bincode::Error) -> Self {
        BTreeError::SerializationError(err.to_string())
    }
}

impl From<BTreeError> for TransactionError {
    fn from(err: BTreeError) -> Self {
        match err {
            BTreeError::Transaction(e) => e,
            BTreeError::Space(e) => e.into(),
            BTreeError::BufferPoolError(e) => TransactionError::Buffer(e),
            BTreeError::Record(e) => TransactionError::Record(e),
            BTreeError::Registry(e) => TransactionError::Registry(e),
            other => TransactionError::Module {
                module: "btree",
                kind: ErrorKind::Validation,
                message: other.to_string(),
            },
        }
    }
}
