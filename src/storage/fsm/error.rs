use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::buffer::BufferPoolError;
use crate::storage::disk::ContainerError;
use crate::transaction::{ErrorKind, TransactionError};
use crate::transaction::wal::log_record::LogRecordError;

#[derive(Error, Debug)]
pub enum SpaceError {
    #[error("Container {0} already exists")]
    ContainerExists(i32),
    #[error("Container {0} has no space map")]
    NoSpaceMap(i32),
    #[error("Page {0} is a space map page")]
    SpaceMapPage(PageId),
    #[error("Page {0} is not allocated")]
    NotAllocated(PageId),
    #[error("Container {0} cannot grow further")]
    ContainerFull(i32),
    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Log record error: {0}")]
    Record(#[from] LogRecordError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

pub type Result<T> = std::result::Result<T, SpaceError>;

impl From<SpaceError> for TransactionError {
    fn from(err: SpaceError) -> Self {
        match err {
            SpaceError::Transaction(e) => e,
            SpaceError::Buffer(e) => TransactionError::Buffer(e),
            SpaceError::Container(e) => TransactionError::Container(e),
            SpaceError::Record(e) => TransactionError::Record(e),
            other => TransactionError::Module {
                module: "space manager",
                kind: ErrorKind::Validation,
                message: other.to_string(),
            },
        }
    }
}
