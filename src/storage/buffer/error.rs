use thiserror::Error;

use crate::common::registry::RegistryError;
use crate::common::types::PageId;
use crate::concurrency::LatchError;
use crate::storage::disk::ContainerError;
use crate::transaction::wal::LogManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Page {0} not found")]
    PageNotFound(PageId),
    #[error("No unpinned frame available")]
    NoFreeFrames,
    #[error("Page {page_id} has unregistered page type {page_type}")]
    UnknownPageType { page_id: PageId, page_type: u16 },
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Latch error: {0}")]
    Latch(#[from] LatchError),
    #[error("Log error: {0}")]
    Log(#[from] LogManagerError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, BufferPoolError>;
