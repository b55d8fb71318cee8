use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("Not enough space in page: needed {needed} bytes, {available} available")]
    InsufficientSpace { needed: usize, available: usize },
    #[error("Invalid slot {slot} (page has {count} slots)")]
    InvalidSlot { slot: usize, count: usize },
    #[error("Corrupt page: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, PageError>;
