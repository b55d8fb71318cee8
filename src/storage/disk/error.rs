use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Container {0} not found")]
    NotFound(String),
    #[error("Container {0} already exists")]
    AlreadyExists(String),
    #[error("Container {0} is not open")]
    NotOpen(i32),
}

pub type Result<T> = std::result::Result<T, ContainerError>;
