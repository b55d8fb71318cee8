use std::io;

use thiserror::Error;

use crate::storage::disk::ContainerError;

#[derive(Error, Debug)]
pub enum LogFileError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Invalid header in log file {0}")]
    InvalidHeader(String),
    #[error("Log file {0} not found online or in the archive")]
    Missing(u32),
    #[error("Invalid log configuration: {0}")]
    Config(String),
    #[error("Invalid anchor: {0}")]
    InvalidAnchor(String),
}

pub type Result<T> = std::result::Result<T, LogFileError>;
