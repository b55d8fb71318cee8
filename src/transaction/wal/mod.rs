// SimpleDBM Write-Ahead Logging Module

pub mod log_buffer;
pub mod log_components;
pub mod log_manager;
pub mod log_record;

pub use log_buffer::LogBufferConfig;
pub use log_components::log_iterator::LogRecordIterator;
pub use log_manager::{LogManager, LogManagerConfig, LogManagerError, Result};
pub use log_record::{LogRecord, LogRecordKind};
