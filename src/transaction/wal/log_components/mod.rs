// SimpleDBM WAL Log Components
//
// File level pieces of the write-ahead log.

pub mod log_anchor;
pub mod log_file_error;
pub mod log_file_header;
pub mod log_file_manager;
pub mod log_file_utils;
pub mod log_iterator;
