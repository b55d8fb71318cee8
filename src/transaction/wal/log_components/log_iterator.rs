// SimpleDBM WAL Log Iterator
//
// Forward scan over flushed records in LSN order, crossing file boundaries
// and falling back to archived files.

use std::sync::Arc;

use log::debug;

use super::log_file_error::LogFileError;
use super::log_file_header::LogFileHeader;
use super::log_file_manager::LogFiles;
use super::log_file_utils::FRAME_HEADER_SIZE;
use crate::common::types::Lsn;
use crate::storage::disk::StorageContainer;
use crate::transaction::wal::log_manager::{LogManagerError, Result};
use crate::transaction::wal::log_record::LogRecord;

/// Iterator for traversing log records
pub struct LogRecordIterator {
    files: Arc<LogFiles>,
    /// Copy of the file being read
    current: Option<Arc<dyn StorageContainer>>,
    /// Position of the next record
    position: Lsn,
    /// Highest file index that may hold records
    last_index: u32,
    finished: bool,
}

impl LogRecordIterator {
    pub(crate) fn new(files: Arc<LogFiles>, start: Lsn, last_index: u32) -> Result<Self> {
        let position = if start.is_null() {
            let first = files.first_index().map_err(LogManagerError::File)?.unwrap_or(last_index);
            Lsn::new(first, LogFileHeader::HEADER_SIZE)
        } else {
            Lsn::new(start.index, start.offset.max(LogFileHeader::HEADER_SIZE))
        };
        Ok(Self {
            files,
            current: None,
            position,
            last_index,
            finished: false,
        })
    }

    /// Position the next call to `next` reads from
    pub fn position(&self) -> Lsn {
        self.position
    }

    fn open_current(&mut self) -> Result<bool> {
        if self.current.is_some() {
            return Ok(true);
        }
        let copies = self.files.copies(self.position.index).map_err(LogManagerError::File)?;
        match copies.into_iter().next() {
            Some(copy) => {
                self.current = Some(copy);
                Ok(true)
            }
            None if self.position.index <= self.last_index => {
                Err(LogManagerError::File(LogFileError::Missing(self.position.index)))
            }
            None => Ok(false),
        }
    }

    fn read_next(&mut self) -> Result<Option<LogRecord>> {
        loop {
            if !self.open_current()? {
                return Ok(None);
            }
            let Some(container) = self.current.clone() else {
                return Ok(None);
            };
            let frame = LogFiles::read_frame(container.as_ref(), self.position.offset as u64).map_err(LogManagerError::File)?;
            match frame {
                Some(bytes) => {
                    let record = LogRecord::deserialize(&bytes)?;
                    if record.lsn != self.position {
                        return Err(LogManagerError::Corrupt(format!(
                            "record at {} claims lsn {}",
                            self.position, record.lsn
                        )));
                    }
                    self.position.offset += (FRAME_HEADER_SIZE + bytes.len()) as u32;
                    return Ok(Some(record));
                }
                None if self.position.index < self.last_index => {
                    debug!("End of log file {} at offset {}", self.position.index, self.position.offset);
                    self.position = Lsn::new(self.position.index + 1, LogFileHeader::HEADER_SIZE);
                    self.current = None;
                }
                None => return Ok(None),
            }
        }
    }
}

impl Iterator for LogRecordIterator {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
