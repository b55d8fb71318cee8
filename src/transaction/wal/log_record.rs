// SimpleDBM Log Record
//
// Every record carries the transaction chain pointers used by undo and an
// opaque payload interpreted by the module that wrote it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::types::{Lsn, PageId, TxnId};

/// Error type for log record operations
#[derive(Error, Debug)]
pub enum LogRecordError {
    #[error("Failed to encode log record: {0}")]
    Encode(String),

    #[error("Failed to decode log record: {0}")]
    Decode(String),
}

/// Result type for log record operations
pub type Result<T> = std::result::Result<T, LogRecordError>;

/// Category of a log record, deciding how redo and undo treat it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecordKind {
    /// Marks the beginning of a transaction
    Begin,
    /// The transaction has voted to commit and awaits the outcome
    Prepare,
    /// Commit decision, forced to disk before the commit returns
    Commit,
    /// Rollback has started (or finished, when written at restart)
    Abort,
    /// The transaction is complete and can be forgotten
    End,
    /// Start of a fuzzy checkpoint
    CheckpointBegin,
    /// End of a fuzzy checkpoint, carrying the transaction and dirty page tables
    CheckpointEnd,
    /// Redo-only change
    Redo,
    /// Change that is redone forward and undone on rollback
    Undoable,
    /// Compensation record; undo continues at `undo_next_lsn`
    Compensation { undo_next_lsn: Lsn },
    /// Dummy compensation record closing a nested top action
    NestedTopActionEnd { undo_next_lsn: Lsn },
}

/// A single record in the write-ahead log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Assigned by the log manager on insert
    pub lsn: Lsn,
    /// Owning transaction, 0 for records that belong to no transaction
    pub txn_id: TxnId,
    /// Previous record of the same transaction
    pub prev_lsn: Lsn,
    pub kind: LogRecordKind,
    /// Module whose handler interprets the payload
    pub module_id: u16,
    /// Module specific record type
    pub type_code: u16,
    /// Page the record applies to, if any
    pub page_id: Option<PageId>,
    /// Set when redo must reinitialize the page with this page type first
    pub page_format: Option<u16>,
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Create a record with no module payload
    pub fn new(txn_id: TxnId, prev_lsn: Lsn, kind: LogRecordKind) -> Self {
        Self {
            lsn: Lsn::NULL,
            txn_id,
            prev_lsn,
            kind,
            module_id: 0,
            type_code: 0,
            page_id: None,
            page_format: None,
            payload: Vec::new(),
        }
    }

    /// Create a module record with an encoded payload. The transaction
    /// fields are filled in when the record is logged.
    pub fn for_module<T: Serialize>(module_id: u16, type_code: u16, kind: LogRecordKind, payload: &T) -> Result<Self> {
        let mut record = Self::new(0, Lsn::NULL, kind);
        record.module_id = module_id;
        record.type_code = type_code;
        record.payload = encode_payload(payload)?;
        Ok(record)
    }

    pub fn with_page(mut self, page_id: PageId) -> Self {
        self.page_id = Some(page_id);
        self
    }

    pub fn with_page_format(mut self, page_type: u16) -> Self {
        self.page_format = Some(page_type);
        self
    }

    /// Whether restart redo applies this record
    pub fn is_redoable(&self) -> bool {
        matches!(
            self.kind,
            LogRecordKind::Redo | LogRecordKind::Undoable | LogRecordKind::Compensation { .. }
        )
    }

    pub fn is_undoable(&self) -> bool {
        self.kind == LogRecordKind::Undoable
    }

    /// Next record to undo after this one, when it is a compensation record
    pub fn undo_next_lsn(&self) -> Option<Lsn> {
        match self.kind {
            LogRecordKind::Compensation { undo_next_lsn } | LogRecordKind::NestedTopActionEnd { undo_next_lsn } => {
                Some(undo_next_lsn)
            }
            _ => None,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        decode_payload(&self.payload)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| LogRecordError::Encode(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| LogRecordError::Decode(e.to_string()))
    }
}

pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LogRecordError::Encode(e.to_string()))
}

pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| LogRecordError::Decode(e.to_string()))
}
