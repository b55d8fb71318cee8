// Redo and undo of space manager log records

use std::sync::Arc;

use crate::common::types::Page;
use crate::storage::disk::StorageManager;
use crate::storage::fsm::log_records::{
    CreateContainer, FormatMap, SetMapCount, UpdateBit, CREATE_CONTAINER, FORMAT_MAP, SET_MAP_COUNT,
    SPACE_MODULE_ID, UPDATE_BIT,
};
use crate::storage::fsm::map_page::SpaceMapPage;
use crate::transaction::wal::{LogRecord, LogRecordKind};
use crate::transaction::{LogHandler, Result, Transaction, TransactionError};

pub struct SpaceHandler {
    storage: Arc<StorageManager>,
}

impl SpaceHandler {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        Self { storage }
    }

    fn unexpected(record: &LogRecord, action: &str) -> TransactionError {
        TransactionError::InvalidLogRecord {
            lsn: record.lsn,
            reason: format!("space manager cannot {} record type {}", action, record.type_code),
        }
    }
}

impl LogHandler for SpaceHandler {
    fn name(&self) -> &'static str {
        "space manager"
    }

    fn redo(&self, page: &mut Page, record: &LogRecord) -> Result<()> {
        match record.type_code {
            FORMAT_MAP => record.decode::<FormatMap>()?.apply(page),
            SET_MAP_COUNT => {
                let change: SetMapCount = record.decode()?;
                SpaceMapPage::set_map_count(page, change.map_count);
            }
            UPDATE_BIT => {
                let change: UpdateBit = record.decode()?;
                SpaceMapPage::set(page, change.bit, change.allocated);
            }
            _ => return Err(Self::unexpected(record, "redo")),
        }
        Ok(())
    }

    fn redo_global(&self, record: &LogRecord) -> Result<()> {
        match record.type_code {
            CREATE_CONTAINER => {
                let create: CreateContainer = record.decode()?;
                self.storage.ensure_container(create.container_id)?;
                Ok(())
            }
            _ => Err(Self::unexpected(record, "redo without a page")),
        }
    }

    fn undo(&self, trx: &Transaction, record: &LogRecord) -> Result<()> {
        if record.type_code != UPDATE_BIT {
            return Err(Self::unexpected(record, "undo"));
        }
        let change: UpdateBit = record.decode()?;
        let clr = LogRecord::for_module(
            SPACE_MODULE_ID,
            UPDATE_BIT,
            LogRecordKind::Redo,
            &UpdateBit {
                bit: change.bit,
                allocated: !change.allocated,
            },
        )?;
        trx.compensate_page(record, clr)?;
        Ok(())
    }
}
