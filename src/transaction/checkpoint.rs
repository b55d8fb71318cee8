// SimpleDBM Checkpoints
//
// Fuzzy checkpoints: a CheckpointBegin record, then the transaction table
// and dirty page table captured without stopping other activity, then a
// CheckpointEnd record carrying both. Restart analysis begins at the
// CheckpointBegin recorded in the log anchor.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::common::types::{Lsn, TxnId};
use crate::common::worker::BackgroundWorker;
use crate::concurrency::{LockMode, Lockable};
use crate::storage::buffer::DirtyPageInfo;
use crate::transaction::error::{Result, TransactionError};
use crate::transaction::isolation::IsolationMode;
use crate::transaction::manager::TransactionManager;
use crate::transaction::transaction::TransactionState;
use crate::transaction::wal::log_record::encode_payload;
use crate::transaction::wal::{LogManagerError, LogRecord, LogRecordKind};

#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Interval of the background checkpointer
    pub interval: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// A lock held by a prepared transaction, reacquired at restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldLock {
    pub lockable: Lockable,
    pub mode: LockMode,
}

/// A transaction as captured by a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTableEntry {
    pub txn_id: TxnId,
    pub state: TransactionState,
    pub isolation: IsolationMode,
    pub first_lsn: Lsn,
    pub last_lsn: Lsn,
    pub undo_next_lsn: Lsn,
    /// Locks of a prepared transaction; empty otherwise
    pub locks: Vec<HeldLock>,
}

/// Payload of a CheckpointEnd record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub transactions: Vec<TransactionTableEntry>,
    pub dirty_pages: Vec<DirtyPageInfo>,
    pub next_txn_id: TxnId,
}

impl TransactionManager {
    /// Take a fuzzy checkpoint and record it in the log anchor. Returns the
    /// LSN of the CheckpointBegin record.
    pub fn checkpoint(&self) -> Result<Lsn> {
        let _guard = self.checkpoint_mutex.lock();
        let log = self.log();

        let mut begin = LogRecord::new(0, Lsn::NULL, LogRecordKind::CheckpointBegin);
        let begin_lsn = log.insert(&mut begin)?;

        let data = CheckpointData {
            transactions: self.active_transactions(),
            dirty_pages: self.buffers().get_dirty_pages(),
            next_txn_id: self.next_txn_id(),
        };
        let mut end = LogRecord::new(0, begin_lsn, LogRecordKind::CheckpointEnd);
        end.payload = encode_payload(&data)?;
        let end_lsn = log.insert(&mut end)?;

        log.flush(end_lsn)?;
        log.set_checkpoint_lsn(begin_lsn)?;
        self.stats.checkpoints.increment();
        debug!(
            "Checkpoint at {} with {} transactions and {} dirty pages",
            begin_lsn,
            data.transactions.len(),
            data.dirty_pages.len()
        );
        Ok(begin_lsn)
    }

    /// Start the background checkpointer
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut checkpointer = self.checkpointer.lock();
        if checkpointer.is_some() {
            return Ok(());
        }
        let manager = Arc::downgrade(self);
        let worker = BackgroundWorker::spawn("checkpointer", self.checkpoint_config.interval, move || {
            if let Some(manager) = manager.upgrade() {
                if let Err(e) = manager.checkpoint() {
                    error!("Checkpoint failed: {}", e);
                }
            }
        })
        .map_err(|e| TransactionError::Log(LogManagerError::IoError(e)))?;
        *checkpointer = Some(worker);
        info!("Checkpointer started, interval {:?}", self.checkpoint_config.interval);
        Ok(())
    }
}
