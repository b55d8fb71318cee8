// SimpleDBM Transaction
//
// A transaction owns a backward chain of log records linked by `prev_lsn`.
// Rollback walks the chain from `undo_next_lsn`, asking each module handler
// to compensate its undoable records.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::common::types::{Lsn, OwnerId, TxnId};
use crate::concurrency::{LockDuration, LockMode, Lockable, Timeout};
use crate::storage::buffer::{BufferAccessBlock, FixHint};
use crate::transaction::error::{RecoveryError, Result, TransactionError};
use crate::transaction::isolation::IsolationMode;
use crate::transaction::manager::TransactionManager;
use crate::transaction::wal::log_record::encode_payload;
use crate::transaction::wal::{LogRecord, LogRecordKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Active,
    /// Voted to commit; the outcome is decided by the coordinator
    Prepared,
    Committing,
    Committed,
    Aborting,
    Aborted,
}

impl TransactionState {
    pub fn is_finished(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Position in a transaction that a partial rollback can return to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint {
    txn_id: TxnId,
    lsn: Lsn,
}

impl Savepoint {
    pub fn lsn(&self) -> Lsn {
        self.lsn
    }
}

/// Mutable bookkeeping of a transaction, shared with the transaction table
#[derive(Debug, Clone)]
pub(crate) struct TxnStatus {
    pub(crate) state: TransactionState,
    pub(crate) first_lsn: Lsn,
    pub(crate) last_lsn: Lsn,
    pub(crate) undo_next_lsn: Lsn,
    /// `last_lsn` at the start of each open nested top action
    pub(crate) nested_top_actions: Vec<Lsn>,
}

impl TxnStatus {
    pub(crate) fn new(state: TransactionState) -> Self {
        Self {
            state,
            first_lsn: Lsn::NULL,
            last_lsn: Lsn::NULL,
            undo_next_lsn: Lsn::NULL,
            nested_top_actions: Vec::new(),
        }
    }

    fn record_logged(&mut self, lsn: Lsn, kind: LogRecordKind) {
        if self.first_lsn.is_null() {
            self.first_lsn = lsn;
        }
        self.last_lsn = lsn;
        match kind {
            LogRecordKind::Redo | LogRecordKind::Undoable => self.undo_next_lsn = lsn,
            LogRecordKind::Compensation { undo_next_lsn } | LogRecordKind::NestedTopActionEnd { undo_next_lsn } => {
                self.undo_next_lsn = undo_next_lsn
            }
            _ => {}
        }
    }
}

/// Entry in the transaction table
pub(crate) struct TxnEntry {
    pub(crate) id: TxnId,
    pub(crate) isolation: IsolationMode,
    pub(crate) status: Mutex<TxnStatus>,
}

/// Handle to a running transaction
pub struct Transaction {
    entry: Arc<TxnEntry>,
    manager: Arc<TransactionManager>,
}

impl Transaction {
    pub(crate) fn new(entry: Arc<TxnEntry>, manager: Arc<TransactionManager>) -> Self {
        Self { entry, manager }
    }

    pub fn id(&self) -> TxnId {
        self.entry.id
    }

    /// Owner identity used for latches and locks
    pub fn owner(&self) -> OwnerId {
        self.entry.id
    }

    pub fn isolation(&self) -> IsolationMode {
        self.entry.isolation
    }

    pub fn state(&self) -> TransactionState {
        self.entry.status.lock().state
    }

    pub fn first_lsn(&self) -> Lsn {
        self.entry.status.lock().first_lsn
    }

    pub fn last_lsn(&self) -> Lsn {
        self.entry.status.lock().last_lsn
    }

    pub fn undo_next_lsn(&self) -> Lsn {
        self.entry.status.lock().undo_next_lsn
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Log a redo-only or undoable change to the fixed page, apply it through
    /// the module's redo handler and mark the page dirty.
    pub fn log_insert(&self, bab: &BufferAccessBlock<'_>, record: LogRecord) -> Result<Lsn> {
        match record.kind {
            LogRecordKind::Redo | LogRecordKind::Undoable => self.apply_and_log(bab, record),
            kind => Err(TransactionError::InvalidLogRecord {
                lsn: Lsn::NULL,
                reason: format!("{:?} cannot be logged as a page change", kind),
            }),
        }
    }

    /// Log `record` as the compensation of `undone` against the fixed page.
    /// Undo continues at the compensated record's predecessor.
    pub fn log_compensation(&self, bab: &BufferAccessBlock<'_>, mut record: LogRecord, undone: &LogRecord) -> Result<Lsn> {
        record.kind = LogRecordKind::Compensation {
            undo_next_lsn: undone.prev_lsn,
        };
        self.apply_and_log(bab, record)
    }

    /// Page oriented undo: fix the page `undone` applies to and log `record`
    /// as its compensation.
    pub fn compensate_page(&self, undone: &LogRecord, record: LogRecord) -> Result<Lsn> {
        let page_id = undone.page_id.ok_or_else(|| TransactionError::InvalidLogRecord {
            lsn: undone.lsn,
            reason: "page oriented undo of a record without a page".into(),
        })?;
        let buffers = self.manager.buffers();
        let bab = buffers.fix_exclusive(self.owner(), page_id, false, 0, FixHint::Normal)?;
        self.log_compensation(&bab, record, undone)
    }

    /// Log a change that is not tied to a page and apply it through the
    /// module's global redo.
    pub fn log_global(&self, mut record: LogRecord) -> Result<Lsn> {
        if record.kind != LogRecordKind::Redo {
            return Err(TransactionError::InvalidLogRecord {
                lsn: Lsn::NULL,
                reason: "only redo-only records can be logged without a page".into(),
            });
        }
        let handler = self.manager.handlers().get(record.module_id)?;
        record.page_id = None;
        let lsn = self.append(&mut record)?;
        handler.redo_global(&record)?;
        Ok(lsn)
    }

    fn apply_and_log(&self, bab: &BufferAccessBlock<'_>, mut record: LogRecord) -> Result<Lsn> {
        let handler = self.manager.handlers().get(record.module_id)?;
        record.page_id = Some(bab.page_id());
        let mut page = bab.page_mut()?;
        let mut image = page.clone();
        handler.redo(&mut image, &record)?;
        // Dirty before the record exists, so a checkpoint starting in between
        // either sees the page or begins before the record.
        bab.set_dirty(self.manager.log().next_lsn())?;
        let lsn = self.append(&mut record)?;
        image.set_lsn(lsn);
        *page = image;
        Ok(lsn)
    }

    /// Append a record to this transaction's chain
    fn append(&self, record: &mut LogRecord) -> Result<Lsn> {
        let mut status = self.entry.status.lock();
        if !matches!(status.state, TransactionState::Active | TransactionState::Aborting) {
            return Err(self.invalid_state(status.state, "Active or Aborting"));
        }
        record.txn_id = self.entry.id;
        record.prev_lsn = status.last_lsn;
        let lsn = self.manager.log().insert(record)?;
        status.record_logged(lsn, record.kind);
        Ok(lsn)
    }

    /// Append a transaction control record such as Commit or End
    pub(crate) fn append_control(&self, kind: LogRecordKind) -> Result<Lsn> {
        self.append_control_with(kind, Vec::new())
    }

    fn append_control_with(&self, kind: LogRecordKind, payload: Vec<u8>) -> Result<Lsn> {
        let mut status = self.entry.status.lock();
        let mut record = LogRecord::new(self.entry.id, status.last_lsn, kind);
        record.payload = payload;
        let lsn = self.manager.log().insert(&mut record)?;
        status.record_logged(lsn, kind);
        Ok(lsn)
    }

    pub fn start_nested_top_action(&self) -> Result<()> {
        let mut status = self.entry.status.lock();
        if !matches!(status.state, TransactionState::Active | TransactionState::Aborting) {
            return Err(self.invalid_state(status.state, "Active or Aborting"));
        }
        let start = status.last_lsn;
        status.nested_top_actions.push(start);
        Ok(())
    }

    /// Close the innermost nested top action with a dummy compensation
    /// record, so the records it wrote are never undone.
    pub fn complete_nested_top_action(&self) -> Result<Lsn> {
        let mut status = self.entry.status.lock();
        let Some(start) = status.nested_top_actions.pop() else {
            return Err(TransactionError::NoNestedTopAction(self.entry.id));
        };
        let kind = LogRecordKind::NestedTopActionEnd { undo_next_lsn: start };
        let mut record = LogRecord::new(self.entry.id, status.last_lsn, kind);
        let lsn = self.manager.log().insert(&mut record)?;
        status.record_logged(lsn, kind);
        Ok(lsn)
    }

    pub fn create_savepoint(&self) -> Result<Savepoint> {
        let status = self.entry.status.lock();
        if status.state != TransactionState::Active {
            return Err(self.invalid_state(status.state, "Active"));
        }
        Ok(Savepoint {
            txn_id: self.entry.id,
            lsn: status.last_lsn,
        })
    }

    /// Undo every change made after the savepoint. Locks are retained.
    pub fn rollback_to_savepoint(&self, savepoint: &Savepoint) -> Result<()> {
        {
            let mut status = self.entry.status.lock();
            if savepoint.txn_id != self.entry.id || savepoint.lsn > status.last_lsn {
                return Err(TransactionError::InvalidSavepoint {
                    txn_id: self.entry.id,
                    savepoint: savepoint.lsn,
                });
            }
            if status.state != TransactionState::Active {
                return Err(self.invalid_state(status.state, "Active"));
            }
            status.nested_top_actions.retain(|start| *start < savepoint.lsn);
        }
        self.rollback_to(savepoint.lsn)?;
        debug!("Transaction {} rolled back to savepoint {}", self.entry.id, savepoint.lsn);
        Ok(())
    }

    fn rollback_to(&self, stop: Lsn) -> Result<()> {
        loop {
            let next = self.undo_next_lsn();
            if next <= stop {
                return Ok(());
            }
            let record = self.manager.log().read(next)?;
            self.undo_step(&record)?;
        }
    }

    /// Process one record of the undo chain and advance `undo_next_lsn`
    pub(crate) fn undo_step(&self, record: &LogRecord) -> Result<()> {
        if record.txn_id != self.entry.id {
            return Err(RecoveryError::CorruptLog(format!(
                "record {} of transaction {} found in the chain of transaction {}",
                record.lsn, record.txn_id, self.entry.id
            ))
            .into());
        }
        let next = match record.kind {
            LogRecordKind::Undoable => {
                let handler = self.manager.handlers().get(record.module_id)?;
                handler.undo(self, record)?;
                record.prev_lsn
            }
            LogRecordKind::Compensation { undo_next_lsn } | LogRecordKind::NestedTopActionEnd { undo_next_lsn } => {
                undo_next_lsn
            }
            _ => record.prev_lsn,
        };
        self.entry.status.lock().undo_next_lsn = next;
        Ok(())
    }

    pub fn acquire_lock(&self, lockable: &Lockable, mode: LockMode, duration: LockDuration) -> Result<()> {
        let timeout = self.manager.locks().default_timeout();
        self.acquire_lock_with_timeout(lockable, mode, duration, timeout)
    }

    pub fn acquire_lock_nowait(&self, lockable: &Lockable, mode: LockMode, duration: LockDuration) -> Result<()> {
        self.acquire_lock_with_timeout(lockable, mode, duration, Timeout::NoWait)
    }

    pub fn acquire_lock_with_timeout(
        &self,
        lockable: &Lockable,
        mode: LockMode,
        duration: LockDuration,
        timeout: Timeout,
    ) -> Result<()> {
        self.manager
            .locks()
            .acquire(self.owner(), lockable, mode, duration, timeout)?;
        Ok(())
    }

    /// Release a manual duration lock. Returns `false` when the lock is held
    /// for commit duration or not held.
    pub fn release_lock(&self, lockable: &Lockable) -> Result<bool> {
        Ok(self.manager.locks().release(self.owner(), lockable)?)
    }

    pub fn has_lock(&self, lockable: &Lockable) -> LockMode {
        self.manager.locks().has_lock(self.owner(), lockable)
    }

    /// Vote to commit. The commit or abort that follows is decided elsewhere.
    pub fn prepare(&self) -> Result<()> {
        self.ensure_no_nested_top_action()?;
        {
            let status = self.entry.status.lock();
            if status.state != TransactionState::Active {
                return Err(self.invalid_state(status.state, "Active"));
            }
        }
        // The locks go into the record so restart can hold them again
        let locks = encode_payload(&self.manager.held_locks(self.entry.id))?;
        let lsn = self.append_control_with(LogRecordKind::Prepare, locks)?;
        self.manager.log().flush(lsn)?;
        self.set_state(TransactionState::Prepared);
        info!("Transaction {} prepared at {}", self.entry.id, lsn);
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.ensure_no_nested_top_action()?;
        {
            let mut status = self.entry.status.lock();
            if !matches!(status.state, TransactionState::Active | TransactionState::Prepared) {
                return Err(self.invalid_state(status.state, "Active or Prepared"));
            }
            status.state = TransactionState::Committing;
        }
        let lsn = self.append_control(LogRecordKind::Commit)?;
        self.manager.log().flush(lsn)?;
        self.set_state(TransactionState::Committed);
        self.finish()?;
        debug!("Transaction {} committed at {}", self.entry.id, lsn);
        Ok(())
    }

    pub fn abort(&self) -> Result<()> {
        {
            let mut status = self.entry.status.lock();
            if !matches!(
                status.state,
                TransactionState::Active | TransactionState::Prepared | TransactionState::Aborting
            ) {
                return Err(self.invalid_state(status.state, "Active, Prepared or Aborting"));
            }
            if status.state != TransactionState::Aborting {
                status.state = TransactionState::Aborting;
                status.nested_top_actions.clear();
                drop(status);
                self.append_control(LogRecordKind::Abort)?;
            }
        }
        if let Err(e) = self.rollback_to(Lsn::NULL) {
            warn!("Rollback of transaction {} failed: {}", self.entry.id, e);
            return Err(e);
        }
        self.set_state(TransactionState::Aborted);
        self.finish()?;
        debug!("Transaction {} aborted", self.entry.id);
        Ok(())
    }

    /// Write the End record, release locks and leave the transaction table
    pub(crate) fn finish(&self) -> Result<()> {
        self.append_control(LogRecordKind::End)?;
        self.manager.locks().release_all(self.owner());
        self.manager.forget(self.entry.id);
        Ok(())
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        self.entry.status.lock().state = state;
    }

    fn ensure_no_nested_top_action(&self) -> Result<()> {
        if self.entry.status.lock().nested_top_actions.is_empty() {
            Ok(())
        } else {
            Err(TransactionError::NestedTopActionOpen(self.entry.id))
        }
    }

    fn invalid_state(&self, state: TransactionState, expected: &'static str) -> TransactionError {
        TransactionError::InvalidState {
            txn_id: self.entry.id,
            state,
            expected,
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.entry.status.lock();
        f.debug_struct("Transaction")
            .field("id", &self.entry.id)
            .field("state", &status.state)
            .field("last_lsn", &status.last_lsn)
            .field("isolation", &self.entry.isolation)
            .finish()
    }
}
