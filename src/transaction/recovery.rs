// SimpleDBM Restart Recovery
//
// Three passes over the log:
//   analysis - from the last checkpoint, rebuild the transaction table and
//              the dirty page table
//   redo     - from the oldest recovery LSN, repeat history for every page
//              whose LSN shows the change is missing
//   undo     - roll back every loser, always undoing the highest LSN first

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, error, info};

use crate::common::types::{Lsn, OwnerId, PageId, TxnId};
use crate::concurrency::{LockDuration, Timeout};
use crate::storage::buffer::{BufferAccessBlock, BufferPoolError, DirtyPageInfo, FixHint};
use crate::transaction::checkpoint::{CheckpointData, TransactionTableEntry};
use crate::transaction::error::{RecoveryError, Result, TransactionError};
use crate::transaction::isolation::IsolationMode;
use crate::transaction::manager::TransactionManager;
use crate::transaction::transaction::{Transaction, TransactionState, TxnStatus};
use crate::transaction::wal::{LogRecord, LogRecordKind};

/// Latch owner used while repeating history
pub(crate) const RECOVERY_OWNER: OwnerId = u64::MAX - 2;

/// What restart found and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartSummary {
    pub analysis_start: Lsn,
    pub redo_start: Lsn,
    pub end_of_log: Lsn,
    pub records_redone: usize,
    pub losers: Vec<TxnId>,
    pub in_doubt: Vec<TxnId>,
}

#[derive(Default)]
struct Analysis {
    transactions: HashMap<TxnId, TransactionTableEntry>,
    ended: HashSet<TxnId>,
    dirty_pages: HashMap<PageId, Lsn>,
    max_txn_id: TxnId,
}

impl Analysis {
    fn entry(&mut self, record: &LogRecord) -> &mut TransactionTableEntry {
        self.transactions
            .entry(record.txn_id)
            .or_insert_with(|| TransactionTableEntry {
                txn_id: record.txn_id,
                state: TransactionState::Active,
                isolation: IsolationMode::default(),
                first_lsn: record.lsn,
                last_lsn: record.lsn,
                undo_next_lsn: record.lsn,
                locks: Vec::new(),
            })
    }

    fn track(&mut self, record: &LogRecord) -> Result<()> {
        match record.kind {
            LogRecordKind::CheckpointBegin => return Ok(()),
            LogRecordKind::CheckpointEnd => {
                let data: CheckpointData = record.decode()?;
                self.merge_checkpoint(data);
                return Ok(());
            }
            _ => {}
        }
        if record.txn_id == 0 {
            return Err(RecoveryError::CorruptLog(format!(
                "record {} of kind {:?} has no transaction",
                record.lsn, record.kind
            ))
            .into());
        }
        self.max_txn_id = self.max_txn_id.max(record.txn_id);

        if record.kind == LogRecordKind::End {
            self.transactions.remove(&record.txn_id);
            self.ended.insert(record.txn_id);
            return Ok(());
        }
        let entry = self.entry(record);
        entry.last_lsn = record.lsn;
        match record.kind {
            LogRecordKind::Redo | LogRecordKind::Undoable => entry.undo_next_lsn = record.lsn,
            LogRecordKind::Compensation { undo_next_lsn } | LogRecordKind::NestedTopActionEnd { undo_next_lsn } => {
                entry.undo_next_lsn = undo_next_lsn
            }
            LogRecordKind::Prepare => {
                entry.state = TransactionState::Prepared;
                entry.locks = record.decode()?;
            }
            LogRecordKind::Commit => entry.state = TransactionState::Committed,
            LogRecordKind::Abort => entry.state = TransactionState::Aborting,
            _ => {}
        }

        if record.is_redoable() {
            if let Some(page_id) = record.page_id {
                self.dirty_pages.entry(page_id).or_insert(record.lsn);
            }
        }
        Ok(())
    }

    fn merge_checkpoint(&mut self, data: CheckpointData) {
        self.max_txn_id = self.max_txn_id.max(data.next_txn_id.saturating_sub(1));
        for saved in data.transactions {
            if self.ended.contains(&saved.txn_id) {
                continue;
            }
            match self.transactions.get_mut(&saved.txn_id) {
                Some(entry) => {
                    entry.first_lsn = entry.first_lsn.min(saved.first_lsn);
                    entry.isolation = saved.isolation;
                    if entry.state == TransactionState::Active {
                        entry.state = saved.state;
                    }
                    if entry.locks.is_empty() {
                        entry.locks = saved.locks;
                    }
                }
                None => {
                    self.transactions.insert(saved.txn_id, saved);
                }
            }
        }
        for page in data.dirty_pages {
            let lsn = self.dirty_pages.entry(page.page_id).or_insert(page.recovery_lsn);
            if page.recovery_lsn < *lsn {
                *lsn = page.recovery_lsn;
            }
        }
    }
}

impl TransactionManager {
    /// Bring the database to a consistent state after a crash or a clean
    /// shutdown. Must run before any new transaction begins.
    pub fn restart(self: &Arc<Self>) -> Result<RestartSummary> {
        let analysis_start = self.log().checkpoint_lsn();
        info!("Restart analysis from {}", analysis_start);
        let analysis = self.analyze(analysis_start)?;
        self.bump_next_txn_id(analysis.max_txn_id);

        let end_of_log = self.log().next_lsn();
        let redo_start = analysis
            .dirty_pages
            .values()
            .min()
            .copied()
            .unwrap_or(analysis_start);
        info!(
            "Restart redo from {} ({} dirty pages, {} transactions)",
            redo_start,
            analysis.dirty_pages.len(),
            analysis.transactions.len()
        );
        let records_redone = self.redo(&analysis, redo_start, end_of_log)?;

        let dirty: Vec<DirtyPageInfo> = analysis
            .dirty_pages
            .iter()
            .map(|(&page_id, &recovery_lsn)| DirtyPageInfo { page_id, recovery_lsn })
            .collect();
        self.buffers().update_recovery_lsns(&dirty);

        let (losers, in_doubt) = self.undo(analysis.transactions)?;
        self.log().flush_all()?;
        self.checkpoint()?;
        info!(
            "Restart complete: {} records redone, {} losers rolled back, {} in doubt",
            records_redone,
            losers.len(),
            in_doubt.len()
        );
        Ok(RestartSummary {
            analysis_start,
            redo_start,
            end_of_log,
            records_redone,
            losers,
            in_doubt,
        })
    }

    fn analyze(&self, start: Lsn) -> Result<Analysis> {
        let mut analysis = Analysis::default();
        let mut scanned = 0usize;
        for record in self.log().iter_from(start)? {
            let record = record.map_err(|e| RecoveryError::CorruptLog(e.to_string()))?;
            analysis.track(&record)?;
            scanned += 1;
        }
        debug!("Analysis scanned {} records", scanned);
        Ok(analysis)
    }

    fn redo(&self, analysis: &Analysis, start: Lsn, end_of_log: Lsn) -> Result<usize> {
        let mut redone = 0;
        for record in self.log().iter_from(start)? {
            let record = record.map_err(|e| RecoveryError::CorruptLog(e.to_string()))?;
            if !record.is_redoable() {
                continue;
            }
            let handler = self.handlers().get(record.module_id).map_err(|_| RecoveryError::UnknownModule {
                lsn: record.lsn,
                module_id: record.module_id,
            })?;
            match record.page_id {
                None => {
                    handler.redo_global(&record)?;
                    redone += 1;
                }
                Some(page_id) => {
                    let Some(&recovery_lsn) = analysis.dirty_pages.get(&page_id) else {
                        continue;
                    };
                    if record.lsn < recovery_lsn {
                        continue;
                    }
                    let bab = self.fix_for_redo(&record, page_id)?;
                    let page_lsn = bab.page_lsn();
                    if page_lsn >= end_of_log {
                        error!("Page {} is ahead of the log", page_id);
                        return Err(RecoveryError::PageLsnBeyondLog {
                            page_id,
                            page_lsn,
                            end_of_log,
                        }
                        .into());
                    }
                    if page_lsn >= record.lsn {
                        continue;
                    }
                    {
                        let mut page = bab.page_mut()?;
                        if let Some(page_type) = record.page_format {
                            let formatter = self.buffers().registry().page_formatter(page_type)?;
                            page.reset(page_type);
                            page.page_id = page_id;
                            formatter(&mut page);
                        }
                        handler.redo(&mut page, &record)?;
                        page.set_lsn(record.lsn);
                    }
                    bab.set_dirty(record.lsn)?;
                    redone += 1;
                }
            }
        }
        Ok(redone)
    }

    fn fix_for_redo(&self, record: &LogRecord, page_id: PageId) -> Result<BufferAccessBlock<'_>> {
        let buffers = self.buffers();
        match buffers.fix_exclusive(RECOVERY_OWNER, page_id, false, 0, FixHint::Normal) {
            Ok(bab) => Ok(bab),
            Err(BufferPoolError::PageNotFound(_)) => match record.page_format {
                Some(page_type) => Ok(buffers.fix_exclusive(RECOVERY_OWNER, page_id, true, page_type, FixHint::Normal)?),
                None => Err(RecoveryError::MissingPage {
                    page_id,
                    lsn: record.lsn,
                }
                .into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Roll back losers in global LSN order. Returns the losers and the
    /// prepared transactions left in doubt.
    fn undo(self: &Arc<Self>, transactions: HashMap<TxnId, TransactionTableEntry>) -> Result<(Vec<TxnId>, Vec<TxnId>)> {
        let mut losers: HashMap<TxnId, Transaction> = HashMap::new();
        let mut in_doubt = Vec::new();
        let mut pending = BinaryHeap::new();

        let mut entries: Vec<TransactionTableEntry> = transactions.into_values().collect();
        entries.sort_by_key(|e| e.txn_id);
        for entry in entries {
            let status = TxnStatus {
                state: entry.state,
                first_lsn: entry.first_lsn,
                last_lsn: entry.last_lsn,
                undo_next_lsn: entry.undo_next_lsn,
                nested_top_actions: Vec::new(),
            };
            let trx = self.register(entry.txn_id, entry.isolation, status);
            match entry.state {
                TransactionState::Committed => {
                    trx.finish()?;
                }
                TransactionState::Prepared => {
                    for held in &entry.locks {
                        self.locks().acquire(
                            entry.txn_id,
                            &held.lockable,
                            held.mode,
                            LockDuration::Commit,
                            Timeout::NoWait,
                        )?;
                    }
                    info!(
                        "Transaction {} is in doubt, holding {} locks",
                        entry.txn_id,
                        entry.locks.len()
                    );
                    in_doubt.push(entry.txn_id);
                }
                _ => {
                    if entry.state != TransactionState::Aborting {
                        trx.set_state(TransactionState::Aborting);
                        trx.append_control(LogRecordKind::Abort)?;
                    }
                    if !entry.undo_next_lsn.is_null() {
                        pending.push((entry.undo_next_lsn, entry.txn_id));
                    }
                    losers.insert(entry.txn_id, trx);
                }
            }
        }

        let mut loser_ids: Vec<TxnId> = losers.keys().copied().collect();
        loser_ids.sort_unstable();
        if !loser_ids.is_empty() {
            info!("Rolling back {} losers: {:?}", loser_ids.len(), loser_ids);
        }

        while let Some((lsn, txn_id)) = pending.pop() {
            let Some(trx) = losers.get(&txn_id) else {
                continue;
            };
            let record = self.log().read(lsn)?;
            trx.undo_step(&record).map_err(|e| match e {
                TransactionError::Recovery(_) | TransactionError::UnknownModule(_) => e,
                other => TransactionError::Recovery(RecoveryError::UndoFailed {
                    txn_id,
                    lsn,
                    reason: other.to_string(),
                }),
            })?;
            let next = trx.undo_next_lsn();
            if !next.is_null() {
                pending.push((next, txn_id));
            }
        }

        for txn_id in &loser_ids {
            if let Some(trx) = losers.remove(txn_id) {
                trx.set_state(TransactionState::Aborted);
                trx.finish()?;
            }
        }
        Ok((loser_ids, in_doubt))
    }
}
