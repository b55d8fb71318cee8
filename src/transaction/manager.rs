// SimpleDBM Transaction Manager
//
// Creates transactions and keeps the transaction table consulted by
// checkpoints and restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};
use parking_lot::Mutex;

use crate::common::stats::{Statistic, StatisticSnapshot};
use crate::common::types::TxnId;
use crate::common::worker::BackgroundWorker;
use crate::concurrency::LockManager;
use crate::storage::buffer::BufferManager;
use crate::transaction::checkpoint::{CheckpointConfig, HeldLock, TransactionTableEntry};
use crate::transaction::error::Result;
use crate::transaction::handler::HandlerRegistry;
use crate::transaction::isolation::IsolationMode;
use crate::transaction::transaction::{Transaction, TransactionState, TxnEntry, TxnStatus};
use crate::transaction::wal::{LogManager, LogRecordKind};

pub(crate) struct TransactionStats {
    pub(crate) begun: Statistic,
    pub(crate) committed: Statistic,
    pub(crate) aborted: Statistic,
    pub(crate) checkpoints: Statistic,
}

pub struct TransactionManager {
    log: Arc<LogManager>,
    buffers: Arc<BufferManager>,
    locks: Arc<LockManager>,
    handlers: Arc<HandlerRegistry>,
    pub(crate) checkpoint_config: CheckpointConfig,
    next_txn_id: AtomicU64,
    table: Mutex<HashMap<TxnId, Arc<TxnEntry>>>,
    /// Serializes checkpoints
    pub(crate) checkpoint_mutex: Mutex<()>,
    pub(crate) checkpointer: Mutex<Option<BackgroundWorker>>,
    pub(crate) stats: TransactionStats,
}

impl TransactionManager {
    pub fn new(
        log: Arc<LogManager>,
        buffers: Arc<BufferManager>,
        locks: Arc<LockManager>,
        handlers: Arc<HandlerRegistry>,
        checkpoint_config: CheckpointConfig,
    ) -> Self {
        Self {
            log,
            buffers,
            locks,
            handlers,
            checkpoint_config,
            next_txn_id: AtomicU64::new(1),
            table: Mutex::new(HashMap::new()),
            checkpoint_mutex: Mutex::new(()),
            checkpointer: Mutex::new(None),
            stats: TransactionStats {
                begun: Statistic::new("txn.begun"),
                committed: Statistic::new("txn.committed"),
                aborted: Statistic::new("txn.aborted"),
                checkpoints: Statistic::new("txn.checkpoints"),
            },
        }
    }

    pub fn log(&self) -> &Arc<LogManager> {
        &self.log
    }

    pub fn buffers(&self) -> &Arc<BufferManager> {
        &self.buffers
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    /// Start a transaction and log its Begin record
    pub fn begin(self: &Arc<Self>, isolation: IsolationMode) -> Result<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let trx = self.register(txn_id, isolation, TxnStatus::new(TransactionState::Active));
        trx.append_control(LogRecordKind::Begin)?;
        self.stats.begun.increment();
        debug!("Began transaction {} ({})", txn_id, isolation);
        Ok(trx)
    }

    /// Add a transaction to the table; used by `begin` and by restart
    pub(crate) fn register(self: &Arc<Self>, txn_id: TxnId, isolation: IsolationMode, status: TxnStatus) -> Transaction {
        let entry = Arc::new(TxnEntry {
            id: txn_id,
            isolation,
            status: Mutex::new(status),
        });
        self.table.lock().insert(txn_id, entry.clone());
        Transaction::new(entry, self.clone())
    }

    /// Remove a finished transaction from the table
    pub(crate) fn forget(&self, txn_id: TxnId) {
        let Some(entry) = self.table.lock().remove(&txn_id) else {
            return;
        };
        match entry.status.lock().state {
            TransactionState::Committed => self.stats.committed.increment(),
            TransactionState::Aborted => self.stats.aborted.increment(),
            _ => {}
        }
    }

    /// Handle to a transaction in the table, for example a prepared
    /// transaction restored by restart
    pub fn get(self: &Arc<Self>, txn_id: TxnId) -> Option<Transaction> {
        let entry = self.table.lock().get(&txn_id).cloned()?;
        Some(Transaction::new(entry, self.clone()))
    }

    /// Transactions left prepared, awaiting a commit or abort decision
    pub fn in_doubt(self: &Arc<Self>) -> Vec<Transaction> {
        let entries: Vec<Arc<TxnEntry>> = self.table.lock().values().cloned().collect();
        let mut in_doubt: Vec<Transaction> = entries
            .into_iter()
            .filter(|entry| entry.status.lock().state == TransactionState::Prepared)
            .map(|entry| Transaction::new(entry, self.clone()))
            .collect();
        in_doubt.sort_by_key(|trx| trx.id());
        in_doubt
    }

    /// Snapshot of the transaction table
    pub fn active_transactions(&self) -> Vec<TransactionTableEntry> {
        let entries: Vec<Arc<TxnEntry>> = self.table.lock().values().cloned().collect();
        let mut snapshot: Vec<TransactionTableEntry> = entries
            .iter()
            .map(|entry| {
                let status = entry.status.lock();
                let locks = if status.state == TransactionState::Prepared {
                    self.held_locks(entry.id)
                } else {
                    Vec::new()
                };
                TransactionTableEntry {
                    txn_id: entry.id,
                    state: status.state,
                    isolation: entry.isolation,
                    first_lsn: status.first_lsn,
                    last_lsn: status.last_lsn,
                    undo_next_lsn: status.undo_next_lsn,
                    locks,
                }
            })
            .collect();
        snapshot.sort_by_key(|e| e.txn_id);
        snapshot
    }

    /// Locks currently held by a transaction
    pub(crate) fn held_locks(&self, txn_id: TxnId) -> Vec<HeldLock> {
        self.locks()
            .held_locks(txn_id)
            .into_iter()
            .map(|(lockable, mode)| HeldLock { lockable, mode })
            .collect()
    }

    pub fn next_txn_id(&self) -> TxnId {
        self.next_txn_id.load(Ordering::SeqCst)
    }

    /// Make sure ids handed out later are above `txn_id`
    pub(crate) fn bump_next_txn_id(&self, txn_id: TxnId) {
        self.next_txn_id.fetch_max(txn_id + 1, Ordering::SeqCst);
    }

    /// Stop the checkpointer and take a final checkpoint
    pub fn shutdown(&self) -> Result<()> {
        if let Some(worker) = self.checkpointer.lock().take() {
            worker.stop();
        }
        let open = self.table.lock().len();
        if open > 0 {
            info!("Shutting down with {} transactions still in the table", open);
        }
        self.checkpoint()?;
        Ok(())
    }

    pub fn statistics(&self) -> Vec<StatisticSnapshot> {
        vec![
            self.stats.begun.snapshot(),
            self.stats.committed.snapshot(),
            self.stats.aborted.snapshot(),
            self.stats.checkpoints.snapshot(),
        ]
    }
}
