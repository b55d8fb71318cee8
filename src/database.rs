// SimpleDBM Database
//
// Owns one instance of every component. Opening a database always runs
// restart recovery before the background workers start and before any
// transaction can begin.

use std::sync::Arc;

use log::{info, warn};

use crate::common::config::DatabaseConfig;
use crate::common::registry::ObjectRegistry;
use crate::common::stats::StatisticSnapshot;
use crate::concurrency::LockManager;
use crate::index::btree::{BTreeIndex, BTreeManager, BTreeResult};
use crate::storage::buffer::BufferManager;
use crate::storage::disk::{FileStorageContainerFactory, StorageManager};
use crate::storage::fsm::FreeSpaceManager;
use crate::transaction::wal::LogManager;
use crate::transaction::{
    HandlerRegistry, IsolationMode, RestartSummary, Result, Transaction, TransactionManager,
};

pub struct Database {
    config: DatabaseConfig,
    registry: Arc<ObjectRegistry>,
    storage: Arc<StorageManager>,
    log: Arc<LogManager>,
    buffers: Arc<BufferManager>,
    locks: Arc<LockManager>,
    transactions: Arc<TransactionManager>,
    space: Arc<FreeSpaceManager>,
    btree: BTreeManager,
    restart: RestartSummary,
}

impl Database {
    /// Open the database in `config.data_dir`, creating it when the
    /// directory is empty, and recover it
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        info!("Opening database in {}", config.data_dir.display());
        let factory = FileStorageContainerFactory::new(config.container_dir())?;
        let storage = Arc::new(StorageManager::new(Arc::new(factory)));
        let containers = storage.open_existing()?;

        let registry = Arc::new(ObjectRegistry::with_builtin_factories()?);
        let handlers = Arc::new(HandlerRegistry::new());
        FreeSpaceManager::register_types(&registry, &handlers, storage.clone())?;

        let log = Arc::new(LogManager::open(config.log.clone())?);
        let buffers = Arc::new(BufferManager::new(
            config.buffer_config(),
            storage.clone(),
            log.clone(),
            registry.clone(),
        ));
        let locks = Arc::new(LockManager::new(config.lock_config()));
        let transactions = Arc::new(TransactionManager::new(
            log.clone(),
            buffers.clone(),
            locks.clone(),
            handlers.clone(),
            config.checkpoint.clone(),
        ));
        let space = Arc::new(FreeSpaceManager::new(buffers.clone(), config.space));
        let btree = BTreeManager::new(buffers.clone(), space.clone(), config.btree);
        btree.register_types(&handlers)?;

        let restart = transactions.restart()?;
        if !restart.in_doubt.is_empty() {
            warn!(
                "{} prepared transactions await a decision: {:?}",
                restart.in_doubt.len(),
                restart.in_doubt
            );
        }

        log.start()?;
        buffers.start()?;
        transactions.start()?;
        info!("Database open with {} containers", containers);

        Ok(Self {
            config,
            registry,
            storage,
            log,
            buffers,
            locks,
            transactions,
            space,
            btree,
            restart,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn begin(&self, isolation: IsolationMode) -> Result<Transaction> {
        self.transactions.begin(isolation)
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
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

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn space(&self) -> &Arc<FreeSpaceManager> {
        &self.space
    }

    pub fn btree(&self) -> &BTreeManager {
        &self.btree
    }

    pub fn open_index(&self, container_id: i32) -> BTreeResult<BTreeIndex> {
        self.btree.open_index(container_id)
    }

    /// What the restart at open found
    pub fn restart_summary(&self) -> &RestartSummary {
        &self.restart
    }

    /// Transactions left prepared by the previous run
    pub fn in_doubt(&self) -> Vec<Transaction> {
        self.transactions.in_doubt()
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.transactions.checkpoint()?;
        Ok(())
    }

    pub fn statistics(&self) -> Vec<StatisticSnapshot> {
        let mut stats = self.log.statistics();
        stats.extend(self.buffers.statistics());
        stats.extend(self.locks.statistics());
        stats.extend(self.transactions.statistics());
        stats
    }

    /// Stop the background workers, write every dirty page and leave a
    /// checkpoint so the next open has nothing to redo
    pub fn shutdown(self) -> Result<()> {
        info!("Shutting down database in {}", self.config.data_dir.display());
        self.transactions.shutdown()?;
        self.buffers.shutdown()?;
        self.transactions.checkpoint()?;
        self.log.shutdown()?;
        info!("Database shut down");
        Ok(())
    }
}
