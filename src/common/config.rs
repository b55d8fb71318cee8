// SimpleDBM Database Configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::concurrency::{LatchConfig, LockManagerConfig, Timeout};
use crate::index::btree::BTreeConfig;
use crate::storage::buffer::BufferManagerConfig;
use crate::storage::fsm::SpaceManagerConfig;
use crate::transaction::wal::LogManagerConfig;
use crate::transaction::CheckpointConfig;

/// Everything needed to open a database. Component configurations are
/// derived from it so the layout of the directory stays in one place.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Root directory; containers live in `data/`, the log in `log/`
    pub data_dir: PathBuf,
    /// Number of buffer pool frames
    pub buffer_pool_size: usize,
    pub log: LogManagerConfig,
    pub checkpoint: CheckpointConfig,
    pub latch: LatchConfig,
    /// Default timeout for lock requests
    pub lock_timeout: Timeout,
    pub deadlock_detection: bool,
    pub btree: BTreeConfig,
    pub space: SpaceManagerConfig,
    /// Interval of the background buffer writer
    pub writer_interval: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_dir("simpledbm")
    }
}

impl DatabaseConfig {
    /// Default configuration rooted at `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let locks = LockManagerConfig::default();
        Self {
            data_dir: dir.to_path_buf(),
            buffer_pool_size: 1000,
            log: LogManagerConfig::in_dir(dir),
            checkpoint: CheckpointConfig::default(),
            latch: LatchConfig::default(),
            lock_timeout: locks.default_timeout,
            deadlock_detection: locks.deadlock_detection,
            btree: BTreeConfig::default(),
            space: SpaceManagerConfig::default(),
            writer_interval: Duration::from_secs(1),
        }
    }

    pub fn container_dir(&self) -> PathBuf {
        self.data_dir.join("data")
    }

    pub fn buffer_config(&self) -> BufferManagerConfig {
        BufferManagerConfig {
            pool_size: self.buffer_pool_size,
            writer_interval: self.writer_interval,
            latch: self.latch,
        }
    }

    pub fn lock_config(&self) -> LockManagerConfig {
        LockManagerConfig {
            default_timeout: self.lock_timeout,
            deadlock_detection: self.deadlock_detection,
        }
    }

    pub fn with_buffer_pool_size(mut self, frames: usize) -> Self {
        self.buffer_pool_size = frames;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Timeout) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint.interval = interval;
        self
    }
}
