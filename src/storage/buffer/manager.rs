// SimpleDBM Buffer Manager
//
// A fixed set of frames caching container pages. The pool mutex guards the
// page table and frame metadata only; page contents are guarded by each
// frame's latch, and the frame's RwLock write side is taken only by the
// holder of an exclusive latch.

mod basic_operations;
mod flushing;
mod frame_management;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::common::registry::ObjectRegistry;
use crate::common::stats::{Statistic, StatisticSnapshot};
use crate::common::types::{FrameId, Lsn, OwnerId, Page, PageId};
use crate::common::worker::BackgroundWorker;
use crate::concurrency::{Latch, LatchConfig};
use crate::storage::buffer::error::Result;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::StorageManager;
use crate::transaction::wal::LogManager;

/// Latch owner used by the buffer writer
pub(crate) const BUFFER_WRITER: OwnerId = u64::MAX - 1;

/// Configuration for the buffer pool
#[derive(Debug, Clone)]
pub struct BufferManagerConfig {
    /// Number of frames
    pub pool_size: usize,
    /// Interval of the background buffer writer
    pub writer_interval: Duration,
    /// Configuration of the page latches
    pub latch: LatchConfig,
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        Self {
            pool_size: 1000,
            writer_interval: Duration::from_secs(1),
            latch: LatchConfig::default(),
        }
    }
}

/// A dirty page and the oldest change not yet on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyPageInfo {
    pub page_id: PageId,
    pub recovery_lsn: Lsn,
}

pub(crate) struct Frame {
    pub(crate) latch: Latch,
    pub(crate) page: RwLock<Page>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameMeta {
    pub(crate) page_id: Option<PageId>,
    pub(crate) pin_count: u32,
    pub(crate) dirty: bool,
    pub(crate) recovery_lsn: Lsn,
    /// The frame is being read or written outside the pool mutex
    pub(crate) io_in_progress: bool,
}

pub(crate) struct PoolState {
    pub(crate) page_table: HashMap<PageId, FrameId>,
    pub(crate) free_list: VecDeque<FrameId>,
    pub(crate) replacer: LruReplacer,
    pub(crate) meta: Vec<FrameMeta>,
    /// Dirty victims being written back before their frame is reused, with
    /// their recovery LSNs. They stay in the dirty page table until written.
    pub(crate) evicting: HashMap<PageId, Lsn>,
}

pub(crate) struct BufferStats {
    pub(crate) fixes: Statistic,
    pub(crate) hits: Statistic,
    pub(crate) misses: Statistic,
    pub(crate) evictions: Statistic,
    pub(crate) writes: Statistic,
}

pub struct BufferManager {
    pub(crate) config: BufferManagerConfig,
    pub(crate) frames: Vec<Frame>,
    pub(crate) state: Mutex<PoolState>,
    /// Signalled whenever a frame's I/O completes
    pub(crate) io_done: Condvar,
    pub(crate) storage: Arc<StorageManager>,
    pub(crate) log: Arc<LogManager>,
    pub(crate) registry: Arc<ObjectRegistry>,
    pub(crate) stats: BufferStats,
    writer: Mutex<Option<BackgroundWorker>>,
}

impl BufferManager {
    pub fn new(
        config: BufferManagerConfig,
        storage: Arc<StorageManager>,
        log: Arc<LogManager>,
        registry: Arc<ObjectRegistry>,
    ) -> Self {
        let pool_size = config.pool_size.max(1);
        let frames = (0..pool_size)
            .map(|_| Frame {
                latch: Latch::with_config(config.latch),
                page: RwLock::new(Page::new(PageId::new(-1, -1))),
            })
            .collect();

        Self {
            config,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list: (0..pool_size).collect(),
                replacer: LruReplacer::new(),
                meta: vec![FrameMeta::default(); pool_size],
                evicting: HashMap::new(),
            }),
            io_done: Condvar::new(),
            storage,
            log,
            registry,
            stats: BufferStats {
                fixes: Statistic::new("buffer.fixes"),
                hits: Statistic::new("buffer.hits"),
                misses: Statistic::new("buffer.misses"),
                evictions: Statistic::new("buffer.evictions"),
                writes: Statistic::new("buffer.writes"),
            },
            writer: Mutex::new(None),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    /// Start the background buffer writer
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.is_some() {
            return Ok(());
        }
        let manager = Arc::downgrade(self);
        *writer = Some(
            BackgroundWorker::spawn("buffer-writer", self.config.writer_interval, move || {
                if let Some(manager) = manager.upgrade() {
                    if let Err(e) = manager.write_buffers() {
                        error!("Buffer writer failed: {}", e);
                    }
                }
            })
            .map_err(crate::storage::disk::ContainerError::from)?,
        );
        info!("Buffer manager started with {} frames", self.frames.len());
        Ok(())
    }

    /// Stop the writer and write every dirty page
    pub fn shutdown(&self) -> Result<()> {
        if let Some(writer) = self.writer.lock().take() {
            writer.stop();
        }
        self.write_buffers()?;
        let remaining = self.get_dirty_pages().len();
        if remaining > 0 {
            warn!("{} dirty pages still latched at shutdown", remaining);
        }
        self.storage.flush_all()?;
        info!("Buffer manager shut down");
        Ok(())
    }

    pub fn statistics(&self) -> Vec<StatisticSnapshot> {
        vec![
            self.stats.fixes.snapshot(),
            self.stats.hits.snapshot(),
            self.stats.misses.snapshot(),
            self.stats.evictions.snapshot(),
            self.stats.writes.snapshot(),
        ]
    }
}
