// SimpleDBM Log Manager
//
// LSNs are assigned under the append mutex, which linearizes all inserts.
// Writing happens under a separate flush mutex so inserts can continue while
// a batch is going to disk.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{error, info};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::stats::{Statistic, StatisticSnapshot};
use crate::common::types::Lsn;
use crate::common::worker::BackgroundWorker;
use crate::transaction::wal::log_buffer::{LogBuffer, LogBufferConfig};
use crate::transaction::wal::log_components::log_file_error::LogFileError;
use crate::transaction::wal::log_components::log_file_header::LogFileHeader;
use crate::transaction::wal::log_components::log_file_manager::{LogFileManager, LogFiles};
use crate::transaction::wal::log_components::log_file_utils::{encode_frame, FRAME_HEADER_SIZE};
use crate::transaction::wal::log_components::log_iterator::LogRecordIterator;
use crate::transaction::wal::log_record::{LogRecord, LogRecordError};

/// Error type for log manager operations
#[derive(Error, Debug)]
pub enum LogManagerError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Log file error: {0}")]
    File(#[from] LogFileError),

    #[error("Log record error: {0}")]
    Record(#[from] LogRecordError),

    #[error("No log record at {0}")]
    RecordNotFound(Lsn),

    #[error("Corrupt log: {0}")]
    Corrupt(String),

    #[error("Invalid log state: {0}")]
    InvalidState(String),
}

/// Result type for log manager operations
pub type Result<T> = std::result::Result<T, LogManagerError>;

/// Configuration for the log manager
#[derive(Debug, Clone)]
pub struct LogManagerConfig {
    /// Mirrored log group directories; the first is the primary
    pub log_dirs: Vec<PathBuf>,

    /// Where filled log files are moved
    pub archive_dir: PathBuf,

    /// Base name for log and anchor files
    pub log_file_base_name: String,

    /// Maximum size of a log file before switching to the next index
    pub max_log_file_size: u64,

    /// Number of log files kept in the group directories
    pub online_files: usize,

    /// Log buffer configuration
    pub buffer_config: LogBufferConfig,

    /// Interval of the background flusher
    pub flush_interval: Duration,

    /// Whether to fsync every flush
    pub force_sync: bool,
}

impl Default for LogManagerConfig {
    fn default() -> Self {
        Self {
            log_dirs: vec![PathBuf::from("logs")],
            archive_dir: PathBuf::from("logs/archive"),
            log_file_base_name: "simpledbm".to_string(),
            max_log_file_size: 16 * 1024 * 1024, // 16 MB
            online_files: 4,
            buffer_config: LogBufferConfig::default(),
            flush_interval: Duration::from_millis(200),
            force_sync: true,
        }
    }
}

impl LogManagerConfig {
    /// Single log group and archive placed under `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            log_dirs: vec![dir.join("log")],
            archive_dir: dir.join("archive"),
            ..Self::default()
        }
    }
}

struct AppendState {
    /// Position the next record will occupy
    next: Lsn,
    /// Most recently assigned LSN
    last: Lsn,
    buffer: LogBuffer,
}

struct LogStats {
    inserts: Statistic,
    flushes: Statistic,
    bytes_written: Statistic,
}

/// Manager for write-ahead logging operations
pub struct LogManager {
    config: LogManagerConfig,
    files: Arc<LogFiles>,
    append: Mutex<AppendState>,
    writer: Mutex<LogFileManager>,
    /// Last LSN known to be on disk, as `Lsn::as_u64`
    durable: AtomicU64,
    stats: LogStats,
    flusher: Mutex<Option<BackgroundWorker>>,
}

impl LogManager {
    /// Open the log, creating it if needed
    pub fn open(config: LogManagerConfig) -> Result<Self> {
        if config.max_log_file_size > u32::MAX as u64 {
            return Err(LogManagerError::InvalidState("max_log_file_size must fit in 32 bits".to_string()));
        }
        let files = Arc::new(LogFiles::new(&config.log_dirs, &config.archive_dir, &config.log_file_base_name)?);
        let (writer, next) = LogFileManager::open(files.clone(), config.online_files, config.force_sync)?;

        // Everything before `next` is already in the files.
        let durable = Lsn::new(next.index, 0);
        info!("Log manager opened; next LSN {}", next);

        Ok(Self {
            config,
            files,
            append: Mutex::new(AppendState {
                next,
                last: Lsn::NULL,
                buffer: LogBuffer::new(),
            }),
            writer: Mutex::new(writer),
            durable: AtomicU64::new(durable.as_u64()),
            stats: LogStats {
                inserts: Statistic::new("log.inserts"),
                flushes: Statistic::new("log.flushes"),
                bytes_written: Statistic::new("log.bytes_written"),
            },
            flusher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &LogManagerConfig {
        &self.config
    }

    /// Assign the next LSN to `record` and buffer it
    pub fn insert(&self, record: &mut LogRecord) -> Result<Lsn> {
        let mut state = self.append.lock();
        record.lsn = state.next;
        let mut bytes = record.serialize()?;
        let frame_len = (FRAME_HEADER_SIZE + bytes.len()) as u64;

        let header = LogFileHeader::HEADER_SIZE;
        if state.next.offset as u64 + frame_len > self.config.max_log_file_size && state.next.offset > header {
            state.next = Lsn::new(state.next.index + 1, header);
            record.lsn = state.next;
            bytes = record.serialize()?;
        }

        let lsn = record.lsn;
        state.buffer.push(lsn, encode_frame(&bytes));
        state.last = lsn;
        state.next.offset = (lsn.offset as u64 + frame_len).min(u32::MAX as u64) as u32;
        let should_flush = state.buffer.should_flush(&self.config.buffer_config);
        drop(state);

        self.stats.inserts.increment();
        if should_flush {
            self.flush(lsn)?;
        }
        Ok(lsn)
    }

    /// Make every record up to and including `upto` durable
    pub fn flush(&self, upto: Lsn) -> Result<()> {
        if upto <= self.durable_lsn() {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        if upto <= self.durable_lsn() {
            return Ok(());
        }
        let records = self.append.lock().buffer.drain();
        let Some(last) = records.last().map(|r| r.lsn) else {
            return Ok(());
        };
        match writer.write(&records) {
            Ok(bytes) => {
                self.stats.bytes_written.add(bytes);
                self.stats.flushes.increment();
                self.durable.store(last.as_u64(), Ordering::Release);
                Ok(())
            }
            Err(e) => {
                error!("Log flush failed: {}", e);
                self.append.lock().buffer.restore(records);
                Err(e.into())
            }
        }
    }

    pub fn flush_all(&self) -> Result<()> {
        self.flush(self.last_lsn())
    }

    /// LSN of the most recently inserted record, NULL when nothing was
    /// inserted since open
    pub fn last_lsn(&self) -> Lsn {
        self.append.lock().last
    }

    /// LSN the next inserted record will receive, unless a file switch
    /// intervenes
    pub fn next_lsn(&self) -> Lsn {
        self.append.lock().next
    }

    pub fn durable_lsn(&self) -> Lsn {
        Lsn::from_u64(self.durable.load(Ordering::Acquire))
    }

    /// Read the record at `lsn`, whether buffered, online or archived
    pub fn read(&self, lsn: Lsn) -> Result<LogRecord> {
        if let Some(frame) = self.append.lock().buffer.find(lsn) {
            return Ok(LogRecord::deserialize(&frame[FRAME_HEADER_SIZE..])?);
        }
        if lsn > self.durable_lsn() {
            // Wait out a flush that may have drained the record.
            drop(self.writer.lock());
        }
        let bytes = self.files.read_record(lsn)?.ok_or(LogManagerError::RecordNotFound(lsn))?;
        let record = LogRecord::deserialize(&bytes)?;
        if record.lsn != lsn {
            return Err(LogManagerError::Corrupt(format!("record at {} claims lsn {}", lsn, record.lsn)));
        }
        Ok(record)
    }

    /// Iterate over records from `start` in LSN order. `Lsn::NULL` starts at
    /// the oldest available record.
    pub fn iter_from(&self, start: Lsn) -> Result<LogRecordIterator> {
        self.flush_all()?;
        let last_index = self.writer.lock().current_index();
        LogRecordIterator::new(self.files.clone(), start, last_index)
    }

    /// LSN of the last completed checkpoint recorded in the anchor
    pub fn checkpoint_lsn(&self) -> Lsn {
        self.writer.lock().anchor().checkpoint_lsn
    }

    pub fn set_checkpoint_lsn(&self, lsn: Lsn) -> Result<()> {
        self.flush(lsn)?;
        self.writer.lock().set_checkpoint(lsn)?;
        Ok(())
    }

    /// Start the background flusher
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut flusher = self.flusher.lock();
        if flusher.is_some() {
            return Ok(());
        }
        let log = Arc::downgrade(self);
        *flusher = Some(BackgroundWorker::spawn("log-flusher", self.config.flush_interval, move || {
            if let Some(log) = log.upgrade() {
                if let Err(e) = log.flush_all() {
                    error!("Background log flush failed: {}", e);
                }
            }
        })?);
        Ok(())
    }

    /// Stop the flusher and force everything to disk
    pub fn shutdown(&self) -> Result<()> {
        if let Some(flusher) = self.flusher.lock().take() {
            flusher.stop();
        }
        self.flush_all()?;
        self.writer.lock().sync()?;
        info!("Log manager shut down at {}", self.durable_lsn());
        Ok(())
    }

    pub fn statistics(&self) -> Vec<StatisticSnapshot> {
        vec![
            self.stats.inserts.snapshot(),
            self.stats.flushes.snapshot(),
            self.stats.bytes_written.snapshot(),
        ]
    }
}
