// SimpleDBM WAL Log File Manager
//
// File operations for the write-ahead log. `LogFiles` locates and reads log
// files across the mirrored groups and the archive; `LogFileManager` is the
// single writer that appends frames, rotates files and archives old ones.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use super::log_anchor::LogAnchor;
use super::log_file_error::{LogFileError, Result};
use super::log_file_header::LogFileHeader;
use super::log_file_utils::{checksum, decode_frame_header, log_file_name, parse_log_file_name, FRAME_HEADER_SIZE};
use crate::common::types::Lsn;
use crate::storage::disk::{FileStorageContainerFactory, StorageContainer, StorageContainerFactory};
use crate::transaction::wal::log_buffer::BufferedRecord;

/// Read access to log files wherever they live
pub struct LogFiles {
    base_name: String,
    group_dirs: Vec<PathBuf>,
    groups: Vec<FileStorageContainerFactory>,
    archive: FileStorageContainerFactory,
}

impl LogFiles {
    pub fn new(group_dirs: &[PathBuf], archive_dir: &Path, base_name: &str) -> Result<Self> {
        if group_dirs.is_empty() {
            return Err(LogFileError::Config("at least one log group is required".to_string()));
        }
        let groups = group_dirs
            .iter()
            .map(|dir| FileStorageContainerFactory::new(dir.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            base_name: base_name.to_string(),
            group_dirs: group_dirs.to_vec(),
            groups,
            archive: FileStorageContainerFactory::new(archive_dir)?,
        })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn group_dirs(&self) -> &[PathBuf] {
        &self.group_dirs
    }

    fn indexes_in(&self, factory: &FileStorageContainerFactory) -> Result<Vec<u32>> {
        let mut indexes: Vec<u32> = factory
            .list()?
            .iter()
            .filter_map(|name| parse_log_file_name(&self.base_name, name))
            .collect();
        indexes.sort_unstable();
        Ok(indexes)
    }

    /// Indexes of the files in the primary group, oldest first
    pub fn online_indexes(&self) -> Result<Vec<u32>> {
        self.indexes_in(&self.groups[0])
    }

    pub fn archived_indexes(&self) -> Result<Vec<u32>> {
        self.indexes_in(&self.archive)
    }

    /// Lowest log file index still available anywhere
    pub fn first_index(&self) -> Result<Option<u32>> {
        let archived = self.archived_indexes()?.first().copied();
        let online = self.online_indexes()?.first().copied();
        Ok(match (archived, online) {
            (Some(a), Some(o)) => Some(a.min(o)),
            (a, o) => a.or(o),
        })
    }

    /// Every copy of a log file: the online mirrors first, then the archive
    pub fn copies(&self, index: u32) -> Result<Vec<Arc<dyn StorageContainer>>> {
        let name = log_file_name(&self.base_name, index);
        let mut copies = Vec::new();
        for factory in self.groups.iter().chain(std::iter::once(&self.archive)) {
            if factory.exists(&name) {
                copies.push(factory.open(&name)?);
            }
        }
        Ok(copies)
    }

    /// Read and verify the record frame at `offset`. Returns `None` where
    /// no valid frame exists, which is how the end of a file is detected.
    pub fn read_frame(container: &dyn StorageContainer, offset: u64) -> Result<Option<Vec<u8>>> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        if container.read_at(offset, &mut header)? < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let Some((len, expected)) = decode_frame_header(&header) else {
            return Ok(None);
        };
        let start = offset + FRAME_HEADER_SIZE as u64;
        if start + len as u64 > container.len()? {
            return Ok(None);
        }
        let mut bytes = vec![0u8; len];
        if container.read_at(start, &mut bytes)? < len || checksum(&bytes) != expected {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    /// Encoded record at `lsn`, trying each copy of its file in turn
    pub fn read_record(&self, lsn: Lsn) -> Result<Option<Vec<u8>>> {
        let copies = self.copies(lsn.index)?;
        if copies.is_empty() {
            return Err(LogFileError::Missing(lsn.index));
        }
        for copy in copies {
            if let Some(bytes) = Self::read_frame(copy.as_ref(), lsn.offset as u64)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

/// The single writer of the log files
pub struct LogFileManager {
    files: Arc<LogFiles>,
    current: Vec<Arc<dyn StorageContainer>>,
    current_index: u32,
    online: VecDeque<u32>,
    anchor: LogAnchor,
    online_files: usize,
    force_sync: bool,
}

impl LogFileManager {
    /// Open the log, creating the first file if there is none. Returns the
    /// manager and the LSN the next record will receive.
    pub fn open(files: Arc<LogFiles>, online_files: usize, force_sync: bool) -> Result<(Self, Lsn)> {
        let anchor = LogAnchor::load(files.group_dirs(), files.base_name())?;
        let mut online: VecDeque<u32> = files.online_indexes()?.into();

        let mut manager = Self {
            files: files.clone(),
            current: Vec::new(),
            current_index: 0,
            online: VecDeque::new(),
            anchor: anchor.clone().unwrap_or_else(|| LogAnchor::new(1)),
            online_files: online_files.max(1),
            force_sync,
        };

        let next = match online.back().copied() {
            None => {
                let index = anchor.map(|a| a.archived_through + 1).unwrap_or(1);
                info!("Creating new log starting at file index {}", index);
                manager.start_file(index)?;
                Lsn::new(index, LogFileHeader::HEADER_SIZE)
            }
            Some(index) => {
                manager.current = manager.open_file(index)?;
                manager.current_index = index;
                manager.online = std::mem::take(&mut online);
                let end = manager.find_end(index)?;
                info!("Opened log at file index {}, next record at {}", index, end);
                Lsn::new(index, end)
            }
        };
        manager.anchor.current_index = manager.current_index;
        manager.store_anchor()?;
        Ok((manager, next))
    }

    pub fn anchor(&self) -> &LogAnchor {
        &self.anchor
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    /// Open a file in every group, repairing a mirror that lost its copy
    fn open_file(&self, index: u32) -> Result<Vec<Arc<dyn StorageContainer>>> {
        let name = log_file_name(self.files.base_name(), index);
        let primary_path = self.files.group_dirs()[0].join(&name);
        let mut containers = Vec::with_capacity(self.files.groups.len());
        for (dir, factory) in self.files.group_dirs().iter().zip(&self.files.groups) {
            if !factory.exists(&name) {
                warn!("Log file {} missing from group {}, restoring from primary", name, dir.display());
                fs::copy(&primary_path, dir.join(&name))?;
            }
            let container = factory.open(&name)?;
            let mut header = [0u8; LogFileHeader::HEADER_SIZE as usize];
            container.read_at(0, &mut header)?;
            let valid = LogFileHeader::from_bytes(&header).is_some_and(|h| h.validate(index));
            if !valid {
                // Torn creation: the file was created but its header never reached disk.
                warn!("Rewriting header of log file {} in {}", name, dir.display());
                container.write_at(0, &LogFileHeader::new(index).to_bytes())?;
            }
            containers.push(container);
        }
        Ok(containers)
    }

    /// Offset just past the last valid frame of a file
    fn find_end(&self, index: u32) -> Result<u32> {
        let mut offset = LogFileHeader::HEADER_SIZE as u64;
        let primary = self.current[0].as_ref();
        while let Some(bytes) = LogFiles::read_frame(primary, offset)? {
            offset += (FRAME_HEADER_SIZE + bytes.len()) as u64;
        }
        debug!("Log file {} ends at offset {}", index, offset);
        Ok(offset as u32)
    }

    fn start_file(&mut self, index: u32) -> Result<()> {
        let name = log_file_name(self.files.base_name(), index);
        let header = LogFileHeader::new(index).to_bytes();
        let mut containers = Vec::with_capacity(self.files.groups.len());
        for factory in &self.files.groups {
            let container = if factory.exists(&name) {
                factory.open(&name)?
            } else {
                factory.create(&name)?
            };
            container.write_at(0, &header)?;
            container.flush()?;
            containers.push(container);
        }
        self.current = containers;
        self.current_index = index;
        self.online.push_back(index);
        Ok(())
    }

    fn rotate_to(&mut self, index: u32) -> Result<()> {
        for container in &self.current {
            container.flush()?;
        }
        self.start_file(index)?;
        self.anchor.current_index = index;
        self.archive_filled()?;
        self.store_anchor()?;
        info!("Log switched to file index {}", index);
        Ok(())
    }

    /// Move filled files beyond the online limit to the archive
    fn archive_filled(&mut self) -> Result<()> {
        while self.online.len() > self.online_files {
            let Some(index) = self.online.pop_front() else {
                break;
            };
            let name = log_file_name(self.files.base_name(), index);
            let source = self.files.group_dirs()[0].join(&name);
            let target = self.files.archive.base_path().join(&name);
            fs::copy(&source, &target)?;
            fs::File::open(&target)?.sync_all()?;
            for factory in &self.files.groups {
                if factory.exists(&name) {
                    factory.delete(&name)?;
                }
            }
            self.anchor.archived_through = index;
            info!("Archived log file {}", name);
        }
        Ok(())
    }

    /// Append buffered frames at their assigned positions in every group
    pub fn write(&mut self, records: &[BufferedRecord]) -> Result<u64> {
        let mut written = 0u64;
        let mut run_start = 0;
        while run_start < records.len() {
            let index = records[run_start].lsn.index;
            if index != self.current_index {
                self.rotate_to(index)?;
            }
            let mut run_end = run_start;
            let mut bytes = Vec::new();
            while run_end < records.len() && records[run_end].lsn.index == index {
                bytes.extend_from_slice(&records[run_end].frame);
                run_end += 1;
            }
            let offset = records[run_start].lsn.offset as u64;
            for container in &self.current {
                container.write_at(offset, &bytes)?;
            }
            written += bytes.len() as u64;
            run_start = run_end;
        }
        if self.force_sync {
            self.sync()?;
        }
        Ok(written)
    }

    pub fn sync(&self) -> Result<()> {
        for container in &self.current {
            container.flush()?;
        }
        Ok(())
    }

    pub fn set_checkpoint(&mut self, lsn: Lsn) -> Result<()> {
        self.anchor.checkpoint_lsn = lsn;
        self.store_anchor()
    }

    fn store_anchor(&self) -> Result<()> {
        self.anchor.store(self.files.group_dirs(), self.files.base_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::wal::log_components::log_file_utils::encode_frame;
    use tempfile::TempDir;

    fn record(index: u32, offset: u32, body: &[u8]) -> BufferedRecord {
        BufferedRecord {
            lsn: Lsn::new(index, offset),
            frame: encode_frame(body),
        }
    }

    #[test]
    fn test_write_rotate_and_archive() -> Result<()> {
        let dir = TempDir::new()?;
        let groups = vec![dir.path().join("g1"), dir.path().join("g2")];
        let files = Arc::new(LogFiles::new(&groups, &dir.path().join("archive"), "log")?);

        let (mut manager, next) = LogFileManager::open(files.clone(), 1, true)?;
        assert_eq!(next, Lsn::new(1, LogFileHeader::HEADER_SIZE));

        manager.write(&[record(1, 16, b"first"), record(2, 16, b"second")])?;
        assert_eq!(manager.current_index(), 2);
        assert_eq!(files.online_indexes()?, vec![2]);
        assert_eq!(files.archived_indexes()?, vec![1]);
        assert_eq!(manager.anchor().archived_through, 1);

        // Archived records stay readable.
        assert_eq!(files.read_record(Lsn::new(1, 16))?, Some(b"first".to_vec()));
        assert_eq!(files.read_record(Lsn::new(2, 16))?, Some(b"second".to_vec()));
        assert!(matches!(files.read_record(Lsn::new(9, 16)), Err(LogFileError::Missing(9))));
        drop(manager);

        // The mirror survives loss of the primary's frame bytes.
        fs::write(groups[0].join("log_000002.log"), LogFileHeader::new(2).to_bytes())?;
        assert_eq!(files.read_record(Lsn::new(2, 16))?, Some(b"second".to_vec()));
        Ok(())
    }

    #[test]
    fn test_reopen_finds_end_of_log() -> Result<()> {
        let dir = TempDir::new()?;
        let groups = vec![dir.path().join("g1")];
        let files = Arc::new(LogFiles::new(&groups, &dir.path().join("archive"), "log")?);
        {
            let (mut manager, _) = LogFileManager::open(files.clone(), 4, true)?;
            manager.write(&[record(1, 16, b"abc")])?;
        }
        let (_, next) = LogFileManager::open(files, 4, true)?;
        assert_eq!(next, Lsn::new(1, 16 + FRAME_HEADER_SIZE as u32 + 3));
        Ok(())
    }
}
