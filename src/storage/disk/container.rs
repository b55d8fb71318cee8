use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::storage::disk::error::{ContainerError, Result};

/// Raw byte-addressed persistent storage used for pages and log files
pub trait StorageContainer: Send + Sync {
    fn name(&self) -> &str;

    /// Read into `buf` starting at `position`. Returns the number of bytes
    /// read, which is short only when the container ends first.
    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<usize>;

    fn write_at(&self, position: u64, buf: &[u8]) -> Result<()>;

    /// Force written data to stable storage
    fn flush(&self) -> Result<()>;

    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Creates, opens and removes named containers
pub trait StorageContainerFactory: Send + Sync {
    fn create(&self, name: &str) -> Result<Arc<dyn StorageContainer>>;
    fn open(&self, name: &str) -> Result<Arc<dyn StorageContainer>>;
    fn exists(&self, name: &str) -> bool;
    fn delete(&self, name: &str) -> Result<()>;
    /// Names of all existing containers
    fn list(&self) -> Result<Vec<String>>;
}

/// Container backed by a single file
pub struct FileStorageContainer {
    name: String,
    file: Mutex<File>,
}

impl FileStorageContainer {
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)?;
        Ok(Self {
            name: path.display().to_string(),
            file: Mutex::new(file),
        })
    }
}

impl StorageContainer for FileStorageContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<usize> {
        let mut file = self.file.lock();
        let file_size = file.metadata()?.len();
        if position >= file_size {
            return Ok(0);
        }

        file.seek(SeekFrom::Start(position))?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn write_at(&self, position: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(position))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

/// Factory placing containers as files under a base directory
pub struct FileStorageContainerFactory {
    base_path: PathBuf,
}

impl FileStorageContainerFactory {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }
}

impl StorageContainerFactory for FileStorageContainerFactory {
    fn create(&self, name: &str) -> Result<Arc<dyn StorageContainer>> {
        let path = self.path_of(name);
        if path.exists() {
            return Err(ContainerError::AlreadyExists(name.to_string()));
        }
        Ok(Arc::new(FileStorageContainer::open(path, true)?))
    }

    fn open(&self, name: &str) -> Result<Arc<dyn StorageContainer>> {
        let path = self.path_of(name);
        if !path.exists() {
            return Err(ContainerError::NotFound(name.to_string()));
        }
        Ok(Arc::new(FileStorageContainer::open(path, false)?))
    }

    fn exists(&self, name: &str) -> bool {
        self.path_of(name).exists()
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        if !path.exists() {
            return Err(ContainerError::NotFound(name.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_write_at() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = FileStorageContainerFactory::new(dir.path())?;
        let container = factory.create("data.dat")?;

        container.write_at(100, b"simpledbm")?;
        container.flush()?;
        assert_eq!(container.len()?, 109);

        let mut buf = [0u8; 9];
        assert_eq!(container.read_at(100, &mut buf)?, 9);
        assert_eq!(&buf, b"simpledbm");

        // Reads past the end come back short.
        let mut tail = [0u8; 16];
        assert_eq!(container.read_at(105, &mut tail)?, 4);
        assert_eq!(container.read_at(500, &mut tail)?, 0);
        Ok(())
    }

    #[test]
    fn test_factory_lifecycle() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = FileStorageContainerFactory::new(dir.path())?;
        factory.create("a.dat")?;
        assert!(matches!(factory.create("a.dat"), Err(ContainerError::AlreadyExists(_))));
        assert!(factory.exists("a.dat"));
        assert_eq!(factory.list()?, vec!["a.dat".to_string()]);

        factory.delete("a.dat")?;
        assert!(!factory.exists("a.dat"));
        assert!(matches!(factory.open("a.dat"), Err(ContainerError::NotFound(_))));
        Ok(())
    }
}
