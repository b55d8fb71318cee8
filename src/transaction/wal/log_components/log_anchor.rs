// SimpleDBM Log Anchor
//
// Control file kept in every log group directory. It is replaced atomically
// by writing a temporary file and renaming it over the old one.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use super::log_file_error::{LogFileError, Result};
use super::log_file_utils::anchor_file_name;
use crate::common::types::Lsn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAnchor {
    pub version: u32,
    /// Log file receiving new records
    pub current_index: u32,
    /// Highest log file index moved to the archive, 0 if none
    pub archived_through: u32,
    /// LSN of the last completed checkpoint's begin record
    pub checkpoint_lsn: Lsn,
}

impl LogAnchor {
    pub const VERSION: u32 = 1;

    pub fn new(current_index: u32) -> Self {
        Self {
            version: Self::VERSION,
            current_index,
            archived_through: 0,
            checkpoint_lsn: Lsn::NULL,
        }
    }

    fn path_in(dir: &Path, base_name: &str) -> PathBuf {
        dir.join(anchor_file_name(base_name))
    }

    /// Write the anchor to every group directory
    pub fn store(&self, dirs: &[PathBuf], base_name: &str) -> Result<()> {
        let bytes = bincode::serialize(self).map_err(|e| LogFileError::InvalidAnchor(e.to_string()))?;
        for dir in dirs {
            let path = Self::path_in(dir, base_name);
            let tmp = path.with_extension("anchor.tmp");
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)?;
        }
        Ok(())
    }

    /// Read the anchor from the first group directory holding a valid copy
    pub fn load(dirs: &[PathBuf], base_name: &str) -> Result<Option<Self>> {
        for dir in dirs {
            let path = Self::path_in(dir, base_name);
            if !path.exists() {
                continue;
            }
            let bytes = fs::read(&path)?;
            match bincode::deserialize::<LogAnchor>(&bytes) {
                Ok(anchor) if anchor.version == Self::VERSION => return Ok(Some(anchor)),
                Ok(anchor) => warn!("Ignoring anchor {} with version {}", path.display(), anchor.version),
                Err(e) => warn!("Ignoring unreadable anchor {}: {}", path.display(), e),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_anchor_mirrored_store_and_load() -> Result<()> {
        let a = TempDir::new()?;
        let b = TempDir::new()?;
        let dirs = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        assert_eq!(LogAnchor::load(&dirs, "log")?, None);

        let mut anchor = LogAnchor::new(3);
        anchor.checkpoint_lsn = Lsn::new(3, 128);
        anchor.store(&dirs, "log")?;

        // A damaged primary copy falls back to the mirror.
        fs::write(a.path().join("log.anchor"), b"junk")?;
        assert_eq!(LogAnchor::load(&dirs, "log")?, Some(anchor));
        Ok(())
    }
}
