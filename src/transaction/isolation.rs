// SimpleDBM Isolation Policies
//
// Maps an isolation mode onto the locking rules used by readers of
// locations. Writers always take commit duration locks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::concurrency::{LockDuration, LockMode, Lockable};
use crate::transaction::error::Result;
use crate::transaction::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IsolationMode {
    /// Read locks are released as soon as the row has been read
    ReadCommitted,
    /// The row under the cursor stays locked until the cursor moves
    #[default]
    CursorStability,
    /// Read locks are held until the transaction ends
    RepeatableRead,
    /// Like RepeatableRead, and the end of a scanned range is locked as well
    Serializable,
}

impl IsolationMode {
    /// Duration of the lock taken on a location before it is read
    pub fn read_lock_duration(self) -> LockDuration {
        match self {
            IsolationMode::ReadCommitted | IsolationMode::CursorStability => LockDuration::Manual,
            IsolationMode::RepeatableRead | IsolationMode::Serializable => LockDuration::Commit,
        }
    }

    pub fn releases_after_read(self) -> bool {
        self == IsolationMode::ReadCommitted
    }

    pub fn releases_after_cursor_moved(self) -> bool {
        self == IsolationMode::CursorStability
    }

    /// Whether a scan reaching the end of an index locks the end position
    pub fn locks_range_end(self) -> bool {
        self == IsolationMode::Serializable
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationMode::ReadCommitted => "read-committed",
            IsolationMode::CursorStability => "cursor-stability",
            IsolationMode::RepeatableRead => "repeatable-read",
            IsolationMode::Serializable => "serializable",
        };
        f.write_str(name)
    }
}

impl FromStr for IsolationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read-committed" | "rc" => Ok(IsolationMode::ReadCommitted),
            "cursor-stability" | "cs" => Ok(IsolationMode::CursorStability),
            "repeatable-read" | "rr" => Ok(IsolationMode::RepeatableRead),
            "serializable" | "ser" => Ok(IsolationMode::Serializable),
            other => Err(format!("unknown isolation mode '{}'", other)),
        }
    }
}

/// Lock a location for reading under the transaction's isolation mode
pub fn lock_location(trx: &Transaction, location: &Lockable, mode: LockMode) -> Result<()> {
    let duration = if mode == LockMode::Exclusive {
        LockDuration::Commit
    } else {
        trx.isolation().read_lock_duration()
    };
    trx.acquire_lock(location, mode, duration)
}

pub fn lock_location_nowait(trx: &Transaction, location: &Lockable, mode: LockMode) -> Result<()> {
    let duration = if mode == LockMode::Exclusive {
        LockDuration::Commit
    } else {
        trx.isolation().read_lock_duration()
    };
    trx.acquire_lock_nowait(location, mode, duration)
}

pub fn lock_container(trx: &Transaction, container_id: i32, mode: LockMode, duration: LockDuration) -> Result<()> {
    trx.acquire_lock(&Lockable::Container(container_id), mode, duration)
}

/// Called once the row at `location` has been read
pub fn unlock_location_after_read(trx: &Transaction, location: &Lockable) -> Result<()> {
    if trx.isolation().releases_after_read() {
        trx.release_lock(location)?;
    }
    Ok(())
}

/// Called when a cursor leaves the row at `location`
pub fn unlock_location_after_cursor_moved(trx: &Transaction, location: &Lockable) -> Result<()> {
    if trx.isolation().releases_after_cursor_moved() {
        trx.release_lock(location)?;
    }
    Ok(())
}

pub fn find_location_lock(trx: &Transaction, location: &Lockable) -> LockMode {
    trx.has_lock(location)
}

pub fn find_container_lock(trx: &Transaction, container_id: i32) -> LockMode {
    trx.has_lock(&Lockable::Container(container_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lock_durations() {
        assert_eq!(IsolationMode::ReadCommitted.read_lock_duration(), LockDuration::Manual);
        assert_eq!(IsolationMode::CursorStability.read_lock_duration(), LockDuration::Manual);
        assert_eq!(IsolationMode::RepeatableRead.read_lock_duration(), LockDuration::Commit);
        assert!(IsolationMode::Serializable.locks_range_end());
        assert!(!IsolationMode::RepeatableRead.locks_range_end());
    }

    #[test]
    fn test_parse_isolation_mode() {
        assert_eq!("rc".parse::<IsolationMode>().unwrap(), IsolationMode::ReadCommitted);
        assert_eq!(
            "Serializable".parse::<IsolationMode>().unwrap(),
            IsolationMode::Serializable
        );
        assert!("snapshot".parse::<IsolationMode>().is_err());
        assert_eq!(IsolationMode::default().to_string(), "cursor-stability");
    }
}
