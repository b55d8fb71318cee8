use thiserror::Error;

use crate::common::types::OwnerId;
use crate::concurrency::lock_manager::Lockable;
use crate::concurrency::mode::LockMode;

/// Protocol violations detected by a request queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Owner {0} does not hold the requested object")]
    NotHeld(OwnerId),
    #[error("Invalid request for upgrade by owner {0}: no prior hold")]
    InvalidUpgrade(OwnerId),
    #[error("Owner {0} already has a pending request")]
    RequestPending(OwnerId),
    #[error("Invalid downgrade request from {held} to {requested}")]
    InvalidDowngrade { held: LockMode, requested: LockMode },
    #[error("Request cannot be granted without waiting")]
    WouldBlock,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LatchError {
    #[error("Timed out acquiring latch in {mode} mode for owner {owner}")]
    Timeout { owner: OwnerId, mode: LockMode },
    #[error(transparent)]
    Protocol(QueueError),
}

impl From<QueueError> for LatchError {
    fn from(err: QueueError) -> Self {
        LatchError::Protocol(err)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock request for {lockable} in {mode} mode by owner {owner} timed out")]
    Timeout { owner: OwnerId, lockable: Lockable, mode: LockMode },
    #[error("Deadlock detected: owner {owner} waiting for {lockable} in {mode} mode")]
    Deadlock { owner: OwnerId, lockable: Lockable, mode: LockMode },
    #[error(transparent)]
    Protocol(QueueError),
}

impl From<QueueError> for LockError {
    fn from(err: QueueError) -> Self {
        LockError::Protocol(err)
    }
}

impl LatchError {
    /// Contention failures may succeed when retried; protocol errors never do
    pub fn is_retryable(&self) -> bool {
        matches!(self, LatchError::Timeout { .. })
    }
}

impl LockError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::Timeout { .. } | LockError::Deadlock { .. })
    }
}
