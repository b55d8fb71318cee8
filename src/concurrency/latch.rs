// SimpleDBM Latch
//
// A read/write/update latch with explicit owners. An owner may acquire the
// same latch recursively; each acquisition must be matched by a release.

use parking_lot::{Mutex, MutexGuard};

use crate::common::types::OwnerId;
use crate::concurrency::error::{LatchError, QueueError};
use crate::concurrency::mode::{LockMode, Timeout};
use crate::concurrency::queue::{Acquire, RequestQueue, RequestStatus};

/// Configuration for latches created by the buffer manager
#[derive(Debug, Clone, Copy)]
pub struct LatchConfig {
    /// Timeout used by the blocking acquire methods
    pub default_timeout: Timeout,
}

impl Default for LatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: Timeout::Forever,
        }
    }
}

/// Latch supporting shared, update and exclusive modes
#[derive(Debug)]
pub struct Latch {
    queue: Mutex<RequestQueue>,
    default_timeout: Timeout,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    pub fn new() -> Self {
        Self::with_config(LatchConfig::default())
    }

    pub fn with_config(config: LatchConfig) -> Self {
        Self {
            queue: Mutex::new(RequestQueue::new()),
            default_timeout: config.default_timeout,
        }
    }

    /// Acquire the latch in `mode`, waiting at most `timeout`
    pub fn acquire(&self, owner: OwnerId, mode: LockMode, timeout: Timeout) -> Result<(), LatchError> {
        self.do_acquire(owner, mode, false, timeout)
    }

    pub fn acquire_shared(&self, owner: OwnerId) -> Result<(), LatchError> {
        self.acquire(owner, LockMode::Shared, self.default_timeout)
    }

    pub fn acquire_update(&self, owner: OwnerId) -> Result<(), LatchError> {
        self.acquire(owner, LockMode::Update, self.default_timeout)
    }

    pub fn acquire_exclusive(&self, owner: OwnerId) -> Result<(), LatchError> {
        self.acquire(owner, LockMode::Exclusive, self.default_timeout)
    }

    /// `Ok(false)` when another owner holds the latch; misuse is an error
    pub fn try_acquire_shared(&self, owner: OwnerId) -> Result<bool, LatchError> {
        Self::granted(self.acquire(owner, LockMode::Shared, Timeout::NoWait))
    }

    pub fn try_acquire_update(&self, owner: OwnerId) -> Result<bool, LatchError> {
        Self::granted(self.acquire(owner, LockMode::Update, Timeout::NoWait))
    }

    pub fn try_acquire_exclusive(&self, owner: OwnerId) -> Result<bool, LatchError> {
        Self::granted(self.acquire(owner, LockMode::Exclusive, Timeout::NoWait))
    }

    /// Convert a held latch to exclusive mode without adding a hold
    pub fn upgrade_update(&self, owner: OwnerId, timeout: Timeout) -> Result<(), LatchError> {
        self.do_acquire(owner, LockMode::Exclusive, true, timeout)
    }

    pub fn try_upgrade_update(&self, owner: OwnerId) -> Result<bool, LatchError> {
        Self::granted(self.upgrade_update(owner, Timeout::NoWait))
    }

    fn granted(result: Result<(), LatchError>) -> Result<bool, LatchError> {
        match result {
            Ok(()) => Ok(true),
            Err(LatchError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Exclusive to update
    pub fn downgrade_exclusive(&self, owner: OwnerId) -> Result<(), LatchError> {
        self.queue.lock().downgrade(owner, LockMode::Update)?;
        Ok(())
    }

    /// Update to shared
    pub fn downgrade_update(&self, owner: OwnerId) -> Result<(), LatchError> {
        self.queue.lock().downgrade(owner, LockMode::Shared)?;
        Ok(())
    }

    pub fn release(&self, owner: OwnerId) -> Result<(), LatchError> {
        self.queue.lock().release(owner, false)?;
        Ok(())
    }

    /// Current granted mode of the latch
    pub fn mode(&self) -> LockMode {
        self.queue.lock().granted_mode
    }

    /// Mode held by a particular owner
    pub fn held_mode(&self, owner: OwnerId) -> LockMode {
        self.queue.lock().held_mode(owner)
    }

    pub fn is_latched_exclusively(&self) -> bool {
        self.mode() == LockMode::Exclusive
    }

    pub fn is_latched_for_update(&self) -> bool {
        self.mode() == LockMode::Update
    }

    fn do_acquire(
        &self,
        owner: OwnerId,
        mode: LockMode,
        upgrade: bool,
        timeout: Timeout,
    ) -> Result<(), LatchError> {
        let mut queue = self.queue.lock();
        match queue.request(owner, mode, upgrade, !timeout.is_no_wait()) {
            Ok(Acquire::Granted) => Ok(()),
            Ok(Acquire::MustWait) => Self::wait_for_grant(&mut queue, owner, mode, timeout),
            Err(QueueError::WouldBlock) => Err(LatchError::Timeout { owner, mode }),
            Err(err) => Err(err.into()),
        }
    }

    fn wait_for_grant(
        queue: &mut MutexGuard<'_, RequestQueue>,
        owner: OwnerId,
        mode: LockMode,
        timeout: Timeout,
    ) -> Result<(), LatchError> {
        let deadline = timeout.deadline();
        loop {
            let (status, wakeup) = match queue.get(owner) {
                Some(request) => (request.status, request.wakeup.clone()),
                None => return Err(QueueError::NotHeld(owner).into()),
            };
            if status == RequestStatus::Granted {
                return Ok(());
            }
            match deadline {
                None => wakeup.wait(queue),
                Some(deadline) => {
                    if wakeup.wait_until(queue, deadline).timed_out() {
                        if queue.get(owner).map(|r| r.status) == Some(RequestStatus::Granted) {
                            return Ok(());
                        }
                        queue.cancel_wait(owner);
                        return Err(LatchError::Timeout { owner, mode });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_recursive_acquisition() {
        let latch = Latch::new();
        latch.acquire_exclusive(1).unwrap();
        latch.acquire_shared(1).unwrap();
        assert!(latch.is_latched_exclusively());

        latch.release(1).unwrap();
        assert!(latch.is_latched_exclusively());
        latch.release(1).unwrap();
        assert_eq!(latch.mode(), LockMode::None);
        assert!(matches!(latch.release(1), Err(LatchError::Protocol(QueueError::NotHeld(1)))));
    }

    #[test]
    fn test_upgrade_requires_prior_hold() {
        let latch = Latch::new();
        assert_eq!(
            latch.upgrade_update(1, Timeout::NoWait),
            Err(LatchError::Protocol(QueueError::InvalidUpgrade(1)))
        );
        latch.acquire_update(1).unwrap();
        latch.upgrade_update(1, Timeout::NoWait).unwrap();
        assert!(latch.is_latched_exclusively());
        // An upgrade does not add a hold, so one release frees the latch.
        latch.release(1).unwrap();
        assert_eq!(latch.mode(), LockMode::None);
    }

    #[test]
    fn test_update_excludes_update_but_admits_shared() {
        let latch = Latch::new();
        latch.acquire_update(1).unwrap();
        assert_eq!(latch.try_acquire_shared(2), Ok(true));
        assert_eq!(latch.try_acquire_update(3), Ok(false));
        assert_eq!(latch.try_acquire_exclusive(3), Ok(false));
        // Shared holder blocks the upgrade.
        assert_eq!(latch.try_upgrade_update(1), Ok(false));
        assert!(latch.is_latched_for_update());
        latch.release(2).unwrap();
        assert_eq!(latch.try_upgrade_update(1), Ok(true));
        latch.downgrade_exclusive(1).unwrap();
        latch.downgrade_update(1).unwrap();
        assert_eq!(latch.mode(), LockMode::Shared);
    }

    #[test]
    fn test_bounded_wait_times_out() {
        let latch = Latch::new();
        latch.acquire_exclusive(1).unwrap();
        let result = latch.acquire(2, LockMode::Shared, Timeout::After(Duration::from_millis(20)));
        assert_eq!(result, Err(LatchError::Timeout { owner: 2, mode: LockMode::Shared }));
        assert_eq!(latch.held_mode(2), LockMode::None);
        latch.release(1).unwrap();
        assert_eq!(latch.try_acquire_shared(2), Ok(true));
    }

    #[test]
    fn test_try_upgrade_without_hold_is_an_error() {
        let latch = Latch::new();
        assert_eq!(
            latch.try_upgrade_update(1),
            Err(LatchError::Protocol(QueueError::InvalidUpgrade(1)))
        );
        latch.acquire_shared(2).unwrap();
        assert_eq!(latch.try_upgrade_update(1), Err(LatchError::Protocol(QueueError::InvalidUpgrade(1))));
    }

    #[test]
    fn test_timed_out_upgrade_keeps_update_mode() {
        let latch = Latch::new();
        latch.acquire_update(1).unwrap();
        latch.acquire_shared(2).unwrap();

        let result = latch.upgrade_update(1, Timeout::After(Duration::from_millis(20)));
        assert_eq!(result, Err(LatchError::Timeout { owner: 1, mode: LockMode::Exclusive }));
        assert_eq!(latch.held_mode(1), LockMode::Update);
        assert!(latch.is_latched_for_update());
        // Still one hold each; a newcomer may share with them
        assert_eq!(latch.try_acquire_shared(3), Ok(true));
        latch.release(3).unwrap();

        latch.release(2).unwrap();
        latch.upgrade_update(1, Timeout::NoWait).unwrap();
        assert!(latch.is_latched_exclusively());
        latch.release(1).unwrap();
        assert_eq!(latch.mode(), LockMode::None);
    }

    #[test]
    fn test_waiter_is_woken_on_release() {
        let latch = Arc::new(Latch::new());
        latch.acquire_exclusive(1).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let latch = latch.clone();
            let acquired = acquired.clone();
            thread::spawn(move || {
                latch.acquire_shared(2).unwrap();
                acquired.store(true, Ordering::SeqCst);
                latch.release(2).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!acquired.load(Ordering::SeqCst));
        latch.release(1).unwrap();
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(latch.mode(), LockMode::None);
    }

    #[test]
    fn test_granted_mode_is_max_of_holders_under_contention() {
        let latch = Arc::new(Latch::new());
        let mut handles = Vec::new();
        for owner in 1..=8u64 {
            let latch = latch.clone();
            handles.push(thread::spawn(move || {
                for round in 0..200 {
                    let mode = match (owner + round) % 3 {
                        0 => LockMode::Shared,
                        1 => LockMode::Update,
                        _ => LockMode::Exclusive,
                    };
                    latch.acquire(owner, mode, Timeout::Forever).unwrap();
                    let granted = latch.mode();
                    assert!(granted >= mode);
                    if mode == LockMode::Exclusive {
                        assert_eq!(granted, LockMode::Exclusive);
                    }
                    latch.release(owner).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(latch.mode(), LockMode::None);
    }
}
