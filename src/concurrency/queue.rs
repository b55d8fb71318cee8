// SimpleDBM Request Queue
//
// Grant protocol shared by latches and locks. Granted and converting
// requests precede waiting ones; waiters are granted in FIFO order, and a
// pending conversion blocks every waiter behind it.

use std::sync::Arc;

use parking_lot::Condvar;

use crate::common::types::OwnerId;
use crate::concurrency::error::QueueError;
use crate::concurrency::mode::LockMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestStatus {
    Granted,
    Waiting,
    Converting,
}

#[derive(Debug)]
pub(crate) struct LockRequest {
    pub owner: OwnerId,
    /// Mode currently granted (or requested, while waiting)
    pub mode: LockMode,
    /// Mode requested by a pending conversion
    pub convert_mode: LockMode,
    /// Number of times the owner acquired this object
    pub count: u32,
    pub status: RequestStatus,
    /// Conversion requested as an upgrade, which does not bump the count
    pub upgrading: bool,
    pub wakeup: Arc<Condvar>,
}

impl LockRequest {
    fn new(owner: OwnerId, mode: LockMode, status: RequestStatus) -> Self {
        Self {
            owner,
            mode,
            convert_mode: mode,
            count: 1,
            status,
            upgrading: false,
            wakeup: Arc::new(Condvar::new()),
        }
    }
}

/// Outcome of a request that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    Granted,
    MustWait,
}

/// Outcome of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Released {
    /// The owner still holds the object with a lower count
    Decremented,
    /// The owner's request was removed
    Removed,
}

/// Saved state of a granted request, used to undo an instant-duration grant
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrantState {
    pub mode: LockMode,
    pub count: u32,
}

#[derive(Debug)]
pub(crate) struct RequestQueue {
    pub granted_mode: LockMode,
    pub waiting: bool,
    pub requests: Vec<LockRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            granted_mode: LockMode::None,
            waiting: false,
            requests: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn find(&self, owner: OwnerId) -> Option<usize> {
        self.requests.iter().position(|r| r.owner == owner)
    }

    pub fn get(&self, owner: OwnerId) -> Option<&LockRequest> {
        self.requests.iter().find(|r| r.owner == owner)
    }

    pub fn grant_state(&self, owner: OwnerId) -> Option<GrantState> {
        self.get(owner)
            .filter(|r| r.status == RequestStatus::Granted)
            .map(|r| GrantState { mode: r.mode, count: r.count })
    }

    /// Mode held by `owner`, `None` when nothing is granted
    pub fn held_mode(&self, owner: OwnerId) -> LockMode {
        match self.get(owner) {
            Some(r) if r.status != RequestStatus::Waiting => r.mode,
            _ => LockMode::None,
        }
    }

    /// Registers a request. When it cannot be granted and `can_wait` is set,
    /// the request is queued and the caller must wait for the grant.
    pub fn request(
        &mut self,
        owner: OwnerId,
        mode: LockMode,
        upgrade: bool,
        can_wait: bool,
    ) -> Result<Acquire, QueueError> {
        match self.find(owner) {
            None => self.new_request(owner, mode, upgrade, can_wait),
            Some(index) => self.conversion_request(index, mode, upgrade, can_wait),
        }
    }

    fn new_request(
        &mut self,
        owner: OwnerId,
        mode: LockMode,
        upgrade: bool,
        can_wait: bool,
    ) -> Result<Acquire, QueueError> {
        if upgrade {
            return Err(QueueError::InvalidUpgrade(owner));
        }
        if !self.waiting && mode.is_compatible(self.granted_mode) {
            self.requests.push(LockRequest::new(owner, mode, RequestStatus::Granted));
            self.granted_mode = mode.maximum_of(self.granted_mode);
            return Ok(Acquire::Granted);
        }
        if !can_wait {
            return Err(QueueError::WouldBlock);
        }
        self.requests.push(LockRequest::new(owner, mode, RequestStatus::Waiting));
        self.waiting = true;
        Ok(Acquire::MustWait)
    }

    fn conversion_request(
        &mut self,
        index: usize,
        mode: LockMode,
        upgrade: bool,
        can_wait: bool,
    ) -> Result<Acquire, QueueError> {
        let owner = self.requests[index].owner;
        if self.requests[index].status != RequestStatus::Granted {
            return Err(QueueError::RequestPending(owner));
        }

        if mode <= self.requests[index].mode {
            if !upgrade {
                self.requests[index].count += 1;
            }
            return Ok(Acquire::Granted);
        }

        if self.compatible_with_others(index, mode) {
            let request = &mut self.requests[index];
            request.mode = mode;
            request.convert_mode = mode;
            if !upgrade {
                request.count += 1;
            }
            self.granted_mode = mode.maximum_of(self.granted_mode);
            return Ok(Acquire::Granted);
        }

        if !can_wait {
            return Err(QueueError::WouldBlock);
        }

        let request = &mut self.requests[index];
        request.status = RequestStatus::Converting;
        request.convert_mode = mode;
        request.upgrading = upgrade;
        self.waiting = true;
        Ok(Acquire::MustWait)
    }

    /// Whether `mode` is compatible with every other granted or converting holder
    fn compatible_with_others(&self, index: usize, mode: LockMode) -> bool {
        self.requests
            .iter()
            .enumerate()
            .filter(|(i, r)| *i != index && r.status != RequestStatus::Waiting)
            .all(|(_, r)| mode.is_compatible(r.mode))
    }

    /// Recomputes the granted mode and grants pending conversions and waiters.
    pub fn grant_waiters(&mut self) {
        self.waiting = false;
        self.granted_mode = self
            .requests
            .iter()
            .filter(|r| r.status != RequestStatus::Waiting)
            .fold(LockMode::None, |acc, r| acc.maximum_of(r.mode));

        let mut conversion_pending = false;
        for index in 0..self.requests.len() {
            if self.requests[index].status != RequestStatus::Converting {
                continue;
            }
            let wanted = self.requests[index].convert_mode;
            if self.compatible_with_others(index, wanted) {
                let request = &mut self.requests[index];
                request.mode = wanted;
                if !request.upgrading {
                    request.count += 1;
                }
                request.upgrading = false;
                request.status = RequestStatus::Granted;
                request.wakeup.notify_one();
                self.granted_mode = wanted.maximum_of(self.granted_mode);
            } else {
                conversion_pending = true;
                self.waiting = true;
            }
        }

        for index in 0..self.requests.len() {
            if self.requests[index].status != RequestStatus::Waiting {
                continue;
            }
            let wanted = self.requests[index].mode;
            if conversion_pending || !wanted.is_compatible(self.granted_mode) {
                self.waiting = true;
                break;
            }
            let request = &mut self.requests[index];
            request.status = RequestStatus::Granted;
            request.wakeup.notify_one();
            self.granted_mode = wanted.maximum_of(self.granted_mode);
        }
    }

    /// Abandons a wait that timed out or was chosen as a deadlock victim.
    /// A new request is removed; a conversion falls back to its granted mode.
    pub fn cancel_wait(&mut self, owner: OwnerId) {
        if let Some(index) = self.find(owner) {
            match self.requests[index].status {
                RequestStatus::Waiting => {
                    self.requests.remove(index);
                }
                RequestStatus::Converting => {
                    let request = &mut self.requests[index];
                    request.status = RequestStatus::Granted;
                    request.convert_mode = request.mode;
                    request.upgrading = false;
                }
                RequestStatus::Granted => {}
            }
        }
        self.recompute();
    }

    /// Releases one hold of `owner`, or all of them when `force` is set.
    pub fn release(&mut self, owner: OwnerId, force: bool) -> Result<Released, QueueError> {
        let index = self.find(owner).ok_or(QueueError::NotHeld(owner))?;
        if self.requests[index].status != RequestStatus::Granted {
            return Err(QueueError::RequestPending(owner));
        }
        if self.requests[index].count > 1 && !force {
            self.requests[index].count -= 1;
            return Ok(Released::Decremented);
        }
        self.requests.remove(index);
        self.recompute();
        Ok(Released::Removed)
    }

    /// Lowers the mode held by `owner`; requesting the same mode is a no-op.
    pub fn downgrade(&mut self, owner: OwnerId, mode: LockMode) -> Result<(), QueueError> {
        let index = self.find(owner).ok_or(QueueError::NotHeld(owner))?;
        let request = &mut self.requests[index];
        if request.status != RequestStatus::Granted {
            return Err(QueueError::RequestPending(owner));
        }
        if mode == request.mode {
            return Ok(());
        }
        if mode > request.mode {
            return Err(QueueError::InvalidDowngrade {
                held: request.mode,
                requested: mode,
            });
        }
        request.mode = mode;
        request.convert_mode = mode;
        self.grant_waiters();
        Ok(())
    }

    /// Puts back a granted request's mode and count after an instant-duration grant.
    pub fn restore(&mut self, owner: OwnerId, state: GrantState) {
        if let Some(index) = self.find(owner) {
            let request = &mut self.requests[index];
            request.mode = state.mode;
            request.convert_mode = state.mode;
            request.count = state.count;
        }
        self.grant_waiters();
    }

    fn recompute(&mut self) {
        if self.requests.is_empty() {
            self.granted_mode = LockMode::None;
            self.waiting = false;
        } else {
            self.grant_waiters();
        }
    }
}
