// SimpleDBM Lock Manager
//
// Transaction-duration locks on arbitrary lockable objects, with
// conversion, instant/manual/commit durations and deadlock detection.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::common::stats::{Statistic, StatisticSnapshot};
use crate::common::types::OwnerId;
use crate::concurrency::error::{LockError, QueueError};
use crate::concurrency::mode::{LockMode, Timeout};
use crate::concurrency::queue::{Acquire, RequestQueue, RequestStatus, Released};

/// Objects that can be locked
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lockable {
    /// A whole container
    Container(i32),
    /// A row location within a container
    Location(i32, Vec<u8>),
    /// The end-of-file position of an index, used for next-key locking past the last key
    IndexEof(i32),
    Named(String),
}

impl fmt::Display for Lockable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lockable::Container(id) => write!(f, "container {}", id),
            Lockable::Location(id, bytes) => write!(f, "location {}:{}", id, hex::encode(bytes)),
            Lockable::IndexEof(id) => write!(f, "eof of index {}", id),
            Lockable::Named(name) => write!(f, "{}", name),
        }
    }
}

/// How long a granted lock is retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockDuration {
    /// Wait until grantable, then release immediately
    Instant,
    /// Held until explicitly released
    Manual,
    /// Held until the owner ends
    Commit,
}

#[derive(Debug, Clone)]
pub struct LockManagerConfig {
    /// Timeout used by `acquire` callers that have no specific requirement
    pub default_timeout: Timeout,
    pub deadlock_detection: bool,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Timeout::After(Duration::from_secs(60)),
            deadlock_detection: true,
        }
    }
}

struct LockItem {
    queue: RequestQueue,
    durations: HashMap<OwnerId, LockDuration>,
}

impl LockItem {
    fn new() -> Self {
        Self {
            queue: RequestQueue::new(),
            durations: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct LockTable {
    items: HashMap<Lockable, LockItem>,
    owned: HashMap<OwnerId, HashSet<Lockable>>,
}

impl LockTable {
    fn forget(&mut self, owner: OwnerId, lockable: &Lockable) {
        if let Some(set) = self.owned.get_mut(&owner) {
            set.remove(lockable);
            if set.is_empty() {
                self.owned.remove(&owner);
            }
        }
        let empty = match self.items.get_mut(lockable) {
            Some(item) => {
                if item.queue.find(owner).is_none() {
                    item.durations.remove(&owner);
                }
                item.queue.is_empty()
            }
            None => false,
        };
        if empty {
            self.items.remove(lockable);
        }
    }

    /// Builds the waits-for graph: an edge from each waiting owner to every
    /// owner ahead of it holding or requesting an incompatible mode.
    fn waits_for(&self) -> HashMap<OwnerId, Vec<OwnerId>> {
        let mut graph: HashMap<OwnerId, Vec<OwnerId>> = HashMap::new();
        for item in self.items.values() {
            let requests = &item.queue.requests;
            for (i, waiter) in requests.iter().enumerate() {
                let wanted = match waiter.status {
                    RequestStatus::Granted => continue,
                    RequestStatus::Waiting => waiter.mode,
                    RequestStatus::Converting => waiter.convert_mode,
                };
                for (j, other) in requests.iter().enumerate() {
                    if other.owner == waiter.owner {
                        continue;
                    }
                    let blocking = match other.status {
                        RequestStatus::Granted | RequestStatus::Converting => !wanted.is_compatible(other.mode),
                        RequestStatus::Waiting => j < i && !wanted.is_compatible(other.mode),
                    };
                    if blocking {
                        graph.entry(waiter.owner).or_default().push(other.owner);
                    }
                }
            }
        }
        graph
    }

    fn has_cycle_through(&self, owner: OwnerId) -> bool {
        let graph = self.waits_for();
        let mut visited = HashSet::new();
        let mut stack: Vec<OwnerId> = graph.get(&owner).cloned().unwrap_or_default();
        while let Some(next) = stack.pop() {
            if next == owner {
                return true;
            }
            if visited.insert(next) {
                if let Some(edges) = graph.get(&next) {
                    stack.extend(edges.iter().copied());
                }
            }
        }
        false
    }
}

struct LockStats {
    requests: Statistic,
    waits: Statistic,
    timeouts: Statistic,
    deadlocks: Statistic,
}

/// Lock manager keyed by a hash table of lockable objects
pub struct LockManager {
    table: Mutex<LockTable>,
    config: LockManagerConfig,
    stats: LockStats,
}

impl LockManager {
    pub fn new(config: LockManagerConfig) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            config,
            stats: LockStats {
                requests: Statistic::new("lock.requests"),
                waits: Statistic::new("lock.waits"),
                timeouts: Statistic::new("lock.timeouts"),
                deadlocks: Statistic::new("lock.deadlocks"),
            },
        }
    }

    pub fn default_timeout(&self) -> Timeout {
        self.config.default_timeout
    }

    /// Acquire a lock, waiting at most `timeout`
    pub fn acquire(
        &self,
        owner: OwnerId,
        lockable: &Lockable,
        mode: LockMode,
        duration: LockDuration,
        timeout: Timeout,
    ) -> Result<(), LockError> {
        self.stats.requests.increment();
        let mut table = self.table.lock();
        let item = table.items.entry(lockable.clone()).or_insert_with(LockItem::new);
        let prior = item.queue.grant_state(owner);

        match item.queue.request(owner, mode, false, !timeout.is_no_wait()) {
            Ok(Acquire::Granted) => {}
            Ok(Acquire::MustWait) => {
                self.stats.waits.increment();
                if self.config.deadlock_detection && table.has_cycle_through(owner) {
                    self.stats.deadlocks.increment();
                    warn!("Deadlock detected: owner {} requesting {} on {}", owner, mode, lockable);
                    Self::abandon(&mut table, owner, lockable);
                    return Err(LockError::Deadlock { owner, lockable: lockable.clone(), mode });
                }
                if let Err(err) = self.wait_for_grant(&mut table, owner, lockable, mode, timeout) {
                    Self::abandon(&mut table, owner, lockable);
                    return Err(err);
                }
            }
            Err(QueueError::WouldBlock) => {
                Self::abandon(&mut table, owner, lockable);
                return Err(LockError::Timeout { owner, lockable: lockable.clone(), mode });
            }
            Err(err) => {
                Self::abandon(&mut table, owner, lockable);
                return Err(err.into());
            }
        }

        if duration == LockDuration::Instant {
            if let Some(item) = table.items.get_mut(lockable) {
                match prior {
                    Some(state) => item.queue.restore(owner, state),
                    None => {
                        if let Err(e) = item.queue.release(owner, true) {
                            warn!("Release of instant lock on {} by owner {} failed: {}", lockable, owner, e);
                        }
                    }
                }
            }
            if prior.is_none() {
                table.forget(owner, lockable);
            }
            return Ok(());
        }

        if let Some(item) = table.items.get_mut(lockable) {
            let entry = item.durations.entry(owner).or_insert(duration);
            *entry = (*entry).max(duration);
        }
        table.owned.entry(owner).or_default().insert(lockable.clone());
        Ok(())
    }

    pub fn acquire_nowait(
        &self,
        owner: OwnerId,
        lockable: &Lockable,
        mode: LockMode,
        duration: LockDuration,
    ) -> Result<(), LockError> {
        self.acquire(owner, lockable, mode, duration, Timeout::NoWait)
    }

    /// Release one manual-duration hold. Commit-duration locks are retained
    /// until `release_all`; for them, and for locks not held, returns `false`.
    pub fn release(&self, owner: OwnerId, lockable: &Lockable) -> Result<bool, LockError> {
        let mut table = self.table.lock();
        let Some(item) = table.items.get_mut(lockable) else {
            return Ok(false);
        };
        if item.queue.find(owner).is_none() {
            return Ok(false);
        }
        if item.durations.get(&owner) == Some(&LockDuration::Commit) {
            return Ok(false);
        }
        match item.queue.release(owner, false)? {
            Released::Decremented => Ok(true),
            Released::Removed => {
                table.forget(owner, lockable);
                Ok(true)
            }
        }
    }

    pub fn downgrade(&self, owner: OwnerId, lockable: &Lockable, mode: LockMode) -> Result<(), LockError> {
        let mut table = self.table.lock();
        let item = table
            .items
            .get_mut(lockable)
            .ok_or(QueueError::NotHeld(owner))?;
        item.queue.downgrade(owner, mode)?;
        Ok(())
    }

    /// Release every lock held by `owner` regardless of duration or count
    pub fn release_all(&self, owner: OwnerId) {
        let mut table = self.table.lock();
        let Some(held) = table.owned.remove(&owner) else {
            return;
        };
        let count = held.len();
        for lockable in held {
            if let Some(item) = table.items.get_mut(&lockable) {
                if let Err(e) = item.queue.release(owner, true) {
                    warn!("Release of {} by owner {} failed: {}", lockable, owner, e);
                }
                item.durations.remove(&owner);
                if item.queue.is_empty() {
                    table.items.remove(&lockable);
                }
            }
        }
        debug!("Released {} locks held by owner {}", count, owner);
    }

    /// Mode in which `owner` holds `lockable`
    pub fn has_lock(&self, owner: OwnerId, lockable: &Lockable) -> LockMode {
        let table = self.table.lock();
        table
            .items
            .get(lockable)
            .map(|item| item.queue.held_mode(owner))
            .unwrap_or(LockMode::None)
    }

    /// Every object locked by `owner` with the mode it is held in
    pub fn held_locks(&self, owner: OwnerId) -> Vec<(Lockable, LockMode)> {
        let table = self.table.lock();
        let Some(owned) = table.owned.get(&owner) else {
            return Vec::new();
        };
        owned
            .iter()
            .filter_map(|lockable| {
                let mode = table.items.get(lockable)?.queue.held_mode(owner);
                (mode != LockMode::None).then(|| (lockable.clone(), mode))
            })
            .collect()
    }

    /// Number of distinct objects currently locked by `owner`
    pub fn lock_count(&self, owner: OwnerId) -> usize {
        self.table.lock().owned.get(&owner).map(|s| s.len()).unwrap_or(0)
    }

    pub fn statistics(&self) -> Vec<StatisticSnapshot> {
        vec![
            self.stats.requests.snapshot(),
            self.stats.waits.snapshot(),
            self.stats.timeouts.snapshot(),
            self.stats.deadlocks.snapshot(),
        ]
    }

    fn wait_for_grant(
        &self,
        table: &mut MutexGuard<'_, LockTable>,
        owner: OwnerId,
        lockable: &Lockable,
        mode: LockMode,
        timeout: Timeout,
    ) -> Result<(), LockError> {
        let deadline = timeout.deadline();
        loop {
            let (status, wakeup) = match table.items.get(lockable).and_then(|item| item.queue.get(owner)) {
                Some(request) => (request.status, request.wakeup.clone()),
                None => return Err(QueueError::NotHeld(owner).into()),
            };
            if status == RequestStatus::Granted {
                return Ok(());
            }
            match deadline {
                None => wakeup.wait(table),
                Some(deadline) => {
                    if wakeup.wait_until(table, deadline).timed_out() {
                        let granted = table
                            .items
                            .get(lockable)
                            .and_then(|item| item.queue.get(owner))
                            .map(|r| r.status == RequestStatus::Granted)
                            .unwrap_or(false);
                        if granted {
                            return Ok(());
                        }
                        self.stats.timeouts.increment();
                        warn!("Lock wait timed out: owner {} requesting {} on {}", owner, mode, lockable);
                        return Err(LockError::Timeout { owner, lockable: lockable.clone(), mode });
                    }
                }
            }
        }
    }

    /// Withdraw a failed request, leaving any earlier grant in place
    fn abandon(table: &mut LockTable, owner: OwnerId, lockable: &Lockable) {
        if let Some(item) = table.items.get_mut(lockable) {
            item.queue.cancel_wait(owner);
        }
        let holds = table
            .items
            .get(lockable)
            .map(|item| item.queue.find(owner).is_some())
            .unwrap_or(false);
        if !holds {
            table.forget(owner, lockable);
        }
    }
}
