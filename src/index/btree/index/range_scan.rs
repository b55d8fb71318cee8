// Forward scan cursor
//
// The cursor holds no latch between calls. It remembers the leaf of the
// current entry and that leaf's LSN; if the leaf is unchanged at the next
// fetch the scan resumes there, otherwise it descends again from the root.
// Either way it moves right along the leaf chain one leaf at a time.

use log::trace;

use crate::common::types::Lsn;
use crate::concurrency::{LockDuration, LockMode, Lockable};
use crate::index::btree::error::{BTreeError, Result};
use crate::index::btree::index::base::{Bound, LockRequest};
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::item::IndexItem;
use crate::index::btree::key::{IndexKey, Location};
use crate::transaction::{isolation, Transaction};

impl BTreeIndex {
    /// Open a cursor positioned before the first entry at or after
    /// `(start_key, start_location)`. Without a start key the scan begins
    /// at the lowest key. Returned locations are locked in `lock_mode`.
    pub fn open_scan(
        &self,
        start_key: Option<&[u8]>,
        start_location: Option<&Location>,
        lock_mode: LockMode,
    ) -> IndexScan<'_> {
        let start = start_key.map(|key| IndexItem::leaf(key, start_location.cloned().unwrap_or_default()));
        IndexScan {
            index: self,
            lock_mode,
            start,
            current: None,
            leaf: None,
            current_lock: None,
            eof: false,
            closed: false,
        }
    }
}

pub struct IndexScan<'a> {
    index: &'a BTreeIndex,
    lock_mode: LockMode,
    start: Option<IndexItem>,
    current: Option<IndexItem>,
    /// Page number and LSN of the leaf holding `current` when it was read
    leaf: Option<(i32, Lsn)>,
    /// Lock held on the current location until the cursor moves
    current_lock: Option<Lockable>,
    eof: bool,
    closed: bool,
}

impl IndexScan<'_> {
    /// Advance to the next entry. Returns `false` once the scan has passed
    /// the last key.
    pub fn fetch_next(&mut self, trx: &Transaction) -> Result<bool> {
        if self.closed {
            return Err(BTreeError::ScanClosed);
        }
        if self.eof {
            return Ok(false);
        }
        let bound = match (&self.current, &self.start) {
            (Some(current), _) => Bound::After(current.clone()),
            (None, Some(start)) => Bound::AtOrAfter(start.clone()),
            (None, None) => Bound::First,
        };

        // Lock obtained by waiting on an earlier pass
        let mut waited: Option<Lockable> = None;
        let (candidate, position) = loop {
            let (leaf, candidate) = match (self.leaf, &bound) {
                (Some((page_number, page_lsn)), Bound::After(_)) => {
                    self.index.find_next_from(trx.owner(), &bound, page_number, page_lsn)?
                }
                _ => self.index.find_next(trx.owner(), &bound)?,
            };
            let request = self.lock_request(trx, candidate.as_ref());
            if waited.as_ref() != Some(&request.lockable) {
                if let Some(stale) = waited.take() {
                    trx.release_lock(&stale)?;
                }
                if !self.index.try_lock(trx, &request)? {
                    drop(leaf);
                    self.index.wait_for(trx, &request)?;
                    waited = Some(request.lockable);
                    continue;
                }
            }
            break (candidate, (leaf.page_number(), leaf.bab.page_lsn()));
        };

        if let Some(previous) = self.current_lock.take() {
            isolation::unlock_location_after_cursor_moved(trx, &previous)?;
        }
        match candidate {
            Some(item) => {
                let lockable = self.index.location_lock(&item.location);
                if trx.isolation().releases_after_read() {
                    isolation::unlock_location_after_read(trx, &lockable)?;
                } else {
                    self.current_lock = Some(lockable);
                }
                trace!(
                    "Scan of index {} at ({}, {})",
                    self.index.container_id(),
                    self.index.comparator().format_key(&item.key),
                    self.index.comparator().format_location(&item.location)
                );
                self.current = Some(item);
                self.leaf = Some(position);
                Ok(true)
            }
            None => {
                self.eof = true;
                self.current = None;
                self.leaf = None;
                Ok(false)
            }
        }
    }

    fn lock_request(&self, trx: &Transaction, candidate: Option<&IndexItem>) -> LockRequest {
        match candidate {
            Some(item) => LockRequest {
                lockable: self.index.location_lock(&item.location),
                mode: self.lock_mode,
                duration: if self.lock_mode == LockMode::Exclusive {
                    LockDuration::Commit
                } else {
                    trx.isolation().read_lock_duration()
                },
            },
            // The end of the index is held only under serializable isolation
            None => LockRequest {
                lockable: Lockable::IndexEof(self.index.container_id()),
                mode: self.lock_mode,
                duration: if trx.isolation().locks_range_end() {
                    LockDuration::Commit
                } else {
                    LockDuration::Instant
                },
            },
        }
    }

    pub fn current_key(&self) -> Option<&[u8]> {
        match self.current.as_ref().map(|item| &item.key) {
            Some(IndexKey::Value(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.current.as_ref().map(|item| &item.location)
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Release the lock on the current entry, as for a cursor move
    pub fn close(&mut self, trx: &Transaction) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(previous) = self.current_lock.take() {
            isolation::unlock_location_after_cursor_moved(trx, &previous)?;
        }
        self.current = None;
        self.leaf = None;
        self.closed = true;
        Ok(())
    }
}
