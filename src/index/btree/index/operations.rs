// Key insertion and the undo of deletes

use log::debug;

use crate::concurrency::{LockDuration, LockMode};
use crate::index::btree::error::{BTreeError, Result};
use crate::index::btree::index::base::{Attempt, LockRequest};
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::item::IndexItem;
use crate::index::btree::key::Location;
use crate::index::btree::log_records::{KeyChange, BTREE_MODULE_ID, INSERT_KEY};
use crate::index::btree::node::BTreeNode;
use crate::transaction::wal::{LogRecord, LogRecordKind};
use crate::transaction::Transaction;

impl BTreeIndex {
    /// Insert `(key, location)`. A unique index refuses a second location
    /// for a key once the first is committed; a non-unique index refuses an
    /// identical entry.
    pub fn insert(&self, trx: &Transaction, key: &[u8], location: &Location) -> Result<()> {
        self.validate_entry(key, location)?;
        let item = IndexItem::leaf(key, location.clone());
        let item_size = BTreeNode::item_size(&item)?;
        loop {
            match self.try_insert(trx, &item, item_size)? {
                Attempt::Done(()) => return Ok(()),
                Attempt::Wait(request) => self.wait_for(trx, &request)?,
            }
        }
    }

    fn try_insert(&self, trx: &Transaction, item: &IndexItem, item_size: usize) -> Result<Attempt<()>> {
        let mut leaf = self.descend_for_insert(trx, item, item_size)?;
        let pos = match leaf.node.search(item, &self.cmp) {
            Ok(pos) if self.cmp.is_unique() => {
                // The key exists. It blocks the insert only once committed,
                // which an instant shared lock on its location proves.
                let existing = &leaf.node.items[pos];
                let request = LockRequest {
                    lockable: self.location_lock(&existing.location),
                    mode: LockMode::Shared,
                    duration: LockDuration::Instant,
                };
                if self.try_lock(trx, &request)? {
                    return Err(BTreeError::UniqueConstraintViolation(self.cmp.format_key(&item.key)));
                }
                return Ok(Attempt::Wait(request));
            }
            Ok(_) => {
                return Err(BTreeError::DuplicateEntry {
                    key: self.cmp.format_key(&item.key),
                    location: self.cmp.format_location(&item.location),
                })
            }
            Err(pos) => pos,
        };

        let next_key = LockRequest {
            lockable: self.next_key_lock(trx.owner(), &leaf, pos)?,
            mode: LockMode::Exclusive,
            duration: LockDuration::Instant,
        };
        if !self.try_lock(trx, &next_key)? {
            return Ok(Attempt::Wait(next_key));
        }
        let own = LockRequest {
            lockable: self.location_lock(&item.location),
            mode: LockMode::Exclusive,
            duration: LockDuration::Commit,
        };
        if !self.try_lock(trx, &own)? {
            return Ok(Attempt::Wait(own));
        }

        leaf.upgrade()?;
        let record = LogRecord::for_module(
            BTREE_MODULE_ID,
            INSERT_KEY,
            LogRecordKind::Undoable,
            &KeyChange { item: item.clone() },
        )?;
        trx.log_insert(&leaf.bab, record)?;
        debug!(
            "Index {}: inserted ({}, {}) on page {}",
            self.container_id,
            self.cmp.format_key(&item.key),
            self.cmp.format_location(&item.location),
            leaf.page_id()
        );
        Ok(Attempt::Done(()))
    }

    /// Logical undo of a delete: insert the key again wherever it belongs
    /// now, splitting as needed
    pub(crate) fn undo_delete(&self, trx: &Transaction, undone: &LogRecord) -> Result<()> {
        let change: KeyChange = undone.decode()?;
        let item_size = BTreeNode::item_size(&change.item)?;
        let mut leaf = self.descend_for_insert(trx, &change.item, item_size)?;
        leaf.upgrade()?;
        let clr = LogRecord::for_module(BTREE_MODULE_ID, INSERT_KEY, LogRecordKind::Redo, &change)?;
        trx.log_compensation(&leaf.bab, clr, undone)?;
        debug!(
            "Index {}: undo of delete restored {} on page {}",
            self.container_id,
            self.cmp.format_key(&change.item.key),
            leaf.page_id()
        );
        Ok(())
    }
}
