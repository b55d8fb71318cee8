// Key deletion and the undo of inserts

use log::debug;

use crate::concurrency::{LockDuration, LockMode};
use crate::index::btree::error::Result;
use crate::index::btree::index::base::{Attempt, LockRequest};
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::item::IndexItem;
use crate::index::btree::key::Location;
use crate::index::btree::log_records::{KeyChange, BTREE_MODULE_ID, DELETE_KEY};
use crate::transaction::wal::{LogRecord, LogRecordKind};
use crate::transaction::Transaction;

impl BTreeIndex {
    /// Delete the entry `(key, location)`
    pub fn delete(&self, trx: &Transaction, key: &[u8], location: &Location) -> Result<()> {
        self.validate_entry(key, location)?;
        let item = IndexItem::leaf(key, location.clone());
        loop {
            match self.try_delete(trx, &item)? {
                Attempt::Done(()) => return Ok(()),
                Attempt::Wait(request) => self.wait_for(trx, &request)?,
            }
        }
    }

    fn try_delete(&self, trx: &Transaction, item: &IndexItem) -> Result<Attempt<()>> {
        let mut leaf = self.descend_for_delete(trx, item)?;
        let Some(pos) = self.find_entry(&leaf.node, item) else {
            // An uncommitted delete of the entry holds the key after it, so
            // the entry is known to be gone only once that lock is granted.
            let next_key = LockRequest {
                lockable: self.next_key_lock(trx.owner(), &leaf, leaf.node.lower_bound(item, &self.cmp))?,
                mode: LockMode::Shared,
                duration: LockDuration::Commit,
            };
            if !self.try_lock(trx, &next_key)? {
                return Ok(Attempt::Wait(next_key));
            }
            return Err(self.missing_entry(item));
        };

        let own = LockRequest {
            lockable: self.location_lock(&item.location),
            mode: LockMode::Exclusive,
            duration: LockDuration::Commit,
        };
        if !self.try_lock(trx, &own)? {
            return Ok(Attempt::Wait(own));
        }
        let next_key = LockRequest {
            lockable: self.next_key_lock(trx.owner(), &leaf, pos + 1)?,
            mode: LockMode::Exclusive,
            duration: LockDuration::Commit,
        };
        if !self.try_lock(trx, &next_key)? {
            return Ok(Attempt::Wait(next_key));
        }

        leaf.upgrade()?;
        let record = LogRecord::for_module(
            BTREE_MODULE_ID,
            DELETE_KEY,
            LogRecordKind::Undoable,
            &KeyChange {
                item: leaf.node.items[pos].clone(),
            },
        )?;
        trx.log_insert(&leaf.bab, record)?;
        debug!(
            "Index {}: deleted ({}, {}) from page {}",
            self.container_id,
            self.cmp.format_key(&item.key),
            self.cmp.format_location(&item.location),
            leaf.page_id()
        );
        Ok(Attempt::Done(()))
    }

    /// Logical undo of an insert: remove the key from whichever leaf holds
    /// it now. No structure change is needed to remove a key.
    pub(crate) fn undo_insert(&self, trx: &Transaction, undone: &LogRecord) -> Result<()> {
        let change: KeyChange = undone.decode()?;
        let mut leaf = self.descend(trx.owner(), Some(&change.item), LockMode::Update)?;
        let Some(pos) = self.find_entry(&leaf.node, &change.item) else {
            return Err(self.missing_entry(&change.item));
        };
        leaf.upgrade()?;
        let clr = LogRecord::for_module(
            BTREE_MODULE_ID,
            DELETE_KEY,
            LogRecordKind::Redo,
            &KeyChange {
                item: leaf.node.items[pos].clone(),
            },
        )?;
        trx.log_compensation(&leaf.bab, clr, undone)?;
        debug!(
            "Index {}: undo of insert removed {} from page {}",
            self.container_id,
            self.cmp.format_key(&change.item.key),
            leaf.page_id()
        );
        Ok(())
    }
}
