// SimpleDBM B-Tree Index
//
// A B-link tree: every node carries a high key and a right sibling pointer.
// Updaters descend with update latches and couple parent to child; readers
// descend with shared latches. Structure changes run as nested top actions
// under exclusive latches on the pages they touch, upgraded top-down and
// left to right.

mod base;
mod deletion;
mod operations;
mod range_scan;
mod structure;
mod validation;


use std::sync::Arc;

use crate::common::types::{OwnerId, PageId};
use crate::concurrency::{LockMode, Lockable};
use crate::index::btree::error::{BTreeError, Result};
use crate::index::btree::item::{IndexItem, ItemComparator};
use crate::index::btree::key::{IndexKey, Location};
use crate::index::btree::manager::{BTreeConfig, BTreeManager, MAX_LOCATION_SIZE};
use crate::index::btree::node::{BTreeNode, NODE_CAPACITY};
use crate::storage::buffer::{BufferAccessBlock, BufferManager, FixHint};
use crate::storage::fsm::FreeSpaceManager;

pub use range_scan::IndexScan;
pub use validation::TreeStats;

/// A fixed node together with its decoded contents
pub(crate) struct LatchedNode<'a> {
    pub(crate) bab: BufferAccessBlock<'a>,
    pub(crate) node: BTreeNode,
}

impl LatchedNode<'_> {
    pub(crate) fn page_id(&self) -> PageId {
        self.bab.page_id()
    }

    pub(crate) fn page_number(&self) -> i32 {
        self.bab.page_id().page_number
    }

    /// Take the exclusive latch; no-op when it is already held
    pub(crate) fn upgrade(&mut self) -> Result<()> {
        if !self.bab.is_exclusive() {
            self.bab.upgrade_update()?;
        }
        Ok(())
    }
}

pub struct BTreeIndex {
    manager: BTreeManager,
    container_id: i32,
    cmp: ItemComparator,
    config: BTreeConfig,
    /// Space a non-leaf node keeps free for the separator of a child split
    branch_reserve: usize,
}

impl BTreeIndex {
    pub(crate) fn new(manager: BTreeManager, container_id: i32, cmp: ItemComparator) -> Self {
        let config = manager.config();
        let widest = IndexItem {
            key: IndexKey::Value(vec![0; config.max_key_size]),
            location: Location(vec![0; MAX_LOCATION_SIZE]),
            child: Some(i32::MAX),
        };
        let branch_reserve = BTreeNode::item_size(&widest).unwrap_or(NODE_CAPACITY / 8);
        Self {
            manager,
            container_id,
            cmp,
            config,
            branch_reserve,
        }
    }

    pub fn container_id(&self) -> i32 {
        self.container_id
    }

    pub fn is_unique(&self) -> bool {
        self.cmp.is_unique()
    }

    pub fn comparator(&self) -> &ItemComparator {
        &self.cmp
    }

    fn buffers(&self) -> &Arc<BufferManager> {
        self.manager.buffers()
    }

    fn space(&self) -> &Arc<FreeSpaceManager> {
        self.manager.space()
    }

    fn fix_node(&self, owner: OwnerId, page_number: i32, mode: LockMode) -> Result<LatchedNode<'_>> {
        let page_id = PageId::new(self.container_id, page_number);
        let buffers = self.buffers();
        let bab = match mode {
            LockMode::Shared => buffers.fix_shared(owner, page_id, FixHint::Normal)?,
            LockMode::Update => buffers.fix_for_update(owner, page_id, FixHint::Normal)?,
            _ => buffers.fix_exclusive(owner, page_id, false, 0, FixHint::Normal)?,
        };
        let node = BTreeNode::load(&bab.page())?;
        Ok(LatchedNode { bab, node })
    }

    /// Lock name of the data an index entry points at
    pub(crate) fn location_lock(&self, location: &Location) -> Lockable {
        Lockable::Location(self.container_id, location.0.clone())
    }

    fn eof_lock(&self) -> Lockable {
        Lockable::IndexEof(self.container_id)
    }

    /// Reject keys and locations that could not be posted to a parent
    fn validate_entry(&self, key: &[u8], location: &Location) -> Result<()> {
        if key.len() > self.config.max_key_size {
            return Err(BTreeError::KeyTooLarge {
                size: key.len(),
                limit: self.config.max_key_size,
            });
        }
        if location.0.len() > MAX_LOCATION_SIZE {
            return Err(BTreeError::LocationTooLarge {
                size: location.0.len(),
                limit: MAX_LOCATION_SIZE,
            });
        }
        Ok(())
    }

    /// Whether `latched` can take one more item of `item_size` bytes, or one
    /// more separator if it is not a leaf
    fn has_room(&self, latched: &LatchedNode<'_>, item_size: usize) -> Result<bool> {
        let needed = if latched.node.is_leaf() {
            item_size
        } else {
            self.branch_reserve
        };
        latched.node.can_accept(needed, &self.config)
    }
}
