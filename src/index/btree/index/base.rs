// Tree traversal and lock helpers shared by the index operations

use crate::common::types::{Lsn, OwnerId};
use crate::concurrency::{LockDuration, LockError, LockMode, Lockable};
use crate::index::btree::error::{BTreeError, Result};
use crate::index::btree::index::{BTreeIndex, LatchedNode};
use crate::index::btree::item::IndexItem;
use crate::index::btree::manager::ROOT_PAGE_NUMBER;
use crate::index::btree::node::BTreeNode;
use crate::transaction::{Transaction, TransactionError};

/// A lock that could not be granted while latches were held
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LockRequest {
    pub(crate) lockable: Lockable,
    pub(crate) mode: LockMode,
    pub(crate) duration: LockDuration,
}

/// Outcome of one latched pass of an operation
pub(crate) enum Attempt<T> {
    Done(T),
    /// Latches were released; wait for the lock, then traverse again
    Wait(LockRequest),
}

/// Where a leaf search starts
#[derive(Debug, Clone)]
pub(crate) enum Bound {
    First,
    AtOrAfter(IndexItem),
    After(IndexItem),
}

impl Bound {
    fn target(&self) -> Option<&IndexItem> {
        match self {
            Bound::First => None,
            Bound::AtOrAfter(item) | Bound::After(item) => Some(item),
        }
    }
}

impl BTreeIndex {
    /// Request a lock without waiting. `Ok(false)` means the lock is held by
    /// someone else.
    pub(crate) fn try_lock(&self, trx: &Transaction, request: &LockRequest) -> Result<bool> {
        match trx.acquire_lock_nowait(&request.lockable, request.mode, request.duration) {
            Ok(()) => Ok(true),
            Err(TransactionError::Lock(LockError::Timeout { .. })) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Block until a lock refused by `try_lock` is granted
    pub(crate) fn wait_for(&self, trx: &Transaction, request: &LockRequest) -> Result<()> {
        trx.acquire_lock(&request.lockable, request.mode, request.duration)?;
        Ok(())
    }

    /// Descend to the leaf covering `target` with update latches, splitting
    /// every node on the way that could not absorb a split of its child.
    /// The returned leaf has room for an item of `item_size` bytes.
    pub(crate) fn descend_for_insert(
        &self,
        trx: &Transaction,
        target: &IndexItem,
        item_size: usize,
    ) -> Result<LatchedNode<'_>> {
        let owner = trx.owner();
        let mut parent = self.fix_node(owner, ROOT_PAGE_NUMBER, LockMode::Update)?;
        if !self.has_room(&parent, item_size)? {
            self.increase_height(trx, &mut parent)?;
        }
        loop {
            if parent.node.is_leaf() {
                return Ok(parent);
            }
            let idx = parent.node.child_index(target, &self.cmp);
            let child_number = parent.node.child_at(idx, parent.page_id())?;
            let mut child = self.fix_node(owner, child_number, LockMode::Update)?;
            if !self.has_room(&child, item_size)? {
                let right = self.split(trx, &mut parent, idx, &mut child)?;
                if !child.node.covers(target, &self.cmp) {
                    child = right;
                }
            }
            parent = child;
        }
    }

    /// Descend to the leaf covering `target` with update latches, repairing
    /// nodes about to underflow on the way
    pub(crate) fn descend_for_delete(&self, trx: &Transaction, target: &IndexItem) -> Result<LatchedNode<'_>> {
        let owner = trx.owner();
        let mut parent = self.fix_node(owner, ROOT_PAGE_NUMBER, LockMode::Update)?;
        while !parent.node.is_leaf() && parent.node.key_count() == 1 {
            self.decrease_height(trx, &mut parent)?;
        }
        loop {
            if parent.node.is_leaf() {
                return Ok(parent);
            }
            let idx = parent.node.child_index(target, &self.cmp);
            let child_number = parent.node.child_at(idx, parent.page_id())?;
            let mut child = self.fix_node(owner, child_number, LockMode::Update)?;
            if child.node.is_about_to_underflow(&self.config) && parent.node.key_count() >= 2 {
                child = self.repair_underflow(trx, &mut parent, idx, child, target)?;
            }
            parent = child;
        }
    }

    /// Descend to the leaf covering `target` in `mode` without changing
    /// the tree
    pub(crate) fn descend(&self, owner: OwnerId, target: Option<&IndexItem>, mode: LockMode) -> Result<LatchedNode<'_>> {
        let mut current = self.fix_node(owner, ROOT_PAGE_NUMBER, mode)?;
        while !current.node.is_leaf() {
            let idx = match target {
                Some(target) => current.node.child_index(target, &self.cmp),
                None => 0,
            };
            let child_number = current.node.child_at(idx, current.page_id())?;
            current = self.fix_node(owner, child_number, mode)?;
        }
        Ok(current)
    }

    /// The first leaf item satisfying `bound` together with the latched leaf
    /// holding it. Moves right along the leaf chain with shared latches.
    pub(crate) fn find_next(&self, owner: OwnerId, bound: &Bound) -> Result<(LatchedNode<'_>, Option<IndexItem>)> {
        let leaf = self.descend(owner, bound.target(), LockMode::Shared)?;
        self.scan_right(owner, leaf, bound)
    }

    /// As `find_next`, but starts at leaf `page_number` if its LSN is still
    /// `page_lsn`. An unchanged page is still in the tree with the same
    /// items and links.
    pub(crate) fn find_next_from(
        &self,
        owner: OwnerId,
        bound: &Bound,
        page_number: i32,
        page_lsn: Lsn,
    ) -> Result<(LatchedNode<'_>, Option<IndexItem>)> {
        let leaf = self.fix_node(owner, page_number, LockMode::Shared)?;
        if leaf.bab.page_lsn() != page_lsn || !leaf.node.is_leaf() {
            drop(leaf);
            return self.find_next(owner, bound);
        }
        self.scan_right(owner, leaf, bound)
    }

    fn scan_right<'a>(
        &'a self,
        owner: OwnerId,
        mut leaf: LatchedNode<'a>,
        bound: &Bound,
    ) -> Result<(LatchedNode<'a>, Option<IndexItem>)> {
        loop {
            let pos = match bound {
                Bound::First => 0,
                Bound::AtOrAfter(item) => leaf.node.lower_bound(item, &self.cmp),
                Bound::After(item) => leaf.node.upper_bound(item, &self.cmp),
            };
            if let Some(item) = leaf.node.items.get(pos) {
                let item = item.clone();
                return Ok((leaf, Some(item)));
            }
            match leaf.node.header.right_sibling {
                Some(right) => leaf = self.fix_node(owner, right, LockMode::Shared)?,
                None => return Ok((leaf, None)),
            }
        }
    }

    /// Lock name of the item following position `pos` of `leaf`, looking
    /// through right siblings when the leaf has no more items
    pub(crate) fn next_key_lock(&self, owner: OwnerId, leaf: &LatchedNode<'_>, pos: usize) -> Result<Lockable> {
        if let Some(item) = leaf.node.items.get(pos) {
            return Ok(self.location_lock(&item.location));
        }
        let mut right = leaf.node.header.right_sibling;
        while let Some(page_number) = right {
            let sibling = self.fix_node(owner, page_number, LockMode::Shared)?;
            if let Some(item) = sibling.node.items.first() {
                return Ok(self.location_lock(&item.location));
            }
            right = sibling.node.header.right_sibling;
        }
        Ok(self.eof_lock())
    }

    /// Position of the entry equal to `item` in both key and location
    pub(crate) fn find_entry(&self, node: &BTreeNode, item: &IndexItem) -> Option<usize> {
        let start = node.lower_bound(item, &self.cmp);
        node.items[start..]
            .iter()
            .take_while(|candidate| self.cmp.same_key(candidate, item))
            .position(|candidate| self.cmp.same_entry(candidate, item))
            .map(|offset| start + offset)
    }

    pub(crate) fn missing_entry(&self, item: &IndexItem) -> BTreeError {
        log::debug!(
            "Entry ({}, {}) not found in index {}",
            self.cmp.format_key(&item.key),
            self.cmp.format_location(&item.location),
            self.container_id
        );
        BTreeError::KeyNotFound
    }
}
