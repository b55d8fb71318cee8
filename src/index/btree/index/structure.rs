// Structure modifications
//
// Each runs as one nested top action. Every page it touches gets its own log
// record holding the page's before and after images.

use log::debug;

use crate::concurrency::LockMode;
use crate::index::btree::error::Result;
use crate::index::btree::index::{BTreeIndex, LatchedNode};
use crate::index::btree::item::IndexItem;
use crate::index::btree::log_records::{
    type_name, NodeImage, BTREE_MODULE_ID, DECREASE_HEIGHT, INCREASE_HEIGHT, LINK, MERGE, NEW_NODE, REDISTRIBUTE,
    SPLIT, UNLINK,
};
use crate::index::btree::node::{BTreeNode, BTREE_NODE_PAGE_TYPE};
use crate::storage::buffer::FixHint;
use crate::transaction::wal::{LogRecord, LogRecordKind};
use crate::transaction::Transaction;

impl BTreeIndex {
    /// Log the change of `target` to `after` and apply it
    fn log_image(&self, trx: &Transaction, target: &mut LatchedNode<'_>, type_code: u16, after: BTreeNode) -> Result<()> {
        let record = LogRecord::for_module(
            BTREE_MODULE_ID,
            type_code,
            LogRecordKind::Undoable,
            &NodeImage {
                before: Some(target.node.clone()),
                after: after.clone(),
            },
        )?;
        trx.log_insert(&target.bab, record)?;
        debug!(
            "Index {}: {} on page {}",
            self.container_id,
            type_name(type_code),
            target.page_id()
        );
        target.node = after;
        Ok(())
    }

    /// Empty a node that is about to be freed. Its page LSN moves on, so a
    /// cursor remembering the page does not resume from it.
    fn retire_node(&self, trx: &Transaction, target: &mut LatchedNode<'_>, type_code: u16) -> Result<()> {
        let mut after = target.node.clone();
        after.items.clear();
        self.log_image(trx, target, type_code, after)
    }

    /// Allocate and format a page holding `content`. The allocation is
    /// undone with the enclosing nested top action, so the node itself is
    /// logged redo-only.
    fn create_node(&self, trx: &Transaction, content: BTreeNode) -> Result<LatchedNode<'_>> {
        let page_id = self.space().allocate_page(trx, self.container_id)?;
        let bab = self
            .buffers()
            .fix_exclusive(trx.owner(), page_id, true, BTREE_NODE_PAGE_TYPE, FixHint::Normal)?;
        let record = LogRecord::for_module(
            BTREE_MODULE_ID,
            NEW_NODE,
            LogRecordKind::Redo,
            &NodeImage {
                before: None,
                after: content.clone(),
            },
        )?
        .with_page_format(BTREE_NODE_PAGE_TYPE);
        trx.log_insert(&bab, record)?;
        Ok(LatchedNode { bab, node: content })
    }

    /// Point the left sibling link of `page_number` at `left`
    fn relink_left(&self, trx: &Transaction, page_number: i32, left: i32, type_code: u16) -> Result<()> {
        let mut far = self.fix_node(trx.owner(), page_number, LockMode::Exclusive)?;
        let mut after = far.node.clone();
        after.header.left_sibling = Some(left);
        self.log_image(trx, &mut far, type_code, after)
    }

    /// Split `child`, the child at `idx` of `parent`, and link the new right
    /// half into the parent. Returns the right half; `child` keeps the lower
    /// items.
    pub(crate) fn split<'a>(
        &'a self,
        trx: &Transaction,
        parent: &mut LatchedNode<'a>,
        idx: usize,
        child: &mut LatchedNode<'a>,
    ) -> Result<LatchedNode<'a>> {
        parent.upgrade()?;
        child.upgrade()?;
        trx.start_nested_top_action()?;

        let mut left = child.node.clone();
        let at = BTreeNode::split_point(&left.items)?;
        let mut upper = left.split_upper(at);
        upper.header.left_sibling = Some(child.page_number());
        let right = self.create_node(trx, upper)?;
        let right_number = right.page_number();
        left.header.right_sibling = Some(right_number);
        self.log_image(trx, child, SPLIT, left)?;
        if let Some(far) = right.node.header.right_sibling {
            self.relink_left(trx, far, right_number, SPLIT)?;
        }

        let mut parent_after = parent.node.clone();
        parent_after.items[idx].child = Some(right_number);
        parent_after
            .items
            .insert(idx, IndexItem::branch(child.node.high_key(), child.page_number()));
        self.log_image(trx, parent, LINK, parent_after)?;

        trx.complete_nested_top_action()?;
        debug!(
            "Index {}: split page {} at {} into page {}",
            self.container_id,
            child.page_number(),
            at,
            right_number
        );
        Ok(right)
    }

    /// Move the root's contents into a new child so the root has room again
    pub(crate) fn increase_height(&self, trx: &Transaction, root: &mut LatchedNode<'_>) -> Result<()> {
        root.upgrade()?;
        trx.start_nested_top_action()?;
        let child = self.create_node(trx, root.node.clone())?;
        let mut root_after = root.node.clone();
        root_after.header.leaf = false;
        root_after.items = vec![IndexItem::branch(&IndexItem::infinity(), child.page_number())];
        self.log_image(trx, root, INCREASE_HEIGHT, root_after)?;
        trx.complete_nested_top_action()?;
        debug!(
            "Index {}: tree height increased, old root moved to page {}",
            self.container_id,
            child.page_number()
        );
        Ok(())
    }

    /// Collapse a root with a single child into the root page
    pub(crate) fn decrease_height(&self, trx: &Transaction, root: &mut LatchedNode<'_>) -> Result<()> {
        let child_number = root.node.child_at(0, root.page_id())?;
        root.upgrade()?;
        let mut child = self.fix_node(trx.owner(), child_number, LockMode::Exclusive)?;
        trx.start_nested_top_action()?;
        let mut root_after = child.node.clone();
        root_after.header.left_sibling = None;
        root_after.header.right_sibling = None;
        root_after.header.high_key = IndexItem::infinity();
        self.log_image(trx, root, DECREASE_HEIGHT, root_after)?;
        self.retire_node(trx, &mut child, DECREASE_HEIGHT)?;
        let child_id = child.page_id();
        drop(child);
        self.space().free_page(trx, child_id)?;
        trx.complete_nested_top_action()?;
        debug!(
            "Index {}: tree height decreased, page {} freed",
            self.container_id, child_number
        );
        Ok(())
    }

    /// Merge or rebalance `child` (at `idx` of `parent`) with a sibling
    /// under the same parent. Returns the node now covering `target`.
    pub(crate) fn repair_underflow<'a>(
        &'a self,
        trx: &Transaction,
        parent: &mut LatchedNode<'a>,
        idx: usize,
        child: LatchedNode<'a>,
        target: &IndexItem,
    ) -> Result<LatchedNode<'a>> {
        let owner = trx.owner();
        let (left_idx, left, right, child_is_left) = if idx + 1 < parent.node.key_count() {
            let right_number = parent.node.child_at(idx + 1, parent.page_id())?;
            let right = self.fix_node(owner, right_number, LockMode::Update)?;
            (idx, child, right, true)
        } else {
            // Latch siblings left to right
            let left_number = parent.node.child_at(idx - 1, parent.page_id())?;
            let child_number = child.page_number();
            drop(child);
            let left = self.fix_node(owner, left_number, LockMode::Update)?;
            let right = self.fix_node(owner, child_number, LockMode::Update)?;
            (idx - 1, left, right, false)
        };

        let mut merged = left.node.clone();
        merged.items.extend(right.node.items.iter().cloned());
        merged.header.high_key = right.node.header.high_key.clone();
        merged.header.right_sibling = right.node.header.right_sibling;
        if merged.fits(&self.config)? {
            return self.merge(trx, parent, left_idx, left, right, merged);
        }
        self.redistribute(trx, parent, left_idx, left, right, child_is_left, target)
    }

    fn merge<'a>(
        &'a self,
        trx: &Transaction,
        parent: &mut LatchedNode<'a>,
        left_idx: usize,
        mut left: LatchedNode<'a>,
        mut right: LatchedNode<'a>,
        merged: BTreeNode,
    ) -> Result<LatchedNode<'a>> {
        parent.upgrade()?;
        left.upgrade()?;
        right.upgrade()?;
        trx.start_nested_top_action()?;

        let mut parent_after = parent.node.clone();
        parent_after.items.remove(left_idx);
        parent_after.items[left_idx].child = Some(left.page_number());
        self.log_image(trx, parent, UNLINK, parent_after)?;
        let far = merged.header.right_sibling;
        self.log_image(trx, &mut left, MERGE, merged)?;
        if let Some(far) = far {
            self.relink_left(trx, far, left.page_number(), MERGE)?;
        }
        self.retire_node(trx, &mut right, MERGE)?;
        let right_id = right.page_id();
        drop(right);
        self.space().free_page(trx, right_id)?;

        trx.complete_nested_top_action()?;
        debug!(
            "Index {}: merged page {} into page {}",
            self.container_id,
            right_id.page_number,
            left.page_number()
        );
        Ok(left)
    }

    #[allow(clippy::too_many_arguments)]
    fn redistribute<'a>(
        &'a self,
        trx: &Transaction,
        parent: &mut LatchedNode<'a>,
        left_idx: usize,
        mut left: LatchedNode<'a>,
        mut right: LatchedNode<'a>,
        child_is_left: bool,
        target: &IndexItem,
    ) -> Result<LatchedNode<'a>> {
        let mut items = left.node.items.clone();
        items.extend(right.node.items.iter().cloned());
        let at = BTreeNode::split_point(&items)?;
        let unchanged = |left: LatchedNode<'a>, right: LatchedNode<'a>| if child_is_left { left } else { right };
        if at == left.node.key_count() {
            return Ok(unchanged(left, right));
        }
        let mut left_after = left.node.clone();
        let mut right_after = right.node.clone();
        right_after.items = items.split_off(at);
        left_after.items = items;
        left_after.header.high_key = left_after
            .items
            .last()
            .map(IndexItem::bound)
            .unwrap_or_else(IndexItem::infinity);
        let mut parent_after = parent.node.clone();
        parent_after.items[left_idx] = IndexItem::branch(left_after.high_key(), left.page_number());
        if !(left_after.fits(&self.config)? && right_after.fits(&self.config)? && parent_after.fits(&self.config)?) {
            return Ok(unchanged(left, right));
        }

        parent.upgrade()?;
        left.upgrade()?;
        right.upgrade()?;
        trx.start_nested_top_action()?;
        self.log_image(trx, parent, LINK, parent_after)?;
        self.log_image(trx, &mut left, REDISTRIBUTE, left_after)?;
        self.log_image(trx, &mut right, REDISTRIBUTE, right_after)?;
        trx.complete_nested_top_action()?;
        debug!(
            "Index {}: redistributed pages {} and {}",
            self.container_id,
            left.page_number(),
            right.page_number()
        );
        if left.node.covers(target, &self.cmp) {
            Ok(left)
        } else {
            Ok(right)
        }
    }
}
