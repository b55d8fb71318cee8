// SimpleDBM B-Tree Node
//
// A node is a slotted page: slot 0 holds the header, slots 1.. hold the
// items in ascending order. Every node has a high key bounding its items
// from above; the rightmost node of each level has the infinity high key.
// In non-leaf nodes the last item's key equals the node's high key.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::index::btree::error::{BTreeError, Result};
use crate::index::btree::item::{IndexItem, ItemComparator};
use crate::index::btree::manager::BTreeConfig;
use crate::storage::page::layout::{DATA_START, SLOT_SIZE};
use crate::storage::page::SlottedPage;

/// Page type code of index nodes
pub const BTREE_NODE_PAGE_TYPE: u16 = 2;

/// Space for the header and items of one node
pub const NODE_CAPACITY: usize = PAGE_SIZE - DATA_START;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHeader {
    pub leaf: bool,
    pub unique: bool,
    pub key_type: u16,
    pub location_type: u16,
    pub left_sibling: Option<i32>,
    pub right_sibling: Option<i32>,
    pub high_key: IndexItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTreeNode {
    pub header: NodeHeader,
    pub items: Vec<IndexItem>,
}

impl BTreeNode {
    /// Empty leaf spanning the whole key space, the shape of a new root
    pub fn new_root(unique: bool, key_type: u16, location_type: u16) -> Self {
        Self {
            header: NodeHeader {
                leaf: true,
                unique,
                key_type,
                location_type,
                left_sibling: None,
                right_sibling: None,
                high_key: IndexItem::infinity(),
            },
            items: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.header.leaf
    }

    pub fn key_count(&self) -> usize {
        self.items.len()
    }

    pub fn high_key(&self) -> &IndexItem {
        &self.header.high_key
    }

    pub fn is_rightmost(&self) -> bool {
        self.header.right_sibling.is_none()
    }

    pub fn load(page: &Page) -> Result<Self> {
        if page.page_type() != BTREE_NODE_PAGE_TYPE {
            return Err(BTreeError::invalid_node(
                page.page_id,
                format!("page type {}", page.page_type()),
            ));
        }
        let slots = SlottedPage::slot_count(page);
        if slots == 0 {
            return Err(BTreeError::invalid_node(page.page_id, "missing node header"));
        }
        let header: NodeHeader = bincode::deserialize(SlottedPage::get(page, 0)?)?;
        let mut items = Vec::with_capacity(slots - 1);
        for slot in 1..slots {
            items.push(bincode::deserialize(SlottedPage::get(page, slot)?)?);
        }
        Ok(Self { header, items })
    }

    /// Replace the page contents with this node
    pub fn store(&self, page: &mut Page) -> Result<()> {
        SlottedPage::format(page);
        SlottedPage::insert_at(page, 0, &bincode::serialize(&self.header)?)?;
        for (i, item) in self.items.iter().enumerate() {
            SlottedPage::insert_at(page, i + 1, &bincode::serialize(item)?)?;
        }
        Ok(())
    }

    /// Bytes taken on a page, slots included
    pub fn encoded_size(&self) -> Result<usize> {
        let mut size = bincode::serialized_size(&self.header)? as usize + SLOT_SIZE;
        for item in &self.items {
            size += Self::item_size(item)?;
        }
        Ok(size)
    }

    pub fn item_size(item: &IndexItem) -> Result<usize> {
        Ok(bincode::serialized_size(item)? as usize + SLOT_SIZE)
    }

    /// Whether the node stays within its limits with one more item of
    /// `item_size` bytes
    pub fn can_accept(&self, item_size: usize, config: &BTreeConfig) -> Result<bool> {
        if config.max_items_per_node > 0 && self.items.len() >= config.max_items_per_node {
            return Ok(false);
        }
        Ok(self.encoded_size()? + item_size <= NODE_CAPACITY)
    }

    pub fn fits(&self, config: &BTreeConfig) -> Result<bool> {
        if config.max_items_per_node > 0 && self.items.len() > config.max_items_per_node {
            return Ok(false);
        }
        Ok(self.encoded_size()? <= NODE_CAPACITY)
    }

    /// Too few items to give one up without repair
    pub fn is_about_to_underflow(&self, config: &BTreeConfig) -> bool {
        self.items.len() <= config.underflow_threshold()
    }

    /// Position of `target`, or where it would be inserted
    pub fn search(&self, target: &IndexItem, cmp: &ItemComparator) -> std::result::Result<usize, usize> {
        self.items.binary_search_by(|item| cmp.compare(item, target))
    }

    /// First position holding an item greater than or equal to `target`
    pub fn lower_bound(&self, target: &IndexItem, cmp: &ItemComparator) -> usize {
        self.items
            .partition_point(|item| cmp.compare(item, target) == Ordering::Less)
    }

    /// First position holding an item greater than `target`
    pub fn upper_bound(&self, target: &IndexItem, cmp: &ItemComparator) -> usize {
        self.items
            .partition_point(|item| cmp.compare(item, target) != Ordering::Greater)
    }

    /// Index of the child whose key range holds `target`
    pub fn child_index(&self, target: &IndexItem, cmp: &ItemComparator) -> usize {
        self.lower_bound(target, cmp).min(self.items.len().saturating_sub(1))
    }

    pub fn child_at(&self, index: usize, page_id: PageId) -> Result<i32> {
        self.items
            .get(index)
            .and_then(|item| item.child)
            .ok_or_else(|| BTreeError::invalid_node(page_id, format!("no child pointer at {}", index)))
    }

    /// Whether `target` lies at or below the high key
    pub fn covers(&self, target: &IndexItem, cmp: &ItemComparator) -> bool {
        cmp.compare(target, &self.header.high_key) != Ordering::Greater
    }

    /// Number of items to keep on the left when splitting, balancing bytes
    pub fn split_point(items: &[IndexItem]) -> Result<usize> {
        let sizes = items
            .iter()
            .map(Self::item_size)
            .collect::<Result<Vec<usize>>>()?;
        let total: usize = sizes.iter().sum();
        let mut running = 0;
        let mut point = items.len();
        for (i, size) in sizes.iter().enumerate() {
            running += size;
            if running * 2 >= total {
                point = i + 1;
                break;
            }
        }
        Ok(point.clamp(1, items.len().saturating_sub(1).max(1)))
    }

    /// Split off the upper part of the items. The node keeps the lower part
    /// and takes the last kept item as its high key; the returned node
    /// inherits the old high key.
    pub fn split_upper(&mut self, at: usize) -> BTreeNode {
        let upper = self.items.split_off(at);
        let mut header = self.header.clone();
        header.left_sibling = None;
        self.header.high_key = self
            .items
            .last()
            .map(IndexItem::bound)
            .unwrap_or_else(IndexItem::infinity);
        BTreeNode { header, items: upper }
    }

    /// Every item in order, for dumps and tests
    pub fn describe(&self, cmp: &ItemComparator) -> Vec<String> {
        self.items
            .iter()
            .map(|item| match item.child {
                Some(child) => format!("{} -> {}", cmp.format_key(&item.key), child),
                None => format!("{} @ {}", cmp.format_key(&item.key), cmp.format_location(&item.location)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests;
