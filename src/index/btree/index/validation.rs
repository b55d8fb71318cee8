// Consistency checks and listings of a quiescent tree

use std::cmp::Ordering;

use crate::common::types::{OwnerId, PageId};
use crate::concurrency::LockMode;
use crate::index::btree::error::{BTreeError, Result};
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::item::IndexItem;
use crate::index::btree::manager::ROOT_PAGE_NUMBER;
use crate::index::btree::node::BTreeNode;

/// Shape of a tree as found by `BTreeIndex::verify`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: usize,
    pub leaf_pages: usize,
    pub branch_pages: usize,
    pub keys: usize,
}

impl BTreeIndex {
    fn read_node(&self, owner: OwnerId, page_number: i32) -> Result<BTreeNode> {
        Ok(self.fix_node(owner, page_number, LockMode::Shared)?.node)
    }

    /// Check ordering, high keys, downlinks and sibling chains of the whole
    /// tree. Meant for tests and tools; concurrent changes may be reported
    /// as corruption.
    pub fn verify(&self, owner: OwnerId) -> Result<TreeStats> {
        let mut stats = TreeStats::default();
        let mut level = vec![ROOT_PAGE_NUMBER];
        loop {
            stats.height += 1;
            let mut next_level = Vec::new();
            let mut previous: Option<(i32, BTreeNode)> = None;
            let mut leaf_level = false;
            for &page_number in &level {
                let node = self.read_node(owner, page_number)?;
                let page_id = PageId::new(self.container_id, page_number);
                self.check_node(page_id, &node)?;
                if let Some((left_number, left)) = &previous {
                    if left.header.right_sibling != Some(page_number) || node.header.left_sibling != Some(*left_number)
                    {
                        return Err(BTreeError::invalid_node(page_id, "broken sibling links"));
                    }
                    if self.cmp.compare(left.high_key(), node.high_key()) != Ordering::Less {
                        return Err(BTreeError::invalid_node(page_id, "high keys out of order"));
                    }
                } else if node.header.left_sibling.is_some() {
                    return Err(BTreeError::invalid_node(page_id, "leftmost node has a left sibling"));
                }
                leaf_level = node.is_leaf();
                if leaf_level {
                    stats.leaf_pages += 1;
                    stats.keys += node.key_count();
                } else {
                    stats.branch_pages += 1;
                    for (idx, item) in node.items.iter().enumerate() {
                        let child_number = node.child_at(idx, page_id)?;
                        let child = self.read_node(owner, child_number)?;
                        if self.cmp.compare(child.high_key(), item) != Ordering::Equal {
                            return Err(BTreeError::invalid_node(
                                PageId::new(self.container_id, child_number),
                                "high key differs from the parent's separator",
                            ));
                        }
                        next_level.push(child_number);
                    }
                }
                previous = Some((page_number, node));
            }
            if let Some((page_number, last)) = &previous {
                if !last.is_rightmost() || !last.high_key().is_infinity() {
                    return Err(BTreeError::invalid_node(
                        PageId::new(self.container_id, *page_number),
                        "rightmost node does not end the level",
                    ));
                }
            }
            if leaf_level {
                return Ok(stats);
            }
            level = next_level;
        }
    }

    fn check_node(&self, page_id: PageId, node: &BTreeNode) -> Result<()> {
        for pair in node.items.windows(2) {
            if self.cmp.compare(&pair[0], &pair[1]) != Ordering::Less {
                return Err(BTreeError::invalid_node(page_id, "items out of order"));
            }
        }
        if let Some(last) = node.items.last() {
            if !node.covers(last, &self.cmp) {
                return Err(BTreeError::invalid_node(page_id, "item above the high key"));
            }
            if !node.is_leaf() && self.cmp.compare(last, node.high_key()) != Ordering::Equal {
                return Err(BTreeError::invalid_node(page_id, "last separator differs from the high key"));
            }
        } else if !node.is_leaf() {
            return Err(BTreeError::invalid_node(page_id, "empty non-leaf node"));
        }
        Ok(())
    }

    /// Every leaf entry in key order
    pub fn entries(&self, owner: OwnerId) -> Result<Vec<IndexItem>> {
        let mut entries = Vec::new();
        let mut leaf = Some(self.descend(owner, None, LockMode::Shared)?.node);
        while let Some(node) = leaf {
            entries.extend(node.items.iter().cloned());
            leaf = match node.header.right_sibling {
                Some(right) => Some(self.read_node(owner, right)?),
                None => None,
            };
        }
        Ok(entries)
    }

    /// Keys in order, formatted by the key factory
    pub fn keys(&self, owner: OwnerId) -> Result<Vec<String>> {
        Ok(self
            .entries(owner)?
            .iter()
            .map(|item| self.cmp.format_key(&item.key))
            .collect())
    }

    /// One line per node, level by level
    pub fn dump(&self, owner: OwnerId) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut level = vec![ROOT_PAGE_NUMBER];
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for page_number in level {
                let node = self.read_node(owner, page_number)?;
                lines.push(format!(
                    "page {} {} left={:?} right={:?} high={} [{}]",
                    page_number,
                    if node.is_leaf() { "leaf" } else { "branch" },
                    node.header.left_sibling,
                    node.header.right_sibling,
                    self.cmp.format_key(&node.high_key().key),
                    node.describe(&self.cmp).join(", ")
                ));
                next_level.extend(node.items.iter().filter_map(|item| item.child));
            }
            level = next_level;
        }
        Ok(lines)
    }
}
