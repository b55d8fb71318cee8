// SimpleDBM B-Tree Index Manager
//
// Each index owns a container. Page 0 is the container's first space map
// page and page 1 is the root, which never moves.

use std::sync::Arc;

use log::info;

use crate::common::registry::ObjectRegistry;
use crate::common::types::{OwnerId, Page, PageId};
use crate::index::btree::error::{BTreeError, Result};
use crate::index::btree::handler::BTreeHandler;
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::item::ItemComparator;
use crate::index::btree::log_records::{NodeImage, BTREE_MODULE_ID, NEW_NODE};
use crate::index::btree::node::{BTreeNode, BTREE_NODE_PAGE_TYPE, NODE_CAPACITY};
use crate::storage::buffer::{BufferManager, BufferPoolError, FixHint};
use crate::storage::disk::ContainerError;
use crate::storage::fsm::{FreeSpaceManager, SpaceError};
use crate::storage::page::SlottedPage;
use crate::transaction::wal::{LogRecord, LogRecordKind};
use crate::transaction::{HandlerRegistry, Transaction};

/// Page number of every index's root
pub const ROOT_PAGE_NUMBER: i32 = 1;

/// Largest location accepted by an index
pub const MAX_LOCATION_SIZE: usize = 64;

/// Latch owner for reading index metadata outside any transaction
pub(crate) const METADATA_OWNER: OwnerId = u64::MAX - 3;

const MAX_KEY_SIZE_LIMIT: usize = NODE_CAPACITY / 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeConfig {
    /// Items per node before it splits; 0 leaves the limit to page space
    pub max_items_per_node: usize,
    /// Largest key accepted, in bytes
    pub max_key_size: usize,
}

impl Default for BTreeConfig {
    fn default() -> Self {
        Self {
            max_items_per_node: 0,
            max_key_size: 256,
        }
    }
}

impl BTreeConfig {
    /// Nodes with this many items or fewer are repaired before a delete
    /// passes through them
    pub fn underflow_threshold(&self) -> usize {
        if self.max_items_per_node > 0 {
            (self.max_items_per_node / 4).max(1)
        } else {
            1
        }
    }

    fn normalized(self) -> Self {
        Self {
            max_items_per_node: if self.max_items_per_node == 0 {
                0
            } else {
                self.max_items_per_node.max(4)
            },
            max_key_size: self.max_key_size.clamp(1, MAX_KEY_SIZE_LIMIT),
        }
    }
}

fn format_node(page: &mut Page) {
    SlottedPage::format(page);
}

#[derive(Clone)]
pub struct BTreeManager {
    buffers: Arc<BufferManager>,
    space: Arc<FreeSpaceManager>,
    config: BTreeConfig,
}

impl BTreeManager {
    pub fn new(buffers: Arc<BufferManager>, space: Arc<FreeSpaceManager>, config: BTreeConfig) -> Self {
        Self {
            buffers,
            space,
            config: config.normalized(),
        }
    }

    /// Register the node page type and the index log handler
    pub fn register_types(&self, handlers: &HandlerRegistry) -> crate::transaction::Result<()> {
        self.buffers
            .registry()
            .register_page_type(BTREE_NODE_PAGE_TYPE, "btree node", format_node)?;
        handlers.register(BTREE_MODULE_ID, Arc::new(BTreeHandler::new(self.clone())))?;
        Ok(())
    }

    pub fn config(&self) -> BTreeConfig {
        self.config
    }

    pub fn registry(&self) -> &ObjectRegistry {
        self.buffers.registry()
    }

    pub(crate) fn buffers(&self) -> &Arc<BufferManager> {
        &self.buffers
    }

    pub(crate) fn space(&self) -> &Arc<FreeSpaceManager> {
        &self.space
    }

    /// Create an empty index in a new container
    pub fn create_index(
        &self,
        trx: &Transaction,
        container_id: i32,
        key_type: u16,
        location_type: u16,
        unique: bool,
    ) -> Result<BTreeIndex> {
        let cmp = ItemComparator::from_registry(self.registry(), key_type, location_type, unique)?;
        match self.space.create_container(trx, container_id) {
            Ok(()) => {}
            Err(SpaceError::ContainerExists(id)) => return Err(BTreeError::IndexExists(id)),
            Err(e) => return Err(e.into()),
        }
        let root = self.space.allocate_page(trx, container_id)?;
        if root.page_number != ROOT_PAGE_NUMBER {
            return Err(BTreeError::invalid_node(root, "root page not allocated first"));
        }
        let bab = self
            .buffers
            .fix_exclusive(trx.owner(), root, true, BTREE_NODE_PAGE_TYPE, FixHint::Normal)?;
        let record = LogRecord::for_module(
            BTREE_MODULE_ID,
            NEW_NODE,
            LogRecordKind::Redo,
            &NodeImage {
                before: None,
                after: BTreeNode::new_root(unique, key_type, location_type),
            },
        )?
        .with_page_format(BTREE_NODE_PAGE_TYPE);
        trx.log_insert(&bab, record)?;
        info!(
            "Created {} index in container {} ({} keys, {} locations)",
            if unique { "unique" } else { "non-unique" },
            container_id,
            cmp.key_factory().name(),
            cmp.location_factory().name()
        );
        Ok(BTreeIndex::new(self.clone(), container_id, cmp))
    }

    /// Open the index stored in `container_id`, reading its key and
    /// location types from the root
    pub fn open_index(&self, container_id: i32) -> Result<BTreeIndex> {
        let root = PageId::new(container_id, ROOT_PAGE_NUMBER);
        let bab = match self.buffers.fix_shared(METADATA_OWNER, root, FixHint::Normal) {
            Ok(bab) => bab,
            Err(BufferPoolError::PageNotFound(_))
            | Err(BufferPoolError::Container(ContainerError::NotOpen(_))) => {
                return Err(BTreeError::NoIndex(container_id))
            }
            Err(e) => return Err(e.into()),
        };
        if bab.page().page_type() != BTREE_NODE_PAGE_TYPE {
            return Err(BTreeError::NoIndex(container_id));
        }
        let header = BTreeNode::load(&bab.page())?.header;
        drop(bab);
        let cmp = ItemComparator::from_registry(self.registry(), header.key_type, header.location_type, header.unique)?;
        Ok(BTreeIndex::new(self.clone(), container_id, cmp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_normalization() {
        let config = BTreeConfig {
            max_items_per_node: 2,
            max_key_size: 1 << 20,
        }
        .normalized();
        assert_eq!(config.max_items_per_node, 4);
        assert_eq!(config.max_key_size, MAX_KEY_SIZE_LIMIT);
        assert_eq!(config.underflow_threshold(), 1);
        assert_eq!(BTreeConfig::default().normalized(), BTreeConfig::default());
        let wide = BTreeConfig {
            max_items_per_node: 40,
            ..BTreeConfig::default()
        };
        assert_eq!(wide.underflow_threshold(), 10);
    }
}
