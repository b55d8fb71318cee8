// Redo and undo of B-tree log records

use crate::common::types::Page;
use crate::index::btree::error::BTreeError;
use crate::index::btree::item::ItemComparator;
use crate::index::btree::log_records::{
    type_name, KeyChange, NodeImage, BTREE_MODULE_ID, DECREASE_HEIGHT, DELETE_KEY, INCREASE_HEIGHT, INSERT_KEY,
    LINK, MERGE, NEW_NODE, REDISTRIBUTE, RESTORE_NODE, SPLIT, UNLINK,
};
use crate::index::btree::manager::BTreeManager;
use crate::index::btree::node::BTreeNode;
use crate::transaction::wal::{LogRecord, LogRecordKind};
use crate::transaction::{LogHandler, Result, Transaction, TransactionError};

pub struct BTreeHandler {
    manager: BTreeManager,
}

impl BTreeHandler {
    pub fn new(manager: BTreeManager) -> Self {
        Self { manager }
    }

    fn comparator(&self, node: &BTreeNode) -> std::result::Result<ItemComparator, BTreeError> {
        ItemComparator::from_registry(
            self.manager.registry(),
            node.header.key_type,
            node.header.location_type,
            node.header.unique,
        )
    }

    fn redo_key_change(&self, page: &mut Page, record: &LogRecord) -> std::result::Result<(), BTreeError> {
        let change: KeyChange = record.decode()?;
        let mut node = BTreeNode::load(page)?;
        let cmp = self.comparator(&node)?;
        match record.type_code {
            INSERT_KEY => {
                let pos = match node.search(&change.item, &cmp) {
                    Ok(pos) | Err(pos) => pos,
                };
                node.items.insert(pos, change.item);
            }
            _ => {
                let pos = node
                    .search(&change.item, &cmp)
                    .ok()
                    .filter(|&pos| cmp.same_entry(&node.items[pos], &change.item))
                    .ok_or(BTreeError::KeyNotFound)?;
                node.items.remove(pos);
            }
        }
        node.store(page)
    }

    fn container_of(record: &LogRecord) -> Result<i32> {
        record
            .page_id
            .map(|page_id| page_id.container_id)
            .ok_or_else(|| TransactionError::InvalidLogRecord {
                lsn: record.lsn,
                reason: "index record without a page".into(),
            })
    }
}

impl LogHandler for BTreeHandler {
    fn name(&self) -> &'static str {
        "btree"
    }

    fn redo(&self, page: &mut Page, record: &LogRecord) -> Result<()> {
        match record.type_code {
            INSERT_KEY | DELETE_KEY => self.redo_key_change(page, record)?,
            NEW_NODE | SPLIT | LINK | UNLINK | MERGE | REDISTRIBUTE | INCREASE_HEIGHT | DECREASE_HEIGHT
            | RESTORE_NODE => {
                let image: NodeImage = record.decode()?;
                image.after.store(page)?;
            }
            other => {
                return Err(TransactionError::InvalidLogRecord {
                    lsn: record.lsn,
                    reason: format!("unknown index record type {}", other),
                })
            }
        }
        Ok(())
    }

    fn undo(&self, trx: &Transaction, record: &LogRecord) -> Result<()> {
        match record.type_code {
            INSERT_KEY => {
                let index = self.manager.open_index(Self::container_of(record)?)?;
                index.undo_insert(trx, record)?;
            }
            DELETE_KEY => {
                let index = self.manager.open_index(Self::container_of(record)?)?;
                index.undo_delete(trx, record)?;
            }
            SPLIT | LINK | UNLINK | MERGE | REDISTRIBUTE | INCREASE_HEIGHT | DECREASE_HEIGHT => {
                let image: NodeImage = record.decode()?;
                let Some(before) = image.before else {
                    return Err(TransactionError::InvalidLogRecord {
                        lsn: record.lsn,
                        reason: format!("{} record without a before image", type_name(record.type_code)),
                    });
                };
                let clr = LogRecord::for_module(
                    BTREE_MODULE_ID,
                    RESTORE_NODE,
                    LogRecordKind::Redo,
                    &NodeImage {
                        before: None,
                        after: before,
                    },
                )?;
                trx.compensate_page(record, clr)?;
            }
            other => {
                return Err(TransactionError::InvalidLogRecord {
                    lsn: record.lsn,
                    reason: format!("{} records are not undoable", type_name(other)),
                })
            }
        }
        Ok(())
    }
}
