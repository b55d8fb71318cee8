// Log records of the B-tree index manager
//
// Key changes are logged logically and undone by searching the tree again.
// Structure changes are logged per page as node images; the before image
// undoes the change when its nested top action never completed.

use serde::{Deserialize, Serialize};

use crate::index::btree::item::IndexItem;
use crate::index::btree::node::BTreeNode;

/// Module id of the index manager's log records
pub const BTREE_MODULE_ID: u16 = 2;

pub const INSERT_KEY: u16 = 1;
pub const DELETE_KEY: u16 = 2;
pub const NEW_NODE: u16 = 3;
pub const SPLIT: u16 = 4;
pub const LINK: u16 = 5;
pub const UNLINK: u16 = 6;
pub const MERGE: u16 = 7;
pub const REDISTRIBUTE: u16 = 8;
pub const INCREASE_HEIGHT: u16 = 9;
pub const DECREASE_HEIGHT: u16 = 10;
pub const RESTORE_NODE: u16 = 11;

/// Insertion or removal of one leaf item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChange {
    pub item: IndexItem,
}

/// Contents of one node before and after a structure change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeImage {
    pub before: Option<BTreeNode>,
    pub after: BTreeNode,
}

pub fn type_name(type_code: u16) -> &'static str {
    match type_code {
        INSERT_KEY => "insert key",
        DELETE_KEY => "delete key",
        NEW_NODE => "new node",
        SPLIT => "split",
        LINK => "link",
        UNLINK => "unlink",
        MERGE => "merge",
        REDISTRIBUTE => "redistribute",
        INCREASE_HEIGHT => "increase height",
        DECREASE_HEIGHT => "decrease height",
        RESTORE_NODE => "restore node",
        _ => "unknown",
    }
}
