// SimpleDBM B-Tree Index Manager

pub mod error;
pub mod handler;
pub mod index;
pub mod item;
pub mod key;
pub mod log_records;
pub mod manager;
pub mod node;

pub use error::{BTreeError, Result as BTreeResult};
pub use index::{BTreeIndex, IndexScan, TreeStats};
pub use item::{IndexItem, ItemComparator};
pub use key::{
    IndexKey, IntKeyFactory, KeyFactory, Location, LocationFactory, RowLocationFactory, StringKeyFactory,
    INT_KEY_TYPE, ROW_LOCATION_TYPE, STRING_KEY_TYPE,
};
pub use manager::{BTreeConfig, BTreeManager, MAX_LOCATION_SIZE, ROOT_PAGE_NUMBER};
pub use node::{BTreeNode, BTREE_NODE_PAGE_TYPE};
