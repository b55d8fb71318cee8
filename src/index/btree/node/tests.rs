use std::sync::Arc;

use crate::common::types::{Page, PageId};
use crate::index::btree::item::{IndexItem, ItemComparator};
use crate::index::btree::key::{IndexKey, RowLocationFactory, StringKeyFactory, ROW_LOCATION_TYPE, STRING_KEY_TYPE};
use crate::index::btree::manager::BTreeConfig;
use crate::index::btree::node::{BTreeNode, BTREE_NODE_PAGE_TYPE};

fn comparator() -> ItemComparator {
    ItemComparator::new(Arc::new(StringKeyFactory), Arc::new(RowLocationFactory), false)
}

fn item(key: &str, row: u64) -> IndexItem {
    IndexItem::leaf(key.as_bytes(), RowLocationFactory::encode(row))
}

fn leaf(keys: &[&str]) -> BTreeNode {
    let mut node = BTreeNode::new_root(false, STRING_KEY_TYPE, ROW_LOCATION_TYPE);
    node.items = keys.iter().enumerate().map(|(i, k)| item(k, i as u64)).collect();
    node
}

#[test]
fn test_store_and_load() {
    let mut page = Page::new(PageId::new(5, 1));
    page.set_page_type(BTREE_NODE_PAGE_TYPE);
    let mut node = leaf(&["apple", "banana", "cherry"]);
    node.header.right_sibling = Some(7);
    node.store(&mut page).unwrap();

    let loaded = BTreeNode::load(&page).unwrap();
    assert_eq!(loaded, node);
    assert!(loaded.high_key().is_infinity());
}

#[test]
fn test_load_rejects_other_page_types() {
    let page = Page::new(PageId::new(5, 1));
    assert!(BTreeNode::load(&page).is_err());
}

#[test]
fn test_search_positions() {
    let cmp = comparator();
    let node = leaf(&["b", "d", "f"]);
    assert_eq!(node.search(&item("d", 1), &cmp), Ok(1));
    assert_eq!(node.search(&item("c", 0), &cmp), Err(1));
    assert_eq!(node.lower_bound(&item("d", 0), &cmp), 1);
    assert_eq!(node.upper_bound(&item("d", 1), &cmp), 2);
    assert_eq!(node.lower_bound(&item("z", 0), &cmp), 3);
}

#[test]
fn test_child_index_uses_high_keys() {
    let cmp = comparator();
    let mut node = leaf(&[]);
    node.header.leaf = false;
    node.items = vec![
        IndexItem::branch(&item("m", 3), 2),
        IndexItem::branch(&IndexItem::infinity(), 3),
    ];
    assert_eq!(node.child_index(&item("a", 0), &cmp), 0);
    assert_eq!(node.child_index(&item("m", 3), &cmp), 0);
    assert_eq!(node.child_index(&item("m", 4), &cmp), 1);
    assert_eq!(node.child_at(1, PageId::new(1, 1)).unwrap(), 3);
}

#[test]
fn test_split_sets_high_keys() {
    let cmp = comparator();
    let mut node = leaf(&["a", "b", "c", "d", "e"]);
    let at = BTreeNode::split_point(&node.items).unwrap();
    assert_eq!(at, 3);
    let upper = node.split_upper(at);

    assert_eq!(node.items.len() + upper.items.len(), 5);
    assert_eq!(node.high_key(), &item("c", 2));
    assert!(upper.high_key().is_infinity());
    assert!(node.covers(&item("c", 2), &cmp));
    assert!(!node.covers(&item("d", 3), &cmp));
    assert_eq!(upper.items[0].key, IndexKey::Value(b"d".to_vec()));
}

#[test]
fn test_capacity_limits() {
    let config = BTreeConfig {
        max_items_per_node: 4,
        ..BTreeConfig::default()
    };
    let node = leaf(&["a", "b", "c", "d"]);
    let size = BTreeNode::item_size(&item("e", 9)).unwrap();
    assert!(!node.can_accept(size, &config).unwrap());
    assert!(node.fits(&config).unwrap());
    assert!(!node.is_about_to_underflow(&config));
    assert!(leaf(&["a"]).is_about_to_underflow(&config));

    let unlimited = BTreeConfig::default();
    assert!(node.can_accept(size, &unlimited).unwrap());
}
