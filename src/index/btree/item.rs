// SimpleDBM B-Tree Index Items

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::registry::ObjectRegistry;
use crate::index::btree::error::Result;
use crate::index::btree::key::{IndexKey, KeyFactory, Location, LocationFactory};

/// One entry of a node. Leaf items point at data locations; non-leaf items
/// carry the high key of a child and the child's page number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexItem {
    pub key: IndexKey,
    pub location: Location,
    pub child: Option<i32>,
}

impl IndexItem {
    pub fn leaf(key: &[u8], location: Location) -> Self {
        Self {
            key: IndexKey::Value(key.to_vec()),
            location,
            child: None,
        }
    }

    pub fn branch(bound: &IndexItem, child: i32) -> Self {
        Self {
            key: bound.key.clone(),
            location: bound.location.clone(),
            child: Some(child),
        }
    }

    /// The sentinel bounding the right edge of a level
    pub fn infinity() -> Self {
        Self {
            key: IndexKey::Infinity,
            location: Location::default(),
            child: None,
        }
    }

    /// Key and location only, as used for high keys
    pub fn bound(&self) -> Self {
        Self {
            key: self.key.clone(),
            location: self.location.clone(),
            child: None,
        }
    }

    pub fn is_infinity(&self) -> bool {
        self.key.is_infinity()
    }
}

/// Orders items of one index. Unique indexes order by key alone; others
/// break ties on the location.
#[derive(Clone)]
pub struct ItemComparator {
    keys: Arc<dyn KeyFactory>,
    locations: Arc<dyn LocationFactory>,
    unique: bool,
}

impl ItemComparator {
    pub fn new(keys: Arc<dyn KeyFactory>, locations: Arc<dyn LocationFactory>, unique: bool) -> Self {
        Self { keys, locations, unique }
    }

    pub fn from_registry(registry: &ObjectRegistry, key_type: u16, location_type: u16, unique: bool) -> Result<Self> {
        Ok(Self::new(
            registry.key_factory(key_type)?,
            registry.location_factory(location_type)?,
            unique,
        ))
    }

    pub fn compare(&self, a: &IndexItem, b: &IndexItem) -> Ordering {
        match a.key.compare(&b.key, self.keys.as_ref()) {
            Ordering::Equal if !self.unique && !a.is_infinity() => self
                .locations
                .compare(a.location.as_bytes(), b.location.as_bytes()),
            ordering => ordering,
        }
    }

    pub fn same_key(&self, a: &IndexItem, b: &IndexItem) -> bool {
        a.key.compare(&b.key, self.keys.as_ref()) == Ordering::Equal
    }

    pub fn same_entry(&self, a: &IndexItem, b: &IndexItem) -> bool {
        self.same_key(a, b)
            && self.locations.compare(a.location.as_bytes(), b.location.as_bytes()) == Ordering::Equal
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn key_factory(&self) -> &Arc<dyn KeyFactory> {
        &self.keys
    }

    pub fn location_factory(&self) -> &Arc<dyn LocationFactory> {
        &self.locations
    }

    pub fn format_key(&self, key: &IndexKey) -> String {
        key.display(self.keys.as_ref())
    }

    pub fn format_location(&self, location: &Location) -> String {
        self.locations.format(location.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::btree::key::{RowLocationFactory, StringKeyFactory};

    fn comparator(unique: bool) -> ItemComparator {
        ItemComparator::new(Arc::new(StringKeyFactory), Arc::new(RowLocationFactory), unique)
    }

    #[test]
    fn test_locations_break_ties_unless_unique() {
        let a1 = IndexItem::leaf(b"a", RowLocationFactory::encode(1));
        let a2 = IndexItem::leaf(b"a", RowLocationFactory::encode(2));
        assert_eq!(comparator(false).compare(&a1, &a2), Ordering::Less);
        assert_eq!(comparator(true).compare(&a1, &a2), Ordering::Equal);
        assert!(comparator(false).same_key(&a1, &a2));
        assert!(!comparator(false).same_entry(&a1, &a2));
        assert_eq!(comparator(false).compare(&a2, &IndexItem::infinity()), Ordering::Less);
    }
}
