// Log records of the space manager

use serde::{Deserialize, Serialize};

use crate::common::types::Page;
use crate::storage::fsm::map_page::SpaceMapPage;

/// Module id of the space manager's log records
pub const SPACE_MODULE_ID: u16 = 1;

pub const CREATE_CONTAINER: u16 = 1;
pub const FORMAT_MAP: u16 = 2;
pub const SET_MAP_COUNT: u16 = 3;
pub const UPDATE_BIT: u16 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContainer {
    pub container_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatMap {
    pub pages_per_map: u32,
    /// Map count stored on the first map page
    pub map_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMapCount {
    pub map_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBit {
    pub bit: u32,
    pub allocated: bool,
}

impl FormatMap {
    pub fn apply(&self, page: &mut Page) {
        SpaceMapPage::format(page, self.pages_per_map);
        SpaceMapPage::set_map_count(page, self.map_count);
    }
}
