// SimpleDBM Free Space Manager

pub mod error;
pub mod handler;
pub mod log_records;
pub mod manager;
pub mod map_page;


pub use error::SpaceError;
pub use manager::{FreeSpaceManager, SpaceManagerConfig};
pub use map_page::{SpaceMapPage, SPACE_MAP_PAGE_TYPE};
