// SimpleDBM Page Module

pub mod error;
pub mod header;
pub mod layout;
pub mod slotted;

pub use error::PageError;
pub use header::SlottedPageHeader;
pub use slotted::SlottedPage;

/// Page type of unformatted pages
pub const RAW_PAGE_TYPE: u16 = 0;
