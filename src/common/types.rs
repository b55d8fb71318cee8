// SimpleDBM Common Types

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Page size in bytes (8KB)
pub const PAGE_SIZE: usize = 8192;

/// Size of the header shared by every page type
pub const PAGE_HEADER_SIZE: usize = 16;

const PAGE_TYPE_OFFSET: usize = 0;
const PAGE_FLAGS_OFFSET: usize = 2;
const PAGE_LSN_INDEX_OFFSET: usize = 8;
const PAGE_LSN_OFFSET_OFFSET: usize = 12;

/// Transaction ID type
pub type TxnId = u64;

/// Identity of a latch or lock owner (a transaction or a system session)
pub type OwnerId = u64;

/// Buffer pool frame ID type
pub type FrameId = usize;

/// Identifies a page uniquely across all containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub container_id: i32,
    pub page_number: i32,
}

impl PageId {
    pub const fn new(container_id: i32, page_number: i32) -> Self {
        Self { container_id, page_number }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.container_id, self.page_number)
    }
}

/// Log sequence number: the log file index and the byte offset of a record
/// within that file. Ordered first by index, then by offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Lsn {
    pub index: u32,
    pub offset: u32,
}

impl Lsn {
    /// Lowest possible LSN, never assigned to a record
    pub const NULL: Lsn = Lsn { index: 0, offset: 0 };

    pub const fn new(index: u32, offset: u32) -> Self {
        Self { index, offset }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn as_u64(&self) -> u64 {
        ((self.index as u64) << 32) | self.offset as u64
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            index: (value >> 32) as u32,
            offset: value as u32,
        }
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.offset)
    }
}

/// In-memory image of one on-disk page.
///
/// The first `PAGE_HEADER_SIZE` bytes hold the page type, flags and the LSN
/// of the last log record applied to the page; the rest belongs to the page type.
#[derive(Clone)]
pub struct Page {
    pub page_id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            data: Box::new([0; PAGE_SIZE]),
        }
    }

    pub fn page_type(&self) -> u16 {
        LittleEndian::read_u16(&self.data[PAGE_TYPE_OFFSET..PAGE_TYPE_OFFSET + 2])
    }

    pub fn set_page_type(&mut self, page_type: u16) {
        LittleEndian::write_u16(&mut self.data[PAGE_TYPE_OFFSET..PAGE_TYPE_OFFSET + 2], page_type);
    }

    pub fn flags(&self) -> u16 {
        LittleEndian::read_u16(&self.data[PAGE_FLAGS_OFFSET..PAGE_FLAGS_OFFSET + 2])
    }

    pub fn set_flags(&mut self, flags: u16) {
        LittleEndian::write_u16(&mut self.data[PAGE_FLAGS_OFFSET..PAGE_FLAGS_OFFSET + 2], flags);
    }

    /// LSN of the last log record applied to this page
    pub fn lsn(&self) -> Lsn {
        Lsn::new(
            LittleEndian::read_u32(&self.data[PAGE_LSN_INDEX_OFFSET..PAGE_LSN_INDEX_OFFSET + 4]),
            LittleEndian::read_u32(&self.data[PAGE_LSN_OFFSET_OFFSET..PAGE_LSN_OFFSET_OFFSET + 4]),
        )
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        LittleEndian::write_u32(&mut self.data[PAGE_LSN_INDEX_OFFSET..PAGE_LSN_INDEX_OFFSET + 4], lsn.index);
        LittleEndian::write_u32(&mut self.data[PAGE_LSN_OFFSET_OFFSET..PAGE_LSN_OFFSET_OFFSET + 4], lsn.offset);
    }

    /// Zero the page and stamp it with a new type
    pub fn reset(&mut self, page_type: u16) {
        self.data.fill(0);
        self.set_page_type(page_type);
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("page_id", &self.page_id)
            .field("page_type", &self.page_type())
            .field("lsn", &self.lsn())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsn_ordering() {
        let a = Lsn::new(1, 500);
        let b = Lsn::new(2, 16);
        assert!(a < b);
        assert!(Lsn::NULL < a);
        assert_eq!(Lsn::from_u64(b.as_u64()), b);
    }

    #[test]
    fn test_page_header_fields() {
        let mut page = Page::new(PageId::new(3, 7));
        page.set_page_type(42);
        page.set_flags(0x0101);
        page.set_lsn(Lsn::new(5, 1024));

        assert_eq!(page.page_type(), 42);
        assert_eq!(page.flags(), 0x0101);
        assert_eq!(page.lsn(), Lsn::new(5, 1024));

        page.reset(9);
        assert_eq!(page.page_type(), 9);
        assert!(page.lsn().is_null());
    }
}
