use byteorder::{ByteOrder, LittleEndian};

use crate::storage::page::layout::{DATA_START, SLOTTED_HEADER_OFFSET};

/// Bookkeeping for the slotted layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlottedPageHeader {
    pub slot_count: u16,
    /// End of the item data area; new items are written here
    pub free_space_offset: u16,
    /// Bytes occupied by dead items, reclaimed by compaction
    pub garbage: u16,
}

impl Default for SlottedPageHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl SlottedPageHeader {
    pub fn new() -> Self {
        Self {
            slot_count: 0,
            free_space_offset: DATA_START as u16,
            garbage: 0,
        }
    }

    pub fn read(data: &[u8]) -> Self {
        let base = SLOTTED_HEADER_OFFSET;
        Self {
            slot_count: LittleEndian::read_u16(&data[base..base + 2]),
            free_space_offset: LittleEndian::read_u16(&data[base + 2..base + 4]),
            garbage: LittleEndian::read_u16(&data[base + 4..base + 6]),
        }
    }

    pub fn write(&self, data: &mut [u8]) {
        let base = SLOTTED_HEADER_OFFSET;
        LittleEndian::write_u16(&mut data[base..base + 2], self.slot_count);
        LittleEndian::write_u16(&mut data[base + 2..base + 4], self.free_space_offset);
        LittleEndian::write_u16(&mut data[base + 4..base + 6], self.garbage);
    }
}
