use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PAGE_HEADER_SIZE, PAGE_SIZE};

/// Offset of the slotted page header, right after the common page header
pub const SLOTTED_HEADER_OFFSET: usize = PAGE_HEADER_SIZE;
pub const SLOTTED_HEADER_SIZE: usize = 8;
/// First byte available for item data
pub const DATA_START: usize = SLOTTED_HEADER_OFFSET + SLOTTED_HEADER_SIZE;
/// Each slot holds a 2 byte offset and a 2 byte length
pub const SLOT_SIZE: usize = 4;

/// Slot directory entry. Slots grow downward from the end of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    pub offset: u16,
    pub length: u16,
}

impl SlotEntry {
    pub fn position(slot: usize) -> usize {
        PAGE_SIZE - SLOT_SIZE * (slot + 1)
    }

    pub fn read(data: &[u8], slot: usize) -> Self {
        let pos = Self::position(slot);
        Self {
            offset: LittleEndian::read_u16(&data[pos..pos + 2]),
            length: LittleEndian::read_u16(&data[pos + 2..pos + 4]),
        }
    }

    pub fn write(&self, data: &mut [u8], slot: usize) {
        let pos = Self::position(slot);
        LittleEndian::write_u16(&mut data[pos..pos + 2], self.offset);
        LittleEndian::write_u16(&mut data[pos + 2..pos + 4], self.length);
    }
}
