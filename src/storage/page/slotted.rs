// SimpleDBM Slotted Page
//
// Variable-length items addressed by slot number. Slots are kept dense:
// inserting at a slot shifts the following slots up by one, deleting
// shifts them down. Item data grows upward from the header, the slot
// directory grows downward from the end of the page.

use crate::common::types::{Page, PAGE_SIZE};
use crate::storage::page::error::{PageError, Result};
use crate::storage::page::header::SlottedPageHeader;
use crate::storage::page::layout::{SlotEntry, DATA_START, SLOT_SIZE};

/// Stateless accessor for pages using the slotted layout
pub struct SlottedPage;

impl SlottedPage {
    /// Initialize an empty slotted layout, keeping the page type and LSN
    pub fn format(page: &mut Page) {
        page.data[DATA_START..].fill(0);
        SlottedPageHeader::new().write(&mut page.data[..]);
    }

    pub fn header(page: &Page) -> SlottedPageHeader {
        SlottedPageHeader::read(&page.data[..])
    }

    pub fn slot_count(page: &Page) -> usize {
        Self::header(page).slot_count as usize
    }

    /// Bytes available for new items and their slots, counting reclaimable space
    pub fn free_space(page: &Page) -> usize {
        let header = Self::header(page);
        Self::contiguous_free(&header) + header.garbage as usize
    }

    /// Bytes used by live items and their slots
    pub fn used_space(page: &Page) -> usize {
        PAGE_SIZE - DATA_START - Self::free_space(page)
    }

    pub fn can_insert(page: &Page, length: usize) -> bool {
        Self::free_space(page) >= length + SLOT_SIZE
    }

    pub fn can_replace(page: &Page, slot: usize, length: usize) -> bool {
        if slot >= Self::slot_count(page) {
            return false;
        }
        let old = SlotEntry::read(&page.data[..], slot);
        Self::free_space(page) + old.length as usize >= length
    }

    pub fn get(page: &Page, slot: usize) -> Result<&[u8]> {
        let count = Self::slot_count(page);
        if slot >= count {
            return Err(PageError::InvalidSlot { slot, count });
        }
        let entry = SlotEntry::read(&page.data[..], slot);
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        if end > PAGE_SIZE {
            return Err(PageError::Corrupt(format!("slot {} extends past end of page", slot)));
        }
        Ok(&page.data[start..end])
    }

    /// Insert an item so that it occupies `slot`, shifting later slots up
    pub fn insert_at(page: &mut Page, slot: usize, item: &[u8]) -> Result<()> {
        let mut header = Self::header(page);
        let count = header.slot_count as usize;
        if slot > count {
            return Err(PageError::InvalidSlot { slot, count });
        }
        let needed = item.len() + SLOT_SIZE;
        let available = Self::contiguous_free(&header) + header.garbage as usize;
        if available < needed {
            return Err(PageError::InsufficientSpace { needed, available });
        }
        if Self::contiguous_free(&header) < needed {
            Self::compact(page);
            header = Self::header(page);
        }

        let offset = header.free_space_offset as usize;
        page.data[offset..offset + item.len()].copy_from_slice(item);

        for i in (slot..count).rev() {
            let entry = SlotEntry::read(&page.data[..], i);
            entry.write(&mut page.data[..], i + 1);
        }
        SlotEntry {
            offset: offset as u16,
            length: item.len() as u16,
        }
        .write(&mut page.data[..], slot);

        header.slot_count += 1;
        header.free_space_offset = (offset + item.len()) as u16;
        header.write(&mut page.data[..]);
        Ok(())
    }

    /// Replace the item in `slot`, keeping its position
    pub fn replace(page: &mut Page, slot: usize, item: &[u8]) -> Result<()> {
        let mut header = Self::header(page);
        let count = header.slot_count as usize;
        if slot >= count {
            return Err(PageError::InvalidSlot { slot, count });
        }
        let mut entry = SlotEntry::read(&page.data[..], slot);

        if item.len() <= entry.length as usize {
            let start = entry.offset as usize;
            page.data[start..start + item.len()].copy_from_slice(item);
            header.garbage += entry.length - item.len() as u16;
            entry.length = item.len() as u16;
            entry.write(&mut page.data[..], slot);
            header.write(&mut page.data[..]);
            return Ok(());
        }

        let available = Self::contiguous_free(&header) + header.garbage as usize + entry.length as usize;
        if available < item.len() {
            return Err(PageError::InsufficientSpace { needed: item.len(), available });
        }

        // Retire the old copy before compacting so its bytes are reclaimed.
        header.garbage += entry.length;
        entry = SlotEntry { offset: 0, length: 0 };
        entry.write(&mut page.data[..], slot);
        header.write(&mut page.data[..]);
        if Self::contiguous_free(&header) < item.len() {
            Self::compact(page);
            header = Self::header(page);
        }

        let offset = header.free_space_offset as usize;
        page.data[offset..offset + item.len()].copy_from_slice(item);
        SlotEntry {
            offset: offset as u16,
            length: item.len() as u16,
        }
        .write(&mut page.data[..], slot);
        header.free_space_offset = (offset + item.len()) as u16;
        header.write(&mut page.data[..]);
        Ok(())
    }

    /// Remove the item in `slot`, shifting later slots down
    pub fn delete(page: &mut Page, slot: usize) -> Result<()> {
        let mut header = Self::header(page);
        let count = header.slot_count as usize;
        if slot >= count {
            return Err(PageError::InvalidSlot { slot, count });
        }
        let entry = SlotEntry::read(&page.data[..], slot);
        for i in slot + 1..count {
            let next = SlotEntry::read(&page.data[..], i);
            next.write(&mut page.data[..], i - 1);
        }
        SlotEntry { offset: 0, length: 0 }.write(&mut page.data[..], count - 1);

        header.slot_count -= 1;
        header.garbage += entry.length;
        header.write(&mut page.data[..]);
        Ok(())
    }

    /// Remove all items
    pub fn clear(page: &mut Page) {
        Self::format(page);
    }

    /// Rewrite live items contiguously, reclaiming dead space
    pub fn compact(page: &mut Page) {
        let header = Self::header(page);
        let count = header.slot_count as usize;
        let items: Vec<Vec<u8>> = (0..count)
            .map(|slot| {
                let entry = SlotEntry::read(&page.data[..], slot);
                let start = entry.offset as usize;
                page.data[start..start + entry.length as usize].to_vec()
            })
            .collect();

        let mut offset = DATA_START;
        for (slot, item) in items.iter().enumerate() {
            page.data[offset..offset + item.len()].copy_from_slice(item);
            SlotEntry {
                offset: offset as u16,
                length: item.len() as u16,
            }
            .write(&mut page.data[..], slot);
            offset += item.len();
        }

        SlottedPageHeader {
            slot_count: count as u16,
            free_space_offset: offset as u16,
            garbage: 0,
        }
        .write(&mut page.data[..]);
    }

    fn contiguous_free(header: &SlottedPageHeader) -> usize {
        let slots_start = PAGE_SIZE - SLOT_SIZE * header.slot_count as usize;
        slots_start.saturating_sub(header.free_space_offset as usize)
    }
}
