// SimpleDBM Space Map Page
//
// One bit per page of the range the map page covers; bit 0 is the map
// page itself. The first map page of a container also records how many
// map pages exist.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PAGE_HEADER_SIZE, PAGE_SIZE};

/// Page type code of space map pages
pub const SPACE_MAP_PAGE_TYPE: u16 = 1;

const PAGES_PER_MAP_OFFSET: usize = PAGE_HEADER_SIZE;
const MAP_COUNT_OFFSET: usize = PAGE_HEADER_SIZE + 4;
const BITMAP_START: usize = PAGE_HEADER_SIZE + 8;

/// Largest number of pages one map page can describe
pub const MAX_PAGES_PER_MAP: u32 = ((PAGE_SIZE - BITMAP_START) * 8) as u32;

pub struct SpaceMapPage;

impl SpaceMapPage {
    /// Lay out an empty map covering `pages_per_map` pages, with its own bit set
    pub fn format(page: &mut Page, pages_per_map: u32) {
        page.data[PAGE_HEADER_SIZE..].fill(0);
        LittleEndian::write_u32(&mut page.data[PAGES_PER_MAP_OFFSET..PAGES_PER_MAP_OFFSET + 4], pages_per_map);
        Self::set(page, 0, true);
    }

    pub fn pages_per_map(page: &Page) -> u32 {
        LittleEndian::read_u32(&page.data[PAGES_PER_MAP_OFFSET..PAGES_PER_MAP_OFFSET + 4])
    }

    /// Number of map pages in the container; kept on the first map page only
    pub fn map_count(page: &Page) -> u32 {
        LittleEndian::read_u32(&page.data[MAP_COUNT_OFFSET..MAP_COUNT_OFFSET + 4])
    }

    pub fn set_map_count(page: &mut Page, count: u32) {
        LittleEndian::write_u32(&mut page.data[MAP_COUNT_OFFSET..MAP_COUNT_OFFSET + 4], count);
    }

    pub fn is_set(page: &Page, bit: u32) -> bool {
        let (byte, mask) = Self::position(bit);
        page.data[byte] & mask != 0
    }

    pub fn set(page: &mut Page, bit: u32, allocated: bool) {
        let (byte, mask) = Self::position(bit);
        if allocated {
            page.data[byte] |= mask;
        } else {
            page.data[byte] &= !mask;
        }
    }

    pub fn first_clear(page: &Page) -> Option<u32> {
        (0..Self::pages_per_map(page)).find(|&bit| !Self::is_set(page, bit))
    }

    pub fn allocated_count(page: &Page) -> u32 {
        (0..Self::pages_per_map(page))
            .filter(|&bit| Self::is_set(page, bit))
            .count() as u32
    }

    fn position(bit: u32) -> (usize, u8) {
        (BITMAP_START + (bit / 8) as usize, 1 << (bit % 8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::PageId;

    #[test]
    fn test_bits_and_counts() {
        let mut page = Page::new(PageId::new(1, 0));
        SpaceMapPage::format(&mut page, 20);
        assert_eq!(SpaceMapPage::pages_per_map(&page), 20);
        assert!(SpaceMapPage::is_set(&page, 0));
        assert_eq!(SpaceMapPage::first_clear(&page), Some(1));

        for bit in 1..20 {
            SpaceMapPage::set(&mut page, bit, true);
        }
        assert_eq!(SpaceMapPage::first_clear(&page), None);
        assert_eq!(SpaceMapPage::allocated_count(&page), 20);

        SpaceMapPage::set(&mut page, 9, false);
        assert_eq!(SpaceMapPage::first_clear(&page), Some(9));
        SpaceMapPage::set_map_count(&mut page, 3);
        assert_eq!(SpaceMapPage::map_count(&page), 3);
    }

    #[test]
    fn test_capacity_fits_page() {
        let mut page = Page::new(PageId::new(1, 0));
        SpaceMapPage::format(&mut page, MAX_PAGES_PER_MAP);
        SpaceMapPage::set(&mut page, MAX_PAGES_PER_MAP - 1, true);
        assert!(SpaceMapPage::is_set(&page, MAX_PAGES_PER_MAP - 1));
        assert_eq!(page.data[PAGE_SIZE - 1], 0x80);
    }
}
