// SimpleDBM Free Space Manager
//
// Map page k of a container sits at page number k * pages_per_map and covers
// the pages up to the next map page. Allocation latches the first map page
// exclusively for its whole duration, then the later map pages in ascending
// order, so concurrent allocators in one container queue on the first page.

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::common::registry::ObjectRegistry;
use crate::common::types::{OwnerId, Page, PageId};
use crate::concurrency::{LockDuration, LockMode, Lockable};
use crate::storage::buffer::{BufferAccessBlock, BufferManager, BufferPoolError, FixHint};
use crate::storage::disk::{ContainerError, StorageManager};
use crate::storage::fsm::error::{Result, SpaceError};
use crate::storage::fsm::handler::SpaceHandler;
use crate::storage::fsm::log_records::{
    CreateContainer, FormatMap, SetMapCount, UpdateBit, CREATE_CONTAINER, FORMAT_MAP, SET_MAP_COUNT,
    SPACE_MODULE_ID, UPDATE_BIT,
};
use crate::storage::fsm::map_page::{SpaceMapPage, MAX_PAGES_PER_MAP, SPACE_MAP_PAGE_TYPE};
use crate::transaction::wal::{LogRecord, LogRecordKind};
use crate::transaction::{HandlerRegistry, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceManagerConfig {
    /// Pages covered by each map page, the map page included
    pub pages_per_map: u32,
}

impl Default for SpaceManagerConfig {
    fn default() -> Self {
        Self {
            pages_per_map: MAX_PAGES_PER_MAP,
        }
    }
}

fn format_space_map(_page: &mut Page) {}

pub struct FreeSpaceManager {
    buffers: Arc<BufferManager>,
    config: SpaceManagerConfig,
}

impl FreeSpaceManager {
    pub fn new(buffers: Arc<BufferManager>, config: SpaceManagerConfig) -> Self {
        let pages_per_map = config.pages_per_map.clamp(2, MAX_PAGES_PER_MAP);
        Self {
            buffers,
            config: SpaceManagerConfig { pages_per_map },
        }
    }

    /// Register the space map page type and the redo/undo handler
    pub fn register_types(
        registry: &ObjectRegistry,
        handlers: &HandlerRegistry,
        storage: Arc<StorageManager>,
    ) -> crate::transaction::Result<()> {
        registry.register_page_type(SPACE_MAP_PAGE_TYPE, "space map", format_space_map)?;
        handlers.register(SPACE_MODULE_ID, Arc::new(SpaceHandler::new(storage)))?;
        Ok(())
    }

    pub fn config(&self) -> SpaceManagerConfig {
        self.config
    }

    /// Create a container and format its first map page. The creation is
    /// redo-only: it survives a rollback of `trx`.
    pub fn create_container(&self, trx: &Transaction, container_id: i32) -> Result<()> {
        trx.acquire_lock(
            &Lockable::Container(container_id),
            LockMode::Exclusive,
            LockDuration::Commit,
        )?;
        if self.buffers.storage().is_open(container_id) {
            return Err(SpaceError::ContainerExists(container_id));
        }
        let create = LogRecord::for_module(
            SPACE_MODULE_ID,
            CREATE_CONTAINER,
            LogRecordKind::Redo,
            &CreateContainer { container_id },
        )?;
        trx.log_global(create)?;
        self.format_map_page(trx, PageId::new(container_id, 0), 1)?;
        info!(
            "Created container {} with {} pages per space map",
            container_id, self.config.pages_per_map
        );
        Ok(())
    }

    /// Find a free page, mark it allocated and return it. The container
    /// grows by a new map page when every existing map is full.
    pub fn allocate_page(&self, trx: &Transaction, container_id: i32) -> Result<PageId> {
        let first = self.fix_first_map(trx.owner(), container_id, true)?;
        let (pages_per_map, map_count) = {
            let page = first.page();
            (SpaceMapPage::pages_per_map(&page), SpaceMapPage::map_count(&page))
        };

        for map in 0..map_count {
            let map_page_id = Self::map_page_id(container_id, map, pages_per_map)?;
            let later;
            let bab = if map == 0 {
                &first
            } else {
                later = self.fix_map(trx.owner(), map_page_id, true)?;
                &later
            };
            let free = SpaceMapPage::first_clear(&bab.page());
            if let Some(bit) = free {
                self.update_bit(trx, bab, bit, true)?;
                let page_id = Self::page_at(container_id, map, pages_per_map, bit)?;
                debug!("Allocated page {} for transaction {}", page_id, trx.id());
                return Ok(page_id);
            }
        }

        let map_page_id = Self::map_page_id(container_id, map_count, pages_per_map)?;
        let new_map = self.format_map_page(trx, map_page_id, 0)?;
        let count = LogRecord::for_module(
            SPACE_MODULE_ID,
            SET_MAP_COUNT,
            LogRecordKind::Redo,
            &SetMapCount {
                map_count: map_count + 1,
            },
        )?;
        trx.log_insert(&first, count)?;
        self.update_bit(trx, &new_map, 1, true)?;
        let page_id = Self::page_at(container_id, map_count, pages_per_map, 1)?;
        info!(
            "Container {} extended with space map page {}",
            container_id, map_page_id
        );
        Ok(page_id)
    }

    /// Mark an allocated page free. Undone by re-allocating it.
    pub fn free_page(&self, trx: &Transaction, page_id: PageId) -> Result<()> {
        let first = self.fix_first_map(trx.owner(), page_id.container_id, true)?;
        let (map, bit) = self.locate(&first, page_id)?;
        if bit == 0 {
            return Err(SpaceError::SpaceMapPage(page_id));
        }
        let pages_per_map = SpaceMapPage::pages_per_map(&first.page());
        let later;
        let bab = if map == 0 {
            &first
        } else {
            later = self.fix_map(trx.owner(), Self::map_page_id(page_id.container_id, map, pages_per_map)?, true)?;
            &later
        };
        if !SpaceMapPage::is_set(&bab.page(), bit) {
            return Err(SpaceError::NotAllocated(page_id));
        }
        self.update_bit(trx, bab, bit, false)?;
        debug!("Freed page {} for transaction {}", page_id, trx.id());
        Ok(())
    }

    /// Whether the space map records `page_id` as in use. Pages beyond the
    /// last map, or in a container without a map, are not allocated.
    pub fn is_allocated(&self, owner: OwnerId, page_id: PageId) -> Result<bool> {
        let first = match self.fix_first_map(owner, page_id.container_id, false) {
            Ok(bab) => bab,
            Err(SpaceError::NoSpaceMap(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let (map, bit) = match self.locate(&first, page_id) {
            Ok(position) => position,
            Err(SpaceError::NotAllocated(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if map == 0 {
            return Ok(SpaceMapPage::is_set(&first.page(), bit));
        }
        let pages_per_map = SpaceMapPage::pages_per_map(&first.page());
        let map_page_id = Self::map_page_id(page_id.container_id, map, pages_per_map)?;
        drop(first);
        let bab = self.fix_map(owner, map_page_id, false)?;
        let allocated = SpaceMapPage::is_set(&bab.page(), bit);
        Ok(allocated)
    }

    /// Number of allocated pages in the container, map pages included
    pub fn allocated_count(&self, owner: OwnerId, container_id: i32) -> Result<u32> {
        let first = self.fix_first_map(owner, container_id, false)?;
        let (pages_per_map, map_count) = {
            let page = first.page();
            (SpaceMapPage::pages_per_map(&page), SpaceMapPage::map_count(&page))
        };
        let mut total = SpaceMapPage::allocated_count(&first.page());
        for map in 1..map_count {
            let bab = self.fix_map(owner, Self::map_page_id(container_id, map, pages_per_map)?, false)?;
            total += SpaceMapPage::allocated_count(&bab.page());
        }
        Ok(total)
    }

    fn format_map_page(&self, trx: &Transaction, map_page_id: PageId, map_count: u32) -> Result<BufferAccessBlock<'_>> {
        let bab = self
            .buffers
            .fix_exclusive(trx.owner(), map_page_id, true, SPACE_MAP_PAGE_TYPE, FixHint::Normal)?;
        let format = LogRecord::for_module(
            SPACE_MODULE_ID,
            FORMAT_MAP,
            LogRecordKind::Redo,
            &FormatMap {
                pages_per_map: self.config.pages_per_map,
                map_count,
            },
        )?
        .with_page_format(SPACE_MAP_PAGE_TYPE);
        trx.log_insert(&bab, format)?;
        Ok(bab)
    }

    fn update_bit(&self, trx: &Transaction, bab: &BufferAccessBlock<'_>, bit: u32, allocated: bool) -> Result<()> {
        let record = LogRecord::for_module(
            SPACE_MODULE_ID,
            UPDATE_BIT,
            LogRecordKind::Undoable,
            &UpdateBit { bit, allocated },
        )?;
        trx.log_insert(bab, record)?;
        Ok(())
    }

    fn fix_first_map(&self, owner: OwnerId, container_id: i32, exclusive: bool) -> Result<BufferAccessBlock<'_>> {
        let page_id = PageId::new(container_id, 0);
        let bab = self.fix_map(owner, page_id, exclusive).map_err(|e| match e {
            SpaceError::Buffer(BufferPoolError::PageNotFound(_))
            | SpaceError::Buffer(BufferPoolError::Container(ContainerError::NotOpen(_))) => {
                SpaceError::NoSpaceMap(container_id)
            }
            other => other,
        })?;
        if bab.page().page_type() != SPACE_MAP_PAGE_TYPE {
            return Err(SpaceError::NoSpaceMap(container_id));
        }
        Ok(bab)
    }

    fn fix_map(&self, owner: OwnerId, page_id: PageId, exclusive: bool) -> Result<BufferAccessBlock<'_>> {
        let bab = if exclusive {
            self.buffers
                .fix_exclusive(owner, page_id, false, SPACE_MAP_PAGE_TYPE, FixHint::Normal)?
        } else {
            self.buffers.fix_shared(owner, page_id, FixHint::Normal)?
        };
        Ok(bab)
    }

    /// Map index and bit of `page_id`, given the container's first map page
    fn locate(&self, first: &BufferAccessBlock<'_>, page_id: PageId) -> Result<(u32, u32)> {
        if page_id.page_number < 0 {
            return Err(SpaceError::NotAllocated(page_id));
        }
        let (pages_per_map, map_count) = {
            let page = first.page();
            (SpaceMapPage::pages_per_map(&page), SpaceMapPage::map_count(&page))
        };
        let number = page_id.page_number as u32;
        let map = number / pages_per_map;
        if map >= map_count {
            return Err(SpaceError::NotAllocated(page_id));
        }
        Ok((map, number % pages_per_map))
    }

    fn map_page_id(container_id: i32, map: u32, pages_per_map: u32) -> Result<PageId> {
        Self::page_at(container_id, map, pages_per_map, 0)
    }

    fn page_at(container_id: i32, map: u32, pages_per_map: u32, bit: u32) -> Result<PageId> {
        let number = map as i64 * pages_per_map as i64 + bit as i64;
        let number = i32::try_from(number).map_err(|_| SpaceError::ContainerFull(container_id))?;
        Ok(PageId::new(container_id, number))
    }
}
