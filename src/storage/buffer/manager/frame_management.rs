// Frame allocation, replacement and page I/O

use log::debug;
use parking_lot::MutexGuard;

use crate::common::types::{FrameId, Lsn, Page, PageId, PAGE_SIZE};
use crate::storage::buffer::error::{BufferPoolError, Result};
use crate::storage::buffer::manager::{BufferManager, FrameMeta, PoolState};
use crate::storage::buffer::replacer::FixHint;

impl BufferManager {
    /// Pin the frame holding `page_id`, loading the page if it is not
    /// cached. A page fixed as new is not read; its frame is zeroed.
    pub(crate) fn pin_frame(&self, page_id: PageId, is_new: bool) -> Result<FrameId> {
        let mut state = self.state.lock();
        loop {
            if let Some(&frame_id) = state.page_table.get(&page_id) {
                if state.meta[frame_id].io_in_progress {
                    self.io_done.wait(&mut state);
                    continue;
                }
                state.meta[frame_id].pin_count += 1;
                state.replacer.remove(frame_id);
                self.stats.hits.increment();
                return Ok(frame_id);
            }
            // A dirty copy of the page may still be on its way to disk.
            if state.evicting.contains_key(&page_id) {
                self.io_done.wait(&mut state);
                continue;
            }
            break;
        }
        self.stats.misses.increment();

        let frame_id = Self::claim_frame(&mut state)?;
        let victim = state.meta[frame_id];
        if let Some(old) = victim.page_id {
            state.page_table.remove(&old);
            if victim.dirty {
                state.evicting.insert(old, victim.recovery_lsn);
            }
        }
        state.page_table.insert(page_id, frame_id);
        state.meta[frame_id] = FrameMeta {
            page_id: Some(page_id),
            pin_count: 1,
            dirty: false,
            recovery_lsn: Lsn::NULL,
            io_in_progress: true,
        };
        drop(state);

        // Write back the victim. The frame still holds its image and is
        // reachable by no one else.
        if let (Some(old), true) = (victim.page_id, victim.dirty) {
            let written = self.write_page(&self.frames[frame_id].page.read());
            let mut state = self.state.lock();
            state.evicting.remove(&old);
            if let Err(e) = written {
                state.page_table.remove(&page_id);
                state.page_table.insert(old, frame_id);
                state.meta[frame_id] = FrameMeta {
                    io_in_progress: false,
                    ..victim
                };
                state.replacer.insert(frame_id, FixHint::Normal);
                self.io_done.notify_all();
                return Err(e);
            }
            self.stats.evictions.increment();
            debug!("Evicted dirty page {} from frame {}", old, frame_id);
        } else if victim.page_id.is_some() {
            self.stats.evictions.increment();
        }

        let loaded = {
            let mut page = self.frames[frame_id].page.write();
            if is_new {
                page.data.fill(0);
                page.page_id = page_id;
                Ok(())
            } else {
                self.read_page(page_id, &mut page)
            }
        };

        let mut state = self.state.lock();
        if let Err(e) = loaded {
            state.page_table.remove(&page_id);
            state.meta[frame_id] = FrameMeta::default();
            state.free_list.push_back(frame_id);
            self.io_done.notify_all();
            return Err(e);
        }
        state.meta[frame_id].io_in_progress = false;
        self.io_done.notify_all();
        Ok(frame_id)
    }

    fn claim_frame(state: &mut MutexGuard<'_, PoolState>) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }
        state.replacer.victim().ok_or(BufferPoolError::NoFreeFrames)
    }

    /// Drop one pin; an unpinned frame becomes a replacement candidate
    pub(crate) fn unpin(&self, frame_id: FrameId, hint: FixHint) {
        let mut state = self.state.lock();
        let meta = &mut state.meta[frame_id];
        debug_assert!(meta.pin_count > 0);
        meta.pin_count = meta.pin_count.saturating_sub(1);
        if meta.pin_count == 0 && meta.page_id.is_some() {
            state.replacer.insert(frame_id, hint);
        }
    }

    pub(crate) fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<()> {
        if page_id.page_number < 0 {
            return Err(BufferPoolError::PageNotFound(page_id));
        }
        let container = self.storage.get(page_id.container_id)?;
        let position = page_id.page_number as u64 * PAGE_SIZE as u64;
        let read = container.read_at(position, &mut page.data[..])?;
        if read < PAGE_SIZE {
            return Err(BufferPoolError::PageNotFound(page_id));
        }
        page.page_id = page_id;
        let page_type = page.page_type();
        if !self.registry.is_page_type_registered(page_type) {
            return Err(BufferPoolError::UnknownPageType { page_id, page_type });
        }
        Ok(())
    }

    /// Write a page image, forcing the log up to the page LSN first
    pub(crate) fn write_page(&self, page: &Page) -> Result<()> {
        self.log.flush(page.lsn())?;
        let container = self.storage.get(page.page_id.container_id)?;
        let position = page.page_id.page_number as u64 * PAGE_SIZE as u64;
        container.write_at(position, &page.data[..])?;
        self.stats.writes.increment();
        Ok(())
    }
}
