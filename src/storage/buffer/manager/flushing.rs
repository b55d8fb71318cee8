// Dirty page tracking and write back

use log::{debug, warn};

use crate::common::types::{FrameId, Lsn};
use crate::storage::buffer::error::{BufferPoolError, Result};
use crate::storage::buffer::manager::{BufferManager, DirtyPageInfo, FrameMeta, BUFFER_WRITER};
use crate::storage::buffer::replacer::FixHint;

impl BufferManager {
    /// Snapshot of the dirty pages and their recovery LSNs, for checkpoints
    pub fn get_dirty_pages(&self) -> Vec<DirtyPageInfo> {
        let state = self.state.lock();
        let mut pages: Vec<DirtyPageInfo> = state
            .meta
            .iter()
            .filter(|meta| meta.dirty)
            .filter_map(|meta| {
                meta.page_id.map(|page_id| DirtyPageInfo {
                    page_id,
                    recovery_lsn: meta.recovery_lsn,
                })
            })
            .collect();
        pages.extend(state.evicting.iter().map(|(&page_id, &recovery_lsn)| DirtyPageInfo {
            page_id,
            recovery_lsn,
        }));
        pages.sort_by_key(|info| info.page_id);
        pages
    }

    /// Lower the recovery LSNs of cached dirty pages to those found by
    /// restart analysis
    pub fn update_recovery_lsns(&self, pages: &[DirtyPageInfo]) {
        let mut state = self.state.lock();
        for info in pages {
            let Some(&frame_id) = state.page_table.get(&info.page_id) else {
                continue;
            };
            let meta = &mut state.meta[frame_id];
            if meta.dirty && (meta.recovery_lsn.is_null() || info.recovery_lsn < meta.recovery_lsn) {
                meta.recovery_lsn = info.recovery_lsn;
            }
        }
    }

    /// Write dirty pages that can be latched without waiting. Returns the
    /// number of pages written.
    pub fn write_buffers(&self) -> Result<usize> {
        let candidates: Vec<FrameId> = {
            let mut state = self.state.lock();
            let ids: Vec<FrameId> = state
                .meta
                .iter()
                .enumerate()
                .filter(|(_, meta)| meta.dirty && !meta.io_in_progress && meta.page_id.is_some())
                .map(|(frame_id, _)| frame_id)
                .collect();
            for &frame_id in &ids {
                state.meta[frame_id].pin_count += 1;
                state.replacer.remove(frame_id);
            }
            ids
        };

        let mut written = 0;
        let mut failure = None;
        for frame_id in candidates {
            match self.write_frame(frame_id) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to write frame {}: {}", frame_id, e);
                    failure.get_or_insert(e);
                }
            }
            self.unpin(frame_id, FixHint::Normal);
        }
        if written > 0 {
            debug!("Buffer writer wrote {} pages", written);
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    fn write_frame(&self, frame_id: FrameId) -> Result<bool> {
        let frame = &self.frames[frame_id];
        if !frame.latch.try_acquire_shared(BUFFER_WRITER)? {
            return Ok(false);
        }
        let result = self.write_page(&frame.page.read());
        if result.is_ok() {
            // Still latched, so no change can slip in between the write
            // and clearing the flag.
            let mut state = self.state.lock();
            state.meta[frame_id].dirty = false;
            state.meta[frame_id].recovery_lsn = Lsn::NULL;
        }
        frame.latch.release(BUFFER_WRITER)?;
        result.map(|_| true)
    }

    /// Forget every cached page of a container. Fails if any is fixed.
    pub fn invalidate_container(&self, container_id: i32) -> Result<()> {
        let mut state = self.state.lock();
        let frames: Vec<FrameId> = state
            .meta
            .iter()
            .enumerate()
            .filter(|(_, meta)| meta.page_id.is_some_and(|p| p.container_id == container_id))
            .map(|(frame_id, _)| frame_id)
            .collect();
        if let Some(&busy) = frames
            .iter()
            .find(|&&f| state.meta[f].pin_count > 0 || state.meta[f].io_in_progress)
        {
            return Err(BufferPoolError::InvalidOperation(format!(
                "container {} has a fixed page in frame {}",
                container_id, busy
            )));
        }
        for frame_id in frames {
            if let Some(page_id) = state.meta[frame_id].page_id {
                state.page_table.remove(&page_id);
            }
            state.meta[frame_id] = FrameMeta::default();
            state.replacer.remove(frame_id);
            state.free_list.push_back(frame_id);
        }
        debug!("Invalidated cached pages of container {}", container_id);
        Ok(())
    }
}
