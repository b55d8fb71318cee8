// Fixing and unfixing pages

use log::error;

use crate::common::types::{FrameId, Lsn, OwnerId, PageId};
use crate::concurrency::LockMode;
use crate::storage::buffer::access::BufferAccessBlock;
use crate::storage::buffer::error::Result;
use crate::storage::buffer::manager::BufferManager;
use crate::storage::buffer::replacer::FixHint;

impl BufferManager {
    /// Fix a page with a shared latch
    pub fn fix_shared(&self, owner: OwnerId, page_id: PageId, hint: FixHint) -> Result<BufferAccessBlock<'_>> {
        self.fix(owner, page_id, LockMode::Shared, None, hint)
    }

    /// Fix a page with an update latch, which can later be upgraded
    pub fn fix_for_update(&self, owner: OwnerId, page_id: PageId, hint: FixHint) -> Result<BufferAccessBlock<'_>> {
        self.fix(owner, page_id, LockMode::Update, None, hint)
    }

    /// Fix a page with an exclusive latch. With `is_new` the page is not
    /// read from its container; it is reset to `page_type` and formatted.
    pub fn fix_exclusive(
        &self,
        owner: OwnerId,
        page_id: PageId,
        is_new: bool,
        page_type: u16,
        hint: FixHint,
    ) -> Result<BufferAccessBlock<'_>> {
        let new_page_type = if is_new { Some(page_type) } else { None };
        self.fix(owner, page_id, LockMode::Exclusive, new_page_type, hint)
    }

    fn fix(
        &self,
        owner: OwnerId,
        page_id: PageId,
        mode: LockMode,
        new_page_type: Option<u16>,
        hint: FixHint,
    ) -> Result<BufferAccessBlock<'_>> {
        self.stats.fixes.increment();
        let formatter = new_page_type.map(|t| self.registry.page_formatter(t)).transpose()?;
        let frame_id = self.pin_frame(page_id, new_page_type.is_some())?;

        let frame = &self.frames[frame_id];
        if let Err(e) = frame.latch.acquire(owner, mode, self.config.latch.default_timeout) {
            self.unpin(frame_id, hint);
            return Err(e.into());
        }
        let bab = BufferAccessBlock::new(self, frame_id, page_id, owner, mode, hint);

        if let (Some(page_type), Some(formatter)) = (new_page_type, formatter) {
            let mut page = frame.page.write();
            page.reset(page_type);
            page.page_id = page_id;
            formatter(&mut page);
        }
        Ok(bab)
    }

    /// Release the latch and the pin taken by a fix
    pub(crate) fn unfix(&self, frame_id: FrameId, owner: OwnerId, hint: FixHint) {
        if let Err(e) = self.frames[frame_id].latch.release(owner) {
            error!("Unfix of frame {} by owner {} failed to release latch: {}", frame_id, owner, e);
        }
        self.unpin(frame_id, hint);
    }

    /// Record that a logged change has been applied to the frame's page
    pub(crate) fn mark_dirty(&self, frame_id: FrameId, lsn: Lsn) {
        let mut state = self.state.lock();
        let meta = &mut state.meta[frame_id];
        if !meta.dirty {
            meta.dirty = true;
            meta.recovery_lsn = lsn;
        }
    }
}
