// SimpleDBM Buffer Access Block
//
// Handle to a fixed page. The latch and pin are released exactly once,
// by `unfix` or on drop.

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::types::{FrameId, Lsn, OwnerId, Page, PageId};
use crate::concurrency::LockMode;
use crate::storage::buffer::error::{BufferPoolError, Result};
use crate::storage::buffer::manager::BufferManager;
use crate::storage::buffer::replacer::FixHint;

pub struct BufferAccessBlock<'a> {
    manager: &'a BufferManager,
    frame_id: FrameId,
    page_id: PageId,
    owner: OwnerId,
    mode: LockMode,
    hint: FixHint,
    fixed: bool,
}

impl<'a> BufferAccessBlock<'a> {
    pub(crate) fn new(
        manager: &'a BufferManager,
        frame_id: FrameId,
        page_id: PageId,
        owner: OwnerId,
        mode: LockMode,
        hint: FixHint,
    ) -> Self {
        Self {
            manager,
            frame_id,
            page_id,
            owner,
            mode,
            hint,
            fixed: true,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Latch mode currently held
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn is_exclusive(&self) -> bool {
        self.mode == LockMode::Exclusive
    }

    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.manager.frames[self.frame_id].page.read()
    }

    /// Mutable access to the page; requires the exclusive latch
    pub fn page_mut(&self) -> Result<RwLockWriteGuard<'_, Page>> {
        if self.mode != LockMode::Exclusive {
            return Err(BufferPoolError::InvalidOperation(format!(
                "page {} is latched in {} mode, not exclusively",
                self.page_id, self.mode
            )));
        }
        Ok(self.manager.frames[self.frame_id].page.write())
    }

    pub fn page_lsn(&self) -> Lsn {
        self.page().lsn()
    }

    /// Record that a change logged at `lsn` has been applied to the page
    pub fn set_dirty(&self, lsn: Lsn) -> Result<()> {
        if self.mode != LockMode::Exclusive {
            return Err(BufferPoolError::InvalidOperation(format!(
                "set_dirty on page {} without exclusive latch",
                self.page_id
            )));
        }
        self.manager.mark_dirty(self.frame_id, lsn);
        Ok(())
    }

    /// Replacement hint applied when the page is unfixed
    pub fn set_hint(&mut self, hint: FixHint) {
        self.hint = hint;
    }

    /// Update to exclusive
    pub fn upgrade_update(&mut self) -> Result<()> {
        if self.mode != LockMode::Update {
            return Err(BufferPoolError::InvalidOperation(format!(
                "upgrade of page {} from {} mode",
                self.page_id, self.mode
            )));
        }
        let timeout = self.manager.config.latch.default_timeout;
        self.manager.frames[self.frame_id].latch.upgrade_update(self.owner, timeout)?;
        self.mode = LockMode::Exclusive;
        Ok(())
    }

    /// Exclusive to update
    pub fn downgrade_exclusive(&mut self) -> Result<()> {
        self.manager.frames[self.frame_id].latch.downgrade_exclusive(self.owner)?;
        self.mode = LockMode::Update;
        Ok(())
    }

    /// Update to shared
    pub fn downgrade_update(&mut self) -> Result<()> {
        self.manager.frames[self.frame_id].latch.downgrade_update(self.owner)?;
        self.mode = LockMode::Shared;
        Ok(())
    }

    pub fn unfix(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.fixed {
            self.fixed = false;
            self.manager.unfix(self.frame_id, self.owner, self.hint);
        }
    }
}

impl Drop for BufferAccessBlock<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BufferAccessBlock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferAccessBlock")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame_id)
            .field("owner", &self.owner)
            .field("mode", &self.mode)
            .finish()
    }
}
