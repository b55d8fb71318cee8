use linked_hash_map::LinkedHashMap;

use crate::common::types::FrameId;

/// Where an unpinned frame goes in the replacement order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixHint {
    /// Keep the page cached as long as possible
    #[default]
    Normal,
    /// The page is unlikely to be needed again soon
    Discard,
}

/// LRU replacement over unpinned frames. Frames unfixed with
/// `FixHint::Discard` are chosen before any `Normal` frame.
#[derive(Default)]
pub struct LruReplacer {
    discard: LinkedHashMap<FrameId, ()>,
    normal: LinkedHashMap<FrameId, ()>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a frame a candidate, most recently used within its list
    pub fn insert(&mut self, frame_id: FrameId, hint: FixHint) {
        self.remove(frame_id);
        match hint {
            FixHint::Normal => self.normal.insert(frame_id, ()),
            FixHint::Discard => self.discard.insert(frame_id, ()),
        };
    }

    /// Remove a frame from the replacer
    pub fn remove(&mut self, frame_id: FrameId) {
        self.normal.remove(&frame_id);
        self.discard.remove(&frame_id);
    }

    /// Least recently used frame, preferring discarded ones
    pub fn victim(&mut self) -> Option<FrameId> {
        self.discard
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .map(|(frame_id, _)| frame_id)
    }

    pub fn len(&self) -> usize {
        self.normal.len() + self.discard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
