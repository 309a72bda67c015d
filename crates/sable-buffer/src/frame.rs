//! Buffer frame bookkeeping and frame storage.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use sable_common::page::{PageBuf, PageId, zeroed_page};

/// Unique identifier for a frame in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Position of this frame in the pool's frame table.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// Replacement state of a frame, driven by the replacer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// Immediately reclaimable.
    #[default]
    Available,
    /// Held by at least one pin, never reclaimed.
    Pinned,
    /// Recently unpinned; survives one more pass of the clock hand.
    SecondChance,
}

/// Per-frame bookkeeping.
///
/// A descriptor is either empty (no resident page, pin count 0, clean) or
/// holds exactly one page. The pool mutates residency, pins and the dirty
/// flag; replacers only read those and own `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    frame_id: FrameId,
    resident_page: PageId,
    pin_count: u32,
    dirty: bool,
    /// Bumped every time the page is marked dirty.
    dirty_epoch: u64,
    state: FrameState,
}

impl FrameDescriptor {
    /// Creates an empty descriptor for slot `frame_id`.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            resident_page: PageId::INVALID,
            pin_count: 0,
            dirty: false,
            dirty_epoch: 0,
            state: FrameState::Available,
        }
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the resident page, or None for an empty frame.
    #[inline]
    pub fn resident(&self) -> Option<PageId> {
        self.resident_page.is_valid().then_some(self.resident_page)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.resident_page.is_valid()
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Sets the replacement state. Only replacers call this.
    #[inline]
    pub fn set_state(&mut self, state: FrameState) {
        self.state = state;
    }

    /// Makes `page_id` resident with a single pin and a clean buffer.
    pub(crate) fn install(&mut self, page_id: PageId) {
        self.resident_page = page_id;
        self.pin_count = 1;
        self.dirty = false;
    }

    /// Increments the pin count and returns the new count.
    #[inline]
    pub(crate) fn pin(&mut self) -> u32 {
        self.pin_count += 1;
        self.pin_count
    }

    /// Decrements the pin count and returns the new count.
    ///
    /// The pool checks for a zero count before calling this.
    #[inline]
    pub(crate) fn unpin(&mut self) -> u32 {
        debug_assert!(self.pin_count > 0, "unpin of unpinned {}", self.frame_id);
        self.pin_count = self.pin_count.saturating_sub(1);
        self.pin_count
    }

    #[inline]
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
        self.dirty_epoch = self.dirty_epoch.wrapping_add(1);
    }

    /// Lets a flush tell whether the page was dirtied again while it wrote.
    #[inline]
    pub(crate) fn dirty_epoch(&self) -> u64 {
        self.dirty_epoch
    }

    #[inline]
    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Returns the frame to the empty state. Replacement state is untouched.
    pub(crate) fn vacate(&mut self) {
        self.resident_page = PageId::INVALID;
        self.pin_count = 0;
        self.dirty = false;
    }
}

/// Page-sized storage of one frame.
pub struct FrameBuffer {
    data: RwLock<Box<PageBuf>>,
}

impl FrameBuffer {
    /// Creates a zero-filled frame buffer.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(zeroed_page()),
        }
    }

    /// Reads the page data.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Box<PageBuf>> {
        self.data.read()
    }

    /// Writes to the page data.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<PageBuf>> {
        self.data.write()
    }

    /// Replaces the frame contents with `src`.
    #[inline]
    pub fn copy_from(&self, src: &PageBuf) {
        self.data.write().copy_from_slice(src);
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer").finish_non_exhaustive()
    }
}
