//! Page table mapping resident pages to the frames that hold them.

use crate::frame::FrameId;
use sable_common::page::PageId;
use std::collections::HashMap;

/// Maps each resident page to its frame.
///
/// Only accessed under the pool's state lock, so it needs no interior
/// synchronization. The pool keeps it in lockstep with the frame
/// descriptors: an entry exists exactly when the frame's resident page is
/// that key.
#[derive(Debug, Default)]
pub struct PageTable {
    entries: HashMap<PageId, FrameId>,
}

impl PageTable {
    /// Creates a page table sized for `capacity` resident pages.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Looks up the frame holding `page_id`.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.entries.get(&page_id).copied()
    }

    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.entries.contains_key(&page_id)
    }

    /// Records that `page_id` now lives in `frame_id`.
    ///
    /// Returns the previous frame if the page was already mapped.
    pub fn insert(&mut self, page_id: PageId, frame_id: FrameId) -> Option<FrameId> {
        self.entries.insert(page_id, frame_id)
    }

    /// Removes the mapping for `page_id`, returning its frame.
    pub fn remove(&mut self, page_id: PageId) -> Option<FrameId> {
        self.entries.remove(&page_id)
    }

    /// Returns the number of resident pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
