//! Buffer pool manager.

use crate::frame::{FrameBuffer, FrameDescriptor, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{ClockReplacer, Replacer};
use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use sable_common::page::{PageBuf, PageId, zeroed_page};
use sable_common::{DiskStore, Result, SableError, StorageConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Configuration for the buffer pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

impl BufferPoolConfig {
    /// Rejects a pool without frames or with more frames than `FrameId` can address.
    pub fn validate(&self) -> Result<()> {
        if self.num_frames == 0 || u32::try_from(self.num_frames).is_err() {
            return Err(SableError::InvalidParameter {
                name: "num_frames".to_string(),
                value: self.num_frames.to_string(),
            });
        }
        Ok(())
    }
}

impl From<&StorageConfig> for BufferPoolConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            num_frames: config.buffer_pool_frames,
        }
    }
}

/// Where a missed page's contents come from.
#[derive(Debug, Clone, Copy)]
pub enum PinSource<'a> {
    /// Read the page from the disk store.
    Disk,
    /// Copy the given bytes into the frame. Only valid for pages that are
    /// not resident yet.
    Copy(&'a PageBuf),
}

/// Handle to a pinned page.
///
/// Valid until the matching [`BufferPool::unpin`]. The handle does not
/// unpin on drop; see [`PageGuard`] for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinnedPage {
    page_id: PageId,
    frame_id: FrameId,
}

impl PinnedPage {
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total: usize,
    /// Frames without a resident page.
    pub empty: usize,
    /// Frames holding a page.
    pub resident: usize,
    /// Frames with a pin count above zero.
    pub pinned: usize,
    /// Frames whose contents differ from the disk store.
    pub dirty: usize,
}

/// A dirty page pinned by a flush while its bytes are written out.
struct FlushTarget {
    page_id: PageId,
    frame_id: FrameId,
    dirty_epoch: u64,
}

/// Bookkeeping guarded by the pool lock.
struct PoolState {
    frames: Vec<FrameDescriptor>,
    page_table: PageTable,
    replacer: Box<dyn Replacer>,
}

/// Buffer pool manager.
///
/// Caches a fixed number of pages from a [`DiskStore`] with:
/// - Page ID to frame ID mapping
/// - Pluggable replacement policy, clock by default
/// - Pin counting; pinned frames are never reclaimed
/// - Dirty page tracking and write-back on eviction
///
/// Every operation runs under one pool-wide lock. Frame bytes sit behind
/// per-frame locks so pinned pages can be read and written without it. The
/// pool never waits on the bytes of a pinned frame while holding its lock:
/// flushes pin their pages and write them out after releasing it. Guards
/// from [`BufferPool::page_data`] and [`BufferPool::page_data_mut`] must be
/// dropped before the matching [`BufferPool::unpin`].
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Frame storage, indexed like the descriptors.
    buffers: Vec<FrameBuffer>,
    /// Descriptors, page table and replacer.
    state: Mutex<PoolState>,
    /// Backing store.
    store: Arc<dyn DiskStore>,
}

impl BufferPool {
    /// Creates a buffer pool with clock replacement.
    pub fn new(config: BufferPoolConfig, store: Arc<dyn DiskStore>) -> Result<Self> {
        Self::with_replacer(config, store, Box::new(ClockReplacer::new()))
    }

    /// Creates a buffer pool with the given replacement policy.
    pub fn with_replacer(
        config: BufferPoolConfig,
        store: Arc<dyn DiskStore>,
        replacer: Box<dyn Replacer>,
    ) -> Result<Self> {
        config.validate()?;
        let num_frames = config.num_frames;

        let frames = (0..num_frames)
            .map(|i| FrameDescriptor::new(FrameId(i as u32)))
            .collect();
        let buffers = (0..num_frames).map(|_| FrameBuffer::new()).collect();

        debug!(num_frames, "created buffer pool");
        Ok(Self {
            config,
            buffers,
            state: Mutex::new(PoolState {
                frames,
                page_table: PageTable::new(num_frames),
                replacer,
            }),
            store,
        })
    }

    /// Returns the number of frames in the pool.
    pub fn capacity(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of frames with pin count zero, empty frames included.
    pub fn unpinned_count(&self) -> usize {
        let state = self.state.lock();
        state.frames.iter().filter(|f| !f.is_pinned()).count()
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains(page_id)
    }

    /// Returns the frame holding `page_id`, if resident.
    pub fn frame_of(&self, page_id: PageId) -> Option<FrameId> {
        self.state.lock().page_table.get(page_id)
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Result<u32> {
        let state = self.state.lock();
        let frame_id = state
            .page_table
            .get(page_id)
            .ok_or(SableError::NotResident { page_id })?;
        Ok(state.frames[frame_id.index()].pin_count())
    }

    /// Returns whether a resident page has unflushed changes.
    pub fn is_dirty(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock();
        let frame_id = state
            .page_table
            .get(page_id)
            .ok_or(SableError::NotResident { page_id })?;
        Ok(state.frames[frame_id.index()].is_dirty())
    }

    /// Returns a copy of every frame descriptor, in frame order.
    pub fn frame_descriptors(&self) -> Vec<FrameDescriptor> {
        self.state.lock().frames.clone()
    }

    /// Pins `page_id`, loading it into a frame on a miss.
    ///
    /// On a hit with [`PinSource::Disk`] the pin count is incremented and no
    /// I/O happens. On a miss the replacer picks a victim; a dirty victim is
    /// written back before its frame is reused.
    ///
    /// Fails with `AlreadyResident` for a [`PinSource::Copy`] of a resident
    /// page and with `PoolExhausted` when every frame is pinned.
    pub fn pin(&self, page_id: PageId, source: PinSource<'_>) -> Result<PinnedPage> {
        let mut state = self.state.lock();
        self.pin_locked(&mut state, page_id, source)
    }

    fn pin_locked(
        &self,
        state: &mut PoolState,
        page_id: PageId,
        source: PinSource<'_>,
    ) -> Result<PinnedPage> {
        if !page_id.is_valid() {
            return Err(SableError::InvalidPageId);
        }

        if let Some(frame_id) = state.page_table.get(page_id) {
            if matches!(source, PinSource::Copy(_)) {
                return Err(SableError::AlreadyResident { page_id });
            }
            let frame = &mut state.frames[frame_id.index()];
            let pin_count = frame.pin();
            state.replacer.on_pin(frame);
            trace!(%page_id, %frame_id, pin_count, "buffer pool hit");
            return Ok(PinnedPage { page_id, frame_id });
        }

        let frame_id = state
            .replacer
            .pick_victim(&mut state.frames)
            .ok_or(SableError::PoolExhausted)?;
        if state
            .frames
            .get(frame_id.index())
            .is_none_or(|f| f.is_pinned())
        {
            error!(%frame_id, "replacer picked a frame that cannot be reclaimed");
            return Err(SableError::PoolExhausted);
        }
        let buffer = &self.buffers[frame_id.index()];
        let victim = &mut state.frames[frame_id.index()];
        let old_page = victim.resident();

        if let Some(old_page) = old_page {
            if victim.is_dirty() {
                // Nothing has changed yet if the write-back fails.
                self.store.write_page(old_page, &buffer.read())?;
                victim.clear_dirty();
                debug!(%old_page, %frame_id, "wrote back dirty victim");
            }
        }

        // The old page stays mapped until the new contents are in hand.
        let disk_page;
        let contents: &PageBuf = match source {
            PinSource::Copy(contents) => contents,
            PinSource::Disk => {
                let mut page = zeroed_page();
                if let Err(e) = self.store.read_page(page_id, &mut page) {
                    warn!(%page_id, %frame_id, error = %e, "failed to load page");
                    return Err(e);
                }
                disk_page = page;
                &disk_page
            }
        };

        if let Some(old_page) = old_page {
            state.page_table.remove(old_page);
            debug!(%old_page, %frame_id, "evicted page");
        }
        buffer.copy_from(contents);
        victim.install(page_id);
        state.page_table.insert(page_id, frame_id);
        state.replacer.on_pin(victim);
        debug!(%page_id, %frame_id, "buffer pool miss, page loaded");
        Ok(PinnedPage { page_id, frame_id })
    }

    /// Releases one pin on `page_id`.
    ///
    /// `dirty` marks the page modified; the flag stays set until a flush or
    /// write-back. Fails with `NotResident` for an unmapped page and with
    /// `NotPinned` when the pin count is already zero.
    pub fn unpin(&self, page_id: PageId, dirty: bool) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let frame_id = state
            .page_table
            .get(page_id)
            .ok_or(SableError::NotResident { page_id })?;
        let frame = &mut state.frames[frame_id.index()];
        if !frame.is_pinned() {
            return Err(SableError::NotPinned { page_id });
        }

        if dirty {
            frame.mark_dirty();
        }
        let pin_count = frame.unpin();
        state.replacer.on_unpin(frame);
        trace!(%page_id, %frame_id, pin_count, dirty, "unpinned page");
        Ok(())
    }

    /// Allocates `run_length` consecutive pages and pins the first one with
    /// `first_page` as its contents.
    ///
    /// If the pin fails, every page of the run is deallocated again before
    /// the pin error is returned.
    pub fn allocate_run(&self, first_page: &PageBuf, run_length: u32) -> Result<PinnedPage> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let first = self.store.allocate(run_length)?;
        let pinned = match self.pin_locked(state, first, PinSource::Copy(first_page)) {
            Ok(pinned) => pinned,
            Err(e) => {
                warn!(%first, run_length, error = %e, "pin of new run failed, rolling back");
                for k in 0..run_length {
                    let page_id = first.offset(k);
                    if let Err(rollback) = self.store.deallocate(page_id) {
                        error!(%page_id, error = %rollback, "failed to roll back page allocation");
                    }
                }
                return Err(e);
            }
        };

        state
            .replacer
            .on_new_page(&mut state.frames[pinned.frame_id.index()]);
        debug!(%first, run_length, frame_id = %pinned.frame_id, "allocated run");
        Ok(pinned)
    }

    /// Deallocates `page_id`, dropping it from the pool if resident.
    ///
    /// Unflushed changes of a resident page are discarded. Fails with
    /// `PageBusy` while the page is pinned.
    pub fn free(&self, page_id: PageId) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let resident = state.page_table.get(page_id);
        if let Some(frame_id) = resident {
            let pin_count = state.frames[frame_id.index()].pin_count();
            if pin_count > 0 {
                return Err(SableError::PageBusy { page_id, pin_count });
            }
        }

        self.store.deallocate(page_id)?;

        if let Some(frame_id) = resident {
            state.page_table.remove(page_id);
            let frame = &mut state.frames[frame_id.index()];
            frame.vacate();
            state.replacer.on_free_page(frame);
        }
        debug!(%page_id, resident = resident.is_some(), "freed page");
        Ok(())
    }

    /// Writes `page_id` back if it is dirty.
    ///
    /// Returns true if a write happened. Fails with `NotResident` if the page
    /// is not in the pool.
    pub fn flush(&self, page_id: PageId) -> Result<bool> {
        let target = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let frame_id = state
                .page_table
                .get(page_id)
                .ok_or(SableError::NotResident { page_id })?;
            Self::hold_for_flush(state, frame_id)
        };

        let Some(target) = target else {
            return Ok(false);
        };
        let written = self.write_held(&target);
        self.release_held(&target, written.is_ok());
        written.map(|()| true)
    }

    /// Writes back every dirty resident page and returns how many were written.
    ///
    /// Stops writing at the first failure; pages flushed before it stay clean.
    pub fn flush_all(&self) -> Result<usize> {
        let targets: Vec<FlushTarget> = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            (0..state.frames.len())
                .filter_map(|i| Self::hold_for_flush(state, FrameId(i as u32)))
                .collect()
        };

        let mut flushed = 0;
        let mut failure = None;
        for target in &targets {
            if failure.is_some() {
                self.release_held(target, false);
                continue;
            }
            match self.write_held(target) {
                Ok(()) => {
                    self.release_held(target, true);
                    flushed += 1;
                }
                Err(e) => {
                    self.release_held(target, false);
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            warn!(flushed, error = %e, "flush of all dirty pages stopped early");
            return Err(e);
        }
        debug!(flushed, "flushed all dirty pages");
        Ok(flushed)
    }

    /// Pins a dirty resident frame so its bytes can be written without the
    /// state lock. Returns None for empty or clean frames.
    fn hold_for_flush(state: &mut PoolState, frame_id: FrameId) -> Option<FlushTarget> {
        let frame = &mut state.frames[frame_id.index()];
        let page_id = frame.resident()?;
        if !frame.is_dirty() {
            return None;
        }
        frame.pin();
        state.replacer.on_pin(frame);
        Some(FlushTarget {
            page_id,
            frame_id,
            dirty_epoch: frame.dirty_epoch(),
        })
    }

    /// Writes a held frame to the store. Must be called without the state lock.
    fn write_held(&self, target: &FlushTarget) -> Result<()> {
        let data = self.buffers[target.frame_id.index()].read();
        self.store.write_page(target.page_id, &data)
    }

    /// Drops the flush pin. The dirty flag is cleared only if the write
    /// succeeded and nobody marked the page dirty since it was held.
    fn release_held(&self, target: &FlushTarget, written: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let frame = &mut state.frames[target.frame_id.index()];
        debug_assert_eq!(frame.resident(), Some(target.page_id));

        if written && frame.dirty_epoch() == target.dirty_epoch {
            frame.clear_dirty();
        }
        frame.unpin();
        state.replacer.on_unpin(frame);
        trace!(page_id = %target.page_id, frame_id = %target.frame_id, written, "flushed page");
    }

    /// Reads the contents of a pinned page.
    ///
    /// Fails with `NotResident` if the handle no longer refers to a pinned
    /// frame holding its page.
    pub fn page_data(&self, pinned: &PinnedPage) -> Result<RwLockReadGuard<'_, Box<PageBuf>>> {
        self.check_pinned(pinned)?;
        Ok(self.buffers[pinned.frame_id.index()].read())
    }

    /// Writes to the contents of a pinned page.
    ///
    /// The page is not marked dirty; pass `dirty = true` to the matching
    /// [`BufferPool::unpin`].
    pub fn page_data_mut(
        &self,
        pinned: &PinnedPage,
    ) -> Result<RwLockWriteGuard<'_, Box<PageBuf>>> {
        self.check_pinned(pinned)?;
        Ok(self.buffers[pinned.frame_id.index()].write())
    }

    fn check_pinned(&self, pinned: &PinnedPage) -> Result<()> {
        let state = self.state.lock();
        let frame = state
            .frames
            .get(pinned.frame_id.index())
            .filter(|f| f.resident() == Some(pinned.page_id) && f.is_pinned());
        match frame {
            Some(_) => Ok(()),
            None => Err(SableError::NotResident {
                page_id: pinned.page_id,
            }),
        }
    }

    /// Pins `page_id` from disk and returns a guard that unpins it on drop.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let pinned = self.pin(page_id, PinSource::Disk)?;
        Ok(PageGuard {
            pool: self,
            pinned,
            dirty: false,
        })
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let state = self.state.lock();
        let resident = state.page_table.len();
        let mut stats = BufferPoolStats {
            total: self.config.num_frames,
            empty: self.config.num_frames - resident,
            resident,
            pinned: 0,
            dirty: 0,
        };

        for frame in state.frames.iter().filter(|f| !f.is_empty()) {
            if frame.is_pinned() {
                stats.pinned += 1;
            }
            if frame.is_dirty() {
                stats.dirty += 1;
            }
        }
        stats
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// RAII guard for a pinned page.
///
/// Unpins exactly once on drop, passing along whether `data_mut` was used.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    pinned: PinnedPage,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.pinned.page_id
    }

    /// Returns the underlying handle.
    pub fn pinned(&self) -> PinnedPage {
        self.pinned
    }

    /// Returns the page data.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<PageBuf>> {
        self.pool.buffers[self.pinned.frame_id.index()].read()
    }

    /// Returns mutable access to page data and marks the page dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<PageBuf>> {
        self.dirty = true;
        self.pool.buffers[self.pinned.frame_id.index()].write()
    }

    /// Marks the page as dirty.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.pool.unpin(self.pinned.page_id, self.dirty) {
            warn!(page_id = %self.pinned.page_id, error = %e, "page guard failed to unpin");
        }
    }
}
