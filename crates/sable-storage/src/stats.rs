//! I/O counters shared by the page stores.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts page-level operations performed by a store.
#[derive(Debug, Default)]
pub struct IoStats {
    reads: AtomicU64,
    writes: AtomicU64,
    allocated_pages: AtomicU64,
    deallocations: AtomicU64,
}

/// Point-in-time copy of [`IoStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStatsSnapshot {
    /// Pages read.
    pub reads: u64,
    /// Pages written.
    pub writes: u64,
    /// Pages handed out by `allocate` (a run of n counts n).
    pub allocated_pages: u64,
    /// Successful `deallocate` calls.
    pub deallocations: u64,
}

impl IoStats {
    #[inline]
    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_allocation(&self, pages: u32) {
        self.allocated_pages.fetch_add(pages as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deallocation(&self) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    pub fn snapshot(&self) -> IoStatsSnapshot {
        IoStatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            allocated_pages: self.allocated_pages.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.allocated_pages.store(0, Ordering::Relaxed);
        self.deallocations.store(0, Ordering::Relaxed);
    }
}
