//! In-memory page store.

use crate::alloc::RunAllocator;
use crate::stats::{IoStats, IoStatsSnapshot};
use parking_lot::Mutex;
use sable_common::page::{PageBuf, PageId, zeroed_page};
use sable_common::{DiskStore, Result};
use std::collections::HashMap;
use tracing::trace;

/// A [`DiskStore`] that keeps every page on the heap.
///
/// Allocated pages start zero-filled. Useful for tests and for pools over
/// scratch data that never needs to outlive the process.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    stats: IoStats,
}

struct MemoryInner {
    allocator: RunAllocator,
    pages: HashMap<PageId, Box<PageBuf>>,
}

impl MemoryStore {
    /// Creates an unbounded memory store.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a memory store that refuses to grow beyond `max_pages`.
    pub fn with_capacity(max_pages: u32) -> Self {
        Self::build(Some(max_pages))
    }

    fn build(limit: Option<u32>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                allocator: RunAllocator::new(limit),
                pages: HashMap::new(),
            }),
            stats: IoStats::default(),
        }
    }

    /// Returns the number of currently allocated pages.
    pub fn allocated_pages(&self) -> u32 {
        self.inner.lock().allocator.allocated_count()
    }

    /// Returns true if `page_id` is currently allocated.
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        self.inner.lock().allocator.is_allocated(page_id)
    }

    /// Returns a snapshot of the I/O counters.
    pub fn stats(&self) -> IoStatsSnapshot {
        self.stats.snapshot()
    }

    /// Resets the I/O counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskStore for MemoryStore {
    fn allocate(&self, run_length: u32) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let first = inner.allocator.allocate(run_length)?;
        for k in 0..run_length {
            inner.pages.insert(first.offset(k), zeroed_page());
        }
        self.stats.record_allocation(run_length);
        trace!(%first, run_length, "memory store allocated run");
        Ok(first)
    }

    fn deallocate(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.allocator.deallocate(page_id)?;
        inner.pages.remove(&page_id);
        self.stats.record_deallocation();
        Ok(())
    }

    fn read_page(&self, page_id: PageId, buf: &mut PageBuf) -> Result<()> {
        let inner = self.inner.lock();
        inner.allocator.check_allocated(page_id)?;
        match inner.pages.get(&page_id) {
            Some(page) => buf.copy_from_slice(&page[..]),
            None => buf.fill(0),
        }
        self.stats.record_read();
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &PageBuf) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.allocator.check_allocated(page_id)?;
        inner
            .pages
            .entry(page_id)
            .or_insert_with(zeroed_page)
            .copy_from_slice(buf);
        self.stats.record_write();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_common::{PAGE_SIZE, SableError};

    #[test]
    fn test_memory_store_allocate_zeroed() {
        let store = MemoryStore::new();
        let first = store.allocate(2).unwrap();

        let mut buf = [0xFFu8; PAGE_SIZE];
        store.read_page(first.offset(1), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(store.allocated_pages(), 2);
    }

    #[test]
    fn test_memory_store_write_read() {
        let store = MemoryStore::new();
        let page_id = store.allocate(1).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xEF;
        store.write_page(page_id, &data).unwrap();

        let mut read = [0u8; PAGE_SIZE];
        store.read_page(page_id, &mut read).unwrap();
        assert_eq!(read[0], 0xAB);
        assert_eq!(read[PAGE_SIZE - 1], 0xEF);

        let stats = store.stats();
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.allocated_pages, 1);
    }

    #[test]
    fn test_memory_store_unallocated_access() {
        let store = MemoryStore::new();
        let mut buf = [0u8; PAGE_SIZE];

        let err = store.read_page(PageId::new(0), &mut buf).unwrap_err();
        assert!(matches!(err, SableError::PageNotAllocated { .. }));
        assert!(store.write_page(PageId::new(0), &buf).is_err());
        assert_eq!(store.stats().reads, 0);
    }

    #[test]
    fn test_memory_store_deallocate() {
        let store = MemoryStore::new();
        let page_id = store.allocate(1).unwrap();

        store.deallocate(page_id).unwrap();
        assert!(!store.is_allocated(page_id));
        assert!(store.deallocate(page_id).is_err());
        assert_eq!(store.stats().deallocations, 1);
    }

    #[test]
    fn test_memory_store_reused_page_is_zeroed() {
        let store = MemoryStore::new();
        let page_id = store.allocate(1).unwrap();
        store.write_page(page_id, &[7u8; PAGE_SIZE]).unwrap();
        store.deallocate(page_id).unwrap();

        let again = store.allocate(1).unwrap();
        assert_eq!(again, page_id);
        let mut buf = [0xFFu8; PAGE_SIZE];
        store.read_page(again, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_memory_store_capacity() {
        let store = MemoryStore::with_capacity(2);
        store.allocate(2).unwrap();
        assert!(matches!(
            store.allocate(1),
            Err(SableError::StorageExhausted { requested: 1 })
        ));
    }
}
