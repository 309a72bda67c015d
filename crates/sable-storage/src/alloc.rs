//! Run allocation of page numbers.

use sable_common::page::PageId;
use sable_common::{Result, SableError};
use std::collections::BTreeSet;

/// Hands out runs of consecutive page numbers.
///
/// Freed pages are remembered and reused first-fit when a long enough
/// consecutive gap exists; otherwise the high-water mark is extended.
#[derive(Debug)]
pub struct RunAllocator {
    /// One past the highest page number ever handed out.
    high_water: u32,
    /// Page numbers below `high_water` that are currently free.
    free: BTreeSet<u32>,
    /// Maximum value `high_water` may reach.
    limit: u32,
}

impl RunAllocator {
    /// Creates an allocator with no pages and an optional page limit.
    pub fn new(limit: Option<u32>) -> Self {
        Self::with_high_water(0, limit)
    }

    /// Creates an allocator whose first `high_water` pages are already allocated.
    pub fn with_high_water(high_water: u32, limit: Option<u32>) -> Self {
        // The run ends before u32::MAX, so PageId::INVALID is never handed out.
        Self {
            high_water,
            free: BTreeSet::new(),
            limit: limit.unwrap_or(u32::MAX),
        }
    }

    /// Reserves `run_length` consecutive pages and returns the first one.
    pub fn allocate(&mut self, run_length: u32) -> Result<PageId> {
        if run_length == 0 {
            return Err(SableError::InvalidRunLength(run_length));
        }

        if let Some(start) = self.find_free_run(run_length) {
            for page_num in start..start + run_length {
                self.free.remove(&page_num);
            }
            return Ok(PageId::new(start));
        }

        let start = self.high_water;
        match start.checked_add(run_length) {
            Some(end) if end <= self.limit => {
                self.high_water = end;
                Ok(PageId::new(start))
            }
            _ => Err(SableError::StorageExhausted {
                requested: run_length,
            }),
        }
    }

    /// Releases one allocated page.
    pub fn deallocate(&mut self, page_id: PageId) -> Result<()> {
        if !self.is_allocated(page_id) {
            return Err(SableError::PageNotAllocated { page_id });
        }
        self.free.insert(page_id.page_num());
        Ok(())
    }

    /// Returns true if `page_id` is currently allocated.
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        page_id.is_valid()
            && page_id.page_num() < self.high_water
            && !self.free.contains(&page_id.page_num())
    }

    /// Fails with `PageNotAllocated` unless `page_id` is allocated.
    pub fn check_allocated(&self, page_id: PageId) -> Result<()> {
        if self.is_allocated(page_id) {
            Ok(())
        } else {
            Err(SableError::PageNotAllocated { page_id })
        }
    }

    /// Number of pages currently allocated.
    pub fn allocated_count(&self) -> u32 {
        self.high_water - self.free.len() as u32
    }

    /// One past the highest page number ever handed out.
    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// First-fit search for `run_length` consecutive free pages.
    fn find_free_run(&self, run_length: u32) -> Option<u32> {
        let mut run_start = 0;
        let mut run_len = 0;
        let mut prev: Option<u32> = None;

        for &page_num in &self.free {
            if prev.is_some_and(|p| p + 1 == page_num) {
                run_len += 1;
            } else {
                run_start = page_num;
                run_len = 1;
            }
            if run_len == run_length {
                return Some(run_start);
            }
            prev = Some(page_num);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_extends_high_water() {
        let mut alloc = RunAllocator::new(None);

        assert_eq!(alloc.allocate(3).unwrap(), PageId::new(0));
        assert_eq!(alloc.allocate(2).unwrap(), PageId::new(3));
        assert_eq!(alloc.high_water(), 5);
        assert_eq!(alloc.allocated_count(), 5);
    }

    #[test]
    fn test_allocate_zero_run_rejected() {
        let mut alloc = RunAllocator::new(None);
        assert!(matches!(alloc.allocate(0), Err(SableError::InvalidRunLength(0))));
        assert_eq!(alloc.high_water(), 0);
    }

    #[test]
    fn test_deallocate_and_double_free() {
        let mut alloc = RunAllocator::new(None);
        let first = alloc.allocate(2).unwrap();

        alloc.deallocate(first).unwrap();
        assert!(!alloc.is_allocated(first));
        assert!(alloc.is_allocated(first.offset(1)));

        let err = alloc.deallocate(first).unwrap_err();
        assert!(matches!(err, SableError::PageNotAllocated { page_id } if page_id == first));
    }

    #[test]
    fn test_deallocate_never_allocated() {
        let mut alloc = RunAllocator::new(None);
        assert!(alloc.deallocate(PageId::new(10)).is_err());
        assert!(alloc.deallocate(PageId::INVALID).is_err());
    }

    #[test]
    fn test_reuse_first_fit() {
        let mut alloc = RunAllocator::new(None);
        alloc.allocate(6).unwrap();

        // Free 1, 3, 4: only 3..5 is a run of two.
        alloc.deallocate(PageId::new(1)).unwrap();
        alloc.deallocate(PageId::new(3)).unwrap();
        alloc.deallocate(PageId::new(4)).unwrap();

        assert_eq!(alloc.allocate(2).unwrap(), PageId::new(3));
        assert_eq!(alloc.allocate(1).unwrap(), PageId::new(1));
        // No gap left, extend.
        assert_eq!(alloc.allocate(2).unwrap(), PageId::new(6));
        assert_eq!(alloc.allocated_count(), 8);
    }

    #[test]
    fn test_limit_exhausted() {
        let mut alloc = RunAllocator::new(Some(4));
        alloc.allocate(3).unwrap();

        let err = alloc.allocate(2).unwrap_err();
        assert!(matches!(err, SableError::StorageExhausted { requested: 2 }));

        // A run that fits is still served.
        assert_eq!(alloc.allocate(1).unwrap(), PageId::new(3));
    }

    #[test]
    fn test_never_hands_out_invalid() {
        let mut alloc = RunAllocator::with_high_water(u32::MAX - 2, None);
        assert_eq!(alloc.allocate(2).unwrap(), PageId::new(u32::MAX - 2));
        assert!(alloc.allocate(1).is_err());
    }

    #[test]
    fn test_with_high_water_marks_existing_pages() {
        let alloc = RunAllocator::with_high_water(3, None);
        assert!(alloc.is_allocated(PageId::new(2)));
        assert!(!alloc.is_allocated(PageId::new(3)));
        assert!(alloc.check_allocated(PageId::new(3)).is_err());
    }
}
