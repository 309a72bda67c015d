//! Page identifiers and the fixed page buffer type.

use serde::{Deserialize, Serialize};

/// Page size in bytes (16 KB). Every page and every buffer frame has exactly this size.
pub const PAGE_SIZE: usize = 16 * 1024;

/// Raw contents of one page.
pub type PageBuf = [u8; PAGE_SIZE];

/// Identifier of a page in a disk store.
///
/// Page numbers are dense: a run of `n` pages allocated together occupies
/// `first.offset(0)..first.offset(n)`. `PageId::INVALID` is reserved to mark
/// empty buffer frames and is never handed out by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel identifier for "no page".
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Creates a new PageId.
    pub const fn new(page_num: u32) -> Self {
        Self(page_num)
    }

    /// Returns the page number.
    #[inline]
    pub const fn page_num(&self) -> u32 {
        self.0
    }

    /// Returns true unless this is the INVALID sentinel.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }

    /// Returns the page `k` positions after this one within a run.
    #[inline]
    pub const fn offset(&self, k: u32) -> PageId {
        PageId(self.0 + k)
    }

    /// Byte offset of this page inside a single data file.
    #[inline]
    pub const fn file_offset(&self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "page:{}", self.0)
        } else {
            f.write_str("page:invalid")
        }
    }
}

/// Allocates a zeroed page buffer on the heap.
pub fn zeroed_page() -> Box<PageBuf> {
    Box::new([0u8; PAGE_SIZE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_page_size_constant() {
        assert_eq!(PAGE_SIZE, 16384);
    }

    #[test]
    fn test_page_id_validity() {
        assert!(PageId::new(0).is_valid());
        assert!(PageId::new(u32::MAX - 1).is_valid());
        assert!(!PageId::INVALID.is_valid());
    }

    #[test]
    fn test_page_id_offset() {
        let first = PageId::new(10);
        assert_eq!(first.offset(0), first);
        assert_eq!(first.offset(3), PageId::new(13));
        assert_eq!(first.offset(3).page_num(), 13);
    }

    #[test]
    fn test_page_id_file_offset() {
        assert_eq!(PageId::new(0).file_offset(), 0);
        assert_eq!(PageId::new(3).file_offset(), 3 * PAGE_SIZE as u64);
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId::new(123).to_string(), "page:123");
        assert_eq!(PageId::INVALID.to_string(), "page:invalid");
    }

    #[test]
    fn test_page_id_ordering_and_hash() {
        assert!(PageId::new(1) < PageId::new(2));

        let mut set = HashSet::new();
        set.insert(PageId::new(1));
        set.insert(PageId::new(2));
        set.insert(PageId::new(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_serde_roundtrip() {
        let original = PageId::new(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: PageId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_zeroed_page() {
        let page = zeroed_page();
        assert_eq!(page.len(), PAGE_SIZE);
        assert!(page.iter().all(|&b| b == 0));
    }
}
