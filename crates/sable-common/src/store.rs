//! Contract between the buffer pool and the block store underneath it.

use crate::error::Result;
use crate::page::{PageBuf, PageId};

/// A block-oriented page store.
///
/// Implementations use interior mutability so one store can be shared
/// between a buffer pool and other components through an `Arc`.
///
/// Collaborator rules every implementation follows:
/// - `allocate(0)` fails with `InvalidRunLength`.
/// - `PageId::INVALID` is never returned by `allocate`.
/// - `read_page`, `write_page` and `deallocate` on a page that is not
///   currently allocated fail with `PageNotAllocated` (this includes a
///   double free).
pub trait DiskStore: Send + Sync {
    /// Reserves `run_length` consecutive pages and returns the first one.
    fn allocate(&self, run_length: u32) -> Result<PageId>;

    /// Releases a single previously allocated page.
    fn deallocate(&self, page_id: PageId) -> Result<()>;

    /// Fills `buf` with the persisted contents of `page_id`.
    fn read_page(&self, page_id: PageId, buf: &mut PageBuf) -> Result<()>;

    /// Persists `buf` as the contents of `page_id`.
    fn write_page(&self, page_id: PageId, buf: &PageBuf) -> Result<()>;
}
