//! Buffer pool management for Sable.
//!
//! This crate provides in-memory page caching over a `DiskStore` with:
//! - Fixed-size buffer pool with configurable frame count
//! - Pluggable replacement policy, clock (second chance) by default
//! - Pin counting; pinned frames are never reclaimed
//! - Dirty page tracking with write-back on eviction and explicit flush

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::{FrameDescriptor, FrameId, FrameState};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, PageGuard, PinSource, PinnedPage};
pub use replacer::{ClockReplacer, Replacer};
