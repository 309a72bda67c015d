//! Page stores for Sable.
//!
//! This crate provides the block stores a buffer pool sits on:
//! - `DiskManager`: single-file store with fixed-size pages
//! - `MemoryStore`: heap-backed store for tests and scratch data
//! - `RunAllocator`: consecutive run allocation with first-fit reuse
//! - `IoStats`: per-store I/O counters

mod alloc;
mod disk;
mod memory;
mod stats;

pub use alloc::RunAllocator;
pub use disk::{DATA_FILE_NAME, DiskManager, DiskManagerConfig};
pub use memory::MemoryStore;
pub use stats::{IoStats, IoStatsSnapshot};
