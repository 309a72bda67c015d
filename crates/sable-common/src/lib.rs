//! Sable common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all Sable components.

pub mod config;
pub mod error;
pub mod page;
pub mod store;

pub use config::StorageConfig;
pub use error::{Result, SableError};
pub use page::{PAGE_SIZE, PageBuf, PageId, zeroed_page};
pub use store::DiskStore;
