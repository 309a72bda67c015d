//! Error types for Sable.

use crate::page::PageId;
use thiserror::Error;

/// Result type alias using SableError.
pub type Result<T> = std::result::Result<T, SableError>;

/// Errors that can occur in Sable operations.
#[derive(Debug, Error)]
pub enum SableError {
    // Buffer pool errors
    #[error("Page {page_id} is already resident, copy-in pin rejected")]
    AlreadyResident { page_id: PageId },

    #[error("Buffer pool exhausted, every frame is pinned")]
    PoolExhausted,

    #[error("Page {page_id} is not resident in the buffer pool")]
    NotResident { page_id: PageId },

    #[error("Page {page_id} is not pinned")]
    NotPinned { page_id: PageId },

    #[error("Page {page_id} is busy (pin count {pin_count})")]
    PageBusy { page_id: PageId, pin_count: u32 },

    // Disk store errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {page_id} is not allocated")]
    PageNotAllocated { page_id: PageId },

    #[error("Storage exhausted, unable to allocate {requested} pages")]
    StorageExhausted { requested: u32 },

    #[error("Invalid run length: {0}")]
    InvalidRunLength(u32),

    #[error("Invalid page id")]
    InvalidPageId,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}

impl From<config::ConfigError> for SableError {
    fn from(err: config::ConfigError) -> Self {
        SableError::Config(err.to_string())
    }
}
