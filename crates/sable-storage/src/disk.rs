//! Disk manager for page-level file I/O.

use crate::alloc::RunAllocator;
use crate::stats::{IoStats, IoStatsSnapshot};
use parking_lot::Mutex;
use sable_common::page::{PAGE_SIZE, PageBuf, PageId};
use sable_common::{DiskStore, Result, StorageConfig};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Name of the data file inside `data_dir`.
pub const DATA_FILE_NAME: &str = "sable.dat";

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Base directory for the data file.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

impl From<&StorageConfig> for DiskManagerConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
        }
    }
}

/// File-backed [`DiskStore`].
///
/// All pages live in one data file; page N starts at byte N * PAGE_SIZE.
/// The set of freed pages is kept in memory only, so after a reopen every
/// page below the file's end counts as allocated.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// Data file and allocation state.
    inner: Mutex<DiskInner>,
    /// I/O counters.
    stats: IoStats,
}

struct DiskInner {
    file: File,
    allocator: RunAllocator,
}

impl DiskInner {
    fn seek_to(&mut self, page_id: PageId) -> Result<()> {
        self.file.seek(SeekFrom::Start(page_id.file_offset()))?;
        Ok(())
    }

    fn zero_fill(&mut self, first: PageId, run_length: u32) -> Result<()> {
        let zeros = [0u8; PAGE_SIZE];
        self.seek_to(first)?;
        for _ in 0..run_length {
            self.file.write_all(&zeros)?;
        }
        Ok(())
    }
}

impl DiskManager {
    /// Opens (or creates) the data file under `config.data_dir`.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let path = config.data_dir.join(DATA_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            warn!(
                path = %path.display(),
                file_size,
                "data file ends with a partial page, ignoring the tail"
            );
        }
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;
        debug!(path = %path.display(), num_pages, "opened data file");

        Ok(Self {
            config,
            inner: Mutex::new(DiskInner {
                file,
                allocator: RunAllocator::with_high_water(num_pages, None),
            }),
            stats: IoStats::default(),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Returns the number of currently allocated pages.
    pub fn allocated_pages(&self) -> u32 {
        self.inner.lock().allocator.allocated_count()
    }

    /// Returns the number of pages the data file spans.
    pub fn num_pages(&self) -> u32 {
        self.inner.lock().allocator.high_water()
    }

    /// Returns a snapshot of the I/O counters.
    pub fn stats(&self) -> IoStatsSnapshot {
        self.stats.snapshot()
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn maybe_sync(&self, inner: &DiskInner) -> Result<()> {
        if self.config.fsync_enabled {
            inner.file.sync_data()?;
        }
        Ok(())
    }
}

impl DiskStore for DiskManager {
    fn allocate(&self, run_length: u32) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let first = inner.allocator.allocate(run_length)?;

        // Zero-fill the run so reused pages never expose old contents.
        let mut filled = inner.zero_fill(first, run_length);
        if filled.is_ok() {
            filled = self.maybe_sync(&inner);
        }
        if let Err(e) = filled {
            warn!(%first, run_length, error = %e, "failed to prepare pages, releasing run");
            for k in 0..run_length {
                let page_id = first.offset(k);
                if let Err(rollback) = inner.allocator.deallocate(page_id) {
                    error!(%page_id, error = %rollback, "failed to release page of a failed allocation");
                }
            }
            return Err(e);
        }

        self.stats.record_allocation(run_length);
        debug!(%first, run_length, "allocated pages");
        Ok(first)
    }

    fn deallocate(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.allocator.deallocate(page_id)?;
        self.stats.record_deallocation();
        debug!(%page_id, "deallocated page");
        Ok(())
    }

    fn read_page(&self, page_id: PageId, buf: &mut PageBuf) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.allocator.check_allocated(page_id)?;
        inner.seek_to(page_id)?;
        inner.file.read_exact(buf)?;
        self.stats.record_read();
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &PageBuf) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.allocator.check_allocated(page_id)?;
        inner.seek_to(page_id)?;
        inner.file.write_all(buf)?;
        self.maybe_sync(&inner)?;
        self.stats.record_write();
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = self.inner.get_mut().file.sync_all() {
            warn!(error = %e, "failed to sync data file on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_common::SableError;
    use tempfile::tempdir;

    fn create_test_disk_manager() -> (DiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = DiskManagerConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
        };
        let dm = DiskManager::new(config).unwrap();
        (dm, dir)
    }

    #[test]
    fn test_disk_manager_new() {
        let (dm, dir) = create_test_disk_manager();
        assert!(dm.data_dir().exists());
        assert!(dir.path().join(DATA_FILE_NAME).exists());
        assert_eq!(dm.num_pages(), 0);
    }

    #[test]
    fn test_disk_manager_allocate_run() {
        let (dm, _dir) = create_test_disk_manager();

        let first = dm.allocate(3).unwrap();
        assert_eq!(first, PageId::new(0));
        let next = dm.allocate(1).unwrap();
        assert_eq!(next, PageId::new(3));

        assert_eq!(dm.num_pages(), 4);
        assert_eq!(dm.allocated_pages(), 4);
        assert_eq!(dm.stats().allocated_pages, 4);
    }

    #[test]
    fn test_disk_manager_write_read() {
        let (dm, _dir) = create_test_disk_manager();
        let page_id = dm.allocate(1).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        data[PAGE_SIZE - 1] = 0xEF;
        dm.write_page(page_id, &data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();
        assert_eq!(read_data[0], 0xAB);
        assert_eq!(read_data[100], 0xCD);
        assert_eq!(read_data[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_disk_manager_read_unallocated_page() {
        let (dm, _dir) = create_test_disk_manager();
        dm.allocate(1).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        let result = dm.read_page(PageId::new(99), &mut buf);
        assert!(matches!(result, Err(SableError::PageNotAllocated { .. })));
    }

    #[test]
    fn test_disk_manager_deallocate_and_reuse() {
        let (dm, _dir) = create_test_disk_manager();
        let first = dm.allocate(2).unwrap();
        dm.write_page(first, &[0x55u8; PAGE_SIZE]).unwrap();

        dm.deallocate(first).unwrap();
        assert!(dm.deallocate(first).is_err());

        let mut buf = [0u8; PAGE_SIZE];
        assert!(dm.read_page(first, &mut buf).is_err());

        // Reused page comes back zeroed.
        let reused = dm.allocate(1).unwrap();
        assert_eq!(reused, first);
        dm.read_page(reused, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_persistence() {
        let dir = tempdir().unwrap();
        let page_id;

        {
            let dm = DiskManager::new(DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: true,
            })
            .unwrap();
            page_id = dm.allocate(2).unwrap().offset(1);

            let mut data = [0u8; PAGE_SIZE];
            data[0] = 0xFF;
            dm.write_page(page_id, &data).unwrap();
        }

        {
            let dm = DiskManager::new(DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: true,
            })
            .unwrap();
            assert_eq!(dm.num_pages(), 2);

            let mut read_data = [0u8; PAGE_SIZE];
            dm.read_page(page_id, &mut read_data).unwrap();
            assert_eq!(read_data[0], 0xFF);
        }
    }

    #[test]
    fn test_disk_manager_from_storage_config() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/tmp/sable"),
            buffer_pool_frames: 8,
            fsync_enabled: false,
        };
        let config = DiskManagerConfig::from(&storage);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/sable"));
        assert!(!config.fsync_enabled);
    }

    #[test]
    fn test_disk_manager_failed_allocation_releases_run() {
        let (dm, dir) = create_test_disk_manager();
        let path = dir.path().join(DATA_FILE_NAME);
        dm.inner.lock().file = File::open(&path).unwrap();

        let result = dm.allocate(2);
        assert!(matches!(result, Err(SableError::Io(_))));
        assert_eq!(dm.allocated_pages(), 0);
        assert_eq!(dm.stats().allocated_pages, 0);

        dm.inner.lock().file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        assert_eq!(dm.allocate(2).unwrap(), PageId::new(0));
        assert_eq!(dm.allocated_pages(), 2);
    }

    #[test]
    fn test_disk_manager_flush() {
        let (dm, _dir) = create_test_disk_manager();
        dm.allocate(2).unwrap();
        dm.flush().unwrap();
    }
}
