use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, PoolError, Result, DEFAULT_MEMORY_DISK_PAGES, PAGE_SIZE};

/// The raw page I/O the buffer pool sits on top of.
///
/// Implementations must be safe to call from the disk scheduler's worker thread
/// while other threads hold a reference to them.
pub trait DiskManager: Send + Sync {
    /// Reads a page into `data`, which must be exactly PAGE_SIZE bytes.
    /// A page that was never written reads back as zeros.
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()>;

    /// Writes `data` (exactly PAGE_SIZE bytes) as the content of `page_id`.
    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()>;

    /// Releases the on-disk identity of a page.
    fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases any resources held by the manager.
    fn shutdown(&self) -> Result<()>;

    /// Returns the number of page reads performed.
    fn num_reads(&self) -> u32;

    /// Returns the number of page writes performed.
    fn num_writes(&self) -> u32;
}

/// FileDiskManager stores pages in a single database file.
/// Page `n` lives at byte offset `n * PAGE_SIZE`.
pub struct FileDiskManager {
    /// The database file
    db_file: Mutex<File>,
    /// Path to the database file
    db_path: String,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl FileDiskManager {
    /// Creates a new FileDiskManager for the given database file path.
    /// Creates the file if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        Ok(Self {
            db_file: Mutex::new(file),
            db_path: path_str,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Returns the number of whole pages currently in the file.
    pub fn num_pages(&self) -> Result<u32> {
        let file = self.db_file.lock();
        Ok((file.metadata()?.len() / PAGE_SIZE as u64) as u32)
    }

    /// Returns the path to the database file.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn offset(page_id: PageId) -> Result<u64> {
        if !page_id.is_valid() {
            return Err(PoolError::InvalidPageId(page_id));
        }
        Ok((page_id.as_u32() as u64) * (PAGE_SIZE as u64))
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let offset = Self::offset(page_id)?;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;

        // Reading beyond the end of the file yields zeros
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let offset = Self::offset(page_id)?;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }

    fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }
}

impl Drop for FileDiskManager {
    fn drop(&mut self) {
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}

/// MemoryDiskManager keeps pages in a hash map. Pages that were never
/// written read back as zeros. Used by tests and the demo binary.
pub struct MemoryDiskManager {
    pages: Mutex<HashMap<PageId, Box<[u8; PAGE_SIZE]>>>,
    /// Highest page id (exclusive) this manager accepts
    capacity: usize,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl MemoryDiskManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            capacity,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        }
    }

    /// Returns the number of pages that have been written at least once.
    pub fn num_stored_pages(&self) -> usize {
        self.pages.lock().len()
    }

    fn check_range(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(PoolError::InvalidPageId(page_id));
        }
        if page_id.as_u32() as usize >= self.capacity {
            return Err(PoolError::PageOutOfRange(page_id));
        }
        Ok(())
    }
}

impl Default for MemoryDiskManager {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_DISK_PAGES)
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        self.check_range(page_id)?;

        match self.pages.lock().get(&page_id) {
            Some(page) => data.copy_from_slice(&page[..]),
            None => data.fill(0),
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        self.check_range(page_id)?;

        let mut pages = self.pages.lock();
        let page = pages
            .entry(page_id)
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE]));
        page.copy_from_slice(data);

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.pages.lock().remove(&page_id);
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }
}
