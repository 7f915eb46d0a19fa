//! Pagepool - a buffer pool manager with a disk-backed extendible hash index
//!
//! This crate caches fixed-size disk pages in a bounded set of in-memory frames and
//! builds a persistent extendible hash table on top of them.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Disk I/O and page layouts
//!   - `DiskManager`: Reads and writes pages (file-backed or in memory)
//!   - `DiskScheduler`: Background worker that serializes disk requests
//!   - `Page`: One frame of the pool with its pin count, dirty flag and latch
//!   - `HashTableHeaderPage`/`HashTableDirectoryPage`/`HashTableBucketPage`:
//!     extendible hash layouts over raw page bytes
//!
//! - **Buffer Pool** (`buffer`): Memory management for pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in memory
//!   - `LruReplacer`: Least-recently-unpinned eviction policy
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII guards for page access
//!
//! - **Index** (`index`): `DiskExtendibleHashTable` built on the guard API
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagepool::buffer::BufferPoolManager;
//! use pagepool::index::{DiskExtendibleHashTable, OrdComparator};
//! use pagepool::storage::disk::FileDiskManager;
//!
//! let disk_manager = Arc::new(FileDiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! // Write through a guard; the page is unpinned when the guard drops
//! let page_id = {
//!     let mut guard = bpm.new_page_guarded().unwrap().upgrade_write();
//!     guard.data_mut()[..5].copy_from_slice(b"hello");
//!     guard.page_id()
//! };
//! bpm.flush_page(page_id).unwrap();
//!
//! let table: DiskExtendibleHashTable<u64, u64, _> =
//!     DiskExtendibleHashTable::new("demo", Arc::clone(&bpm), OrdComparator, 2, 9, 64)
//!         .unwrap();
//! table.insert(&1, &100).unwrap();
//! assert_eq!(table.get_value(&1).unwrap(), Some(100));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, PoolError, RecordId, Result, SlotId};
