//! Integration tests for the disk managers and the disk scheduler

use std::sync::Arc;
use std::thread;

use pagepool::common::{PageId, PoolError, PAGE_SIZE};
use pagepool::storage::disk::{
    new_page_buf, DiskManager, DiskRequest, DiskScheduler, FileDiskManager, MemoryDiskManager,
};
use rand::RngCore;
use tempfile::NamedTempFile;

#[test]
fn test_file_disk_manager_random_access() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = FileDiskManager::new(temp_file.path()).unwrap();

    // Write to pages in random order
    let write_order = [5u32, 2, 8, 0, 7, 3, 9, 1, 6, 4];
    for &i in &write_order {
        let mut data = [0u8; PAGE_SIZE];
        data[0] = i as u8;
        dm.write_page(PageId::new(i), &data).unwrap();
    }
    assert_eq!(dm.num_pages().unwrap(), 10);

    // Read back and verify
    for i in 0..10u32 {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(i), &mut data).unwrap();
        assert_eq!(data[0], i as u8);
    }
    assert_eq!(dm.num_reads(), 10);
    assert_eq!(dm.num_writes(), 10);
}

#[test]
fn test_file_disk_manager_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let mut written = vec![0u8; PAGE_SIZE];
    rand::thread_rng().fill_bytes(&mut written);

    {
        let dm = FileDiskManager::new(&path).unwrap();
        dm.write_page(PageId::new(2), &written).unwrap();
        dm.shutdown().unwrap();
    }

    let dm = FileDiskManager::new(&path).unwrap();
    let mut data = vec![0u8; PAGE_SIZE];
    dm.read_page(PageId::new(2), &mut data).unwrap();
    assert_eq!(data, written);

    // the hole before page 2 reads as zeros
    dm.read_page(PageId::new(0), &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0));
}

#[test]
fn test_memory_disk_manager_deallocate() {
    let dm = MemoryDiskManager::new(8);
    dm.write_page(PageId::new(1), &[9u8; PAGE_SIZE]).unwrap();
    assert_eq!(dm.num_stored_pages(), 1);

    dm.deallocate_page(PageId::new(1)).unwrap();
    assert_eq!(dm.num_stored_pages(), 0);

    let mut data = [1u8; PAGE_SIZE];
    dm.read_page(PageId::new(1), &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0));

    assert!(matches!(
        dm.write_page(PageId::new(8), &[0u8; PAGE_SIZE]),
        Err(PoolError::PageOutOfRange(_))
    ));
}

#[test]
fn test_disk_scheduler_preserves_request_order() {
    let scheduler = DiskScheduler::new(Arc::new(MemoryDiskManager::default()));
    let page_id = PageId::new(0);

    let mut futures = Vec::new();
    for version in 1..=10u8 {
        let mut data = new_page_buf();
        data[0] = version;
        let (request, future) = DiskRequest::write(page_id, data);
        scheduler.schedule(request).unwrap();
        futures.push(future);
    }
    let (read, read_done) = DiskRequest::read(page_id, new_page_buf());
    scheduler.schedule(read).unwrap();

    // the read was queued after every write, so it sees the last one
    assert_eq!(read_done.wait().unwrap()[0], 10);
    for future in futures {
        future.wait().unwrap();
    }
}

#[test]
fn test_disk_scheduler_concurrent_callers() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(FileDiskManager::new(temp_file.path()).unwrap());
    let scheduler = Arc::new(DiskScheduler::new(dm));

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                for i in 0..16u32 {
                    let page_id = PageId::new(t * 16 + i);
                    let mut data = [0u8; PAGE_SIZE];
                    data[..4].copy_from_slice(&page_id.as_u32().to_le_bytes());
                    scheduler.write_page_sync(page_id, &data).unwrap();

                    let read = scheduler.read_page_sync(page_id, new_page_buf()).unwrap();
                    assert_eq!(&read[..4], &page_id.as_u32().to_le_bytes());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(scheduler.disk_manager().num_writes(), 64);
    assert_eq!(scheduler.disk_manager().num_reads(), 64);
    scheduler.shutdown();
}

#[test]
fn test_disk_scheduler_shutdown_rejects_sync_helpers() {
    let scheduler = DiskScheduler::new(Arc::new(MemoryDiskManager::default()));
    scheduler.shutdown();

    assert!(matches!(
        scheduler.write_page_sync(PageId::new(0), &[0u8; PAGE_SIZE]),
        Err(PoolError::SchedulerShutdown)
    ));
    assert!(matches!(
        scheduler.read_page_sync(PageId::new(0), new_page_buf()),
        Err(PoolError::SchedulerShutdown)
    ));
}
