use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::{PageId, PoolError, Result, PAGE_SIZE};

use super::DiskManager;

/// An owned, page-sized I/O buffer.
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

/// Allocates a zeroed page buffer.
pub fn new_page_buf() -> PageBuf {
    Box::new([0u8; PAGE_SIZE])
}

/// Completion side of a disk request, held by the worker.
pub struct DiskPromise {
    sender: Sender<Result<PageBuf>>,
}

impl DiskPromise {
    fn complete(self, result: Result<PageBuf>) {
        // The issuer may have given up waiting; nothing to do then
        let _ = self.sender.send(result);
    }
}

/// Waiting side of a disk request, held by the issuer.
pub struct DiskFuture {
    page_id: PageId,
    receiver: Receiver<Result<PageBuf>>,
}

impl DiskFuture {
    /// Blocks until the worker has processed the request.
    /// On success the request's buffer is handed back; for reads it now holds the page.
    pub fn wait(self) -> Result<PageBuf> {
        let page_id = self.page_id;
        self.receiver
            .recv()
            .map_err(|_| PoolError::DiskRequestFailed {
                page_id,
                reason: "request dropped before completion".to_string(),
            })?
    }
}

/// Represents a disk I/O request
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    /// The page ID to read/write
    pub page_id: PageId,
    /// For reads the page is copied into this buffer,
    /// for writes its content is written out
    pub data: PageBuf,
    /// Signalled once the request has been processed
    pub callback: DiskPromise,
}

impl DiskRequest {
    /// Creates a single-page read request together with its completion handle.
    pub fn read(page_id: PageId, data: PageBuf) -> (Self, DiskFuture) {
        let (callback, future) = DiskScheduler::create_promise(page_id);
        (
            Self {
                is_write: false,
                page_id,
                data,
                callback,
            },
            future,
        )
    }

    /// Creates a single-page write request together with its completion handle.
    pub fn write(page_id: PageId, data: PageBuf) -> (Self, DiskFuture) {
        let (callback, future) = DiskScheduler::create_promise(page_id);
        (
            Self {
                is_write: true,
                page_id,
                data,
                callback,
            },
            future,
        )
    }
}

/// DiskScheduler manages a background worker thread that processes disk I/O requests
/// in FIFO order. Callers block on their own request's future, never on the queue.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<dyn DiskManager>,
    /// Channel sender for queuing requests; `None` once shut down
    request_sender: Mutex<Option<Sender<DiskRequest>>>,
    /// Handle to the background worker thread
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler with the given DiskManager.
    /// Spawns a background worker thread to process requests.
    pub fn new(disk_manager: Arc<dyn DiskManager>) -> Self {
        let (sender, receiver) = unbounded::<DiskRequest>();

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(dm_clone, receiver);
        });

        Self {
            disk_manager,
            request_sender: Mutex::new(Some(sender)),
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    /// Creates a linked promise/future pair for a request on `page_id`.
    pub fn create_promise(page_id: PageId) -> (DiskPromise, DiskFuture) {
        let (sender, receiver) = bounded(1);
        (DiskPromise { sender }, DiskFuture { page_id, receiver })
    }

    /// Queues a request for the background worker and returns immediately.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let guard = self.request_sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(PoolError::SchedulerShutdown);
        };

        trace!(
            "scheduling {} of {}",
            if request.is_write { "write" } else { "read" },
            request.page_id
        );

        sender
            .send(request)
            .map_err(|_| PoolError::SchedulerShutdown)
    }

    /// Reads a page into `data` and waits for completion.
    pub fn read_page_sync(&self, page_id: PageId, data: PageBuf) -> Result<PageBuf> {
        let (request, future) = DiskRequest::read(page_id, data);
        self.schedule(request)?;
        future.wait()
    }

    /// Writes a page and waits for completion.
    pub fn write_page_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf = new_page_buf();
        buf.copy_from_slice(data);

        let (request, future) = DiskRequest::write(page_id, buf);
        self.schedule(request)?;
        future.wait().map(|_| ())
    }

    /// Stops accepting requests, lets the worker drain everything already queued,
    /// then joins it. Calling it more than once is harmless.
    pub fn shutdown(&self) {
        // Dropping the only sender disconnects the channel once the queue is empty
        let sender = self.request_sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        if let Some(handle) = self.worker_handle.lock().take() {
            let _ = handle.join();
        }
        debug!("disk scheduler shut down");
    }

    /// Returns true once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.request_sender.lock().is_none()
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<dyn DiskManager> {
        &self.disk_manager
    }

    /// The background worker thread function.
    /// `iter()` keeps yielding queued requests after disconnection until the queue is empty.
    fn start_worker_thread(disk_manager: Arc<dyn DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver.iter() {
            Self::process_request(disk_manager.as_ref(), request);
        }
    }

    /// Processes a single disk request and signals its completion.
    fn process_request(disk_manager: &dyn DiskManager, request: DiskRequest) {
        let DiskRequest {
            is_write,
            page_id,
            mut data,
            callback,
        } = request;

        let result = if is_write {
            disk_manager.write_page(page_id, &data[..])
        } else {
            disk_manager.read_page(page_id, &mut data[..])
        };

        callback.complete(result.map(|()| data));
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::{FileDiskManager, MemoryDiskManager};
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_write_then_read() {
        let dm = Arc::new(MemoryDiskManager::default());
        let scheduler = DiskScheduler::new(dm);

        let mut data = new_page_buf();
        data[..14].copy_from_slice(b"A test string.");
        let expected = data.clone();

        let (write, write_done) = DiskRequest::write(PageId::new(0), data);
        let (read, read_done) = DiskRequest::read(PageId::new(0), new_page_buf());
        scheduler.schedule(write).unwrap();
        scheduler.schedule(read).unwrap();

        write_done.wait().unwrap();
        let buf = read_done.wait().unwrap();
        assert_eq!(buf, expected);

        scheduler.shutdown();
    }

    #[test]
    fn test_disk_scheduler_sync_helpers() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(FileDiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler
            .write_page_sync(PageId::new(3), &write_data)
            .unwrap();

        let read_data = scheduler
            .read_page_sync(PageId::new(3), new_page_buf())
            .unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_shutdown_drains_queue() {
        let dm = Arc::new(MemoryDiskManager::default());
        let scheduler = DiskScheduler::new(Arc::clone(&dm) as Arc<dyn DiskManager>);

        let futures: Vec<_> = (0..64)
            .map(|i| {
                let mut data = new_page_buf();
                data[0] = i as u8;
                let (request, future) = DiskRequest::write(PageId::new(i), data);
                scheduler.schedule(request).unwrap();
                future
            })
            .collect();

        scheduler.shutdown();
        assert!(scheduler.is_shut_down());

        for future in futures {
            assert!(future.wait().is_ok());
        }
        assert_eq!(dm.num_writes(), 64);
    }

    #[test]
    fn test_disk_scheduler_rejects_after_shutdown() {
        let dm = Arc::new(MemoryDiskManager::default());
        let scheduler = DiskScheduler::new(dm);
        scheduler.shutdown();
        scheduler.shutdown();

        let (request, _future) = DiskRequest::read(PageId::new(0), new_page_buf());
        assert!(matches!(
            scheduler.schedule(request),
            Err(PoolError::SchedulerShutdown)
        ));
    }

    #[test]
    fn test_disk_future_reports_dropped_request() {
        let (request, future) = DiskRequest::write(PageId::new(5), new_page_buf());
        drop(request);
        assert!(matches!(
            future.wait(),
            Err(PoolError::DiskRequestFailed { page_id, .. }) if page_id == PageId::new(5)
        ));
    }

    #[test]
    fn test_disk_scheduler_reports_failed_request() {
        let dm = Arc::new(MemoryDiskManager::new(1));
        let scheduler = DiskScheduler::new(dm);

        let result = scheduler.read_page_sync(PageId::new(7), new_page_buf());
        assert!(matches!(result, Err(PoolError::PageOutOfRange(_))));
    }
}
