use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{new_page_buf, PageBuf};

/// Shared latch over a frame's bytes, held by a read guard.
pub type PageReadLatch = ArcRwLockReadGuard<RawRwLock, PageBuf>;

/// Exclusive latch over a frame's bytes, held by a write guard.
pub type PageWriteLatch = ArcRwLockWriteGuard<RawRwLock, PageBuf>;

/// Page is one frame of the buffer pool: the in-memory copy of whatever disk page
/// currently occupies the frame, plus the bookkeeping the pool needs.
///
/// Pages are allocated once when the pool is built and reset in place whenever the
/// frame is reused for another page id. The bytes are only reachable through the
/// latch, which callers outside the crate obtain via page guards.
pub struct Page {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// The page ID stored in this frame (INVALID_PAGE_ID if empty)
    page_id: AtomicU32,
    /// Number of outstanding holders of this page
    pin_count: AtomicU32,
    /// Whether the page has been modified since being read from disk
    is_dirty: AtomicBool,
    /// Set while a disk read into the frame is outstanding or has failed
    loading: AtomicBool,
    /// Set when the disk read into the frame failed; the bytes are not the page
    load_failed: AtomicBool,
    /// Reader/writer latch over the page bytes
    data: Arc<RwLock<PageBuf>>,
}

impl Page {
    pub(crate) fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.as_u32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            loading: AtomicBool::new(false),
            load_failed: AtomicBool::new(false),
            data: Arc::new(RwLock::new(new_page_buf())),
        }
    }

    /// Returns the frame ID.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page ID stored in this frame.
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u32(), Ordering::Release);
    }

    /// Returns the current pin count.
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub(crate) fn incr_pin_count(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    pub(crate) fn decr_pin_count(&self) -> u32 {
        let previous = self
            .pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        match previous {
            Ok(count) => count - 1,
            Err(_) => panic!("pin count underflow on {}", self.frame_id),
        }
    }

    /// Returns whether the page is dirty.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Returns true if the frame's bytes may not be loaded yet. Callers must take
    /// a latch and then check `load_failed` before trusting the contents.
    pub(crate) fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Returns true if the disk read that filled this frame failed.
    pub(crate) fn load_failed(&self) -> bool {
        self.load_failed.load(Ordering::Acquire)
    }

    /// Marks an outstanding read. The caller holds the exclusive latch.
    pub(crate) fn start_load(&self) {
        self.loading.store(true, Ordering::Release);
    }

    /// Settles an outstanding read. The caller still holds the exclusive latch, so
    /// anyone waiting on it sees the outcome. A failed load stays marked as loading
    /// until the frame is reset.
    pub(crate) fn finish_load(&self, ok: bool) {
        if ok {
            self.loading.store(false, Ordering::Release);
        } else {
            self.load_failed.store(true, Ordering::Release);
        }
    }

    /// Blocks until a shared latch on the bytes is available.
    pub(crate) fn read_latch(&self) -> PageReadLatch {
        self.data.read_arc()
    }

    /// Blocks until the exclusive latch on the bytes is available.
    pub(crate) fn write_latch(&self) -> PageWriteLatch {
        self.data.write_arc()
    }

    /// Rebinds the frame to `page_id`: clean, unpinned, loaded, zeroed bytes.
    /// The caller holds the exclusive latch and passes its buffer in.
    pub(crate) fn reset(&self, page_id: PageId, data: &mut [u8; PAGE_SIZE]) {
        self.set_page_id(page_id);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.loading.store(false, Ordering::Release);
        self.load_failed.store(false, Ordering::Release);
        data.fill(0);
    }
}
