use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, PoolError, Result, INVALID_PAGE_ID};
use crate::storage::disk::{new_page_buf, DiskManager, DiskScheduler};
use crate::storage::page::Page;

use super::{BasicPageGuard, LruReplacer, ReadPageGuard, Replacer, WritePageGuard};

/// Pool bookkeeping guarded by the structural lock.
struct PoolState {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames that hold no page
    free_list: VecDeque<FrameId>,
    /// Next page ID handed out by `new_page`
    next_page_id: u32,
}

/// State shared between the pool and every guard it hands out.
pub(crate) struct BufferPoolInner {
    /// The buffer pool frames, allocated once
    pages: Vec<Arc<Page>>,
    /// Structural lock over the page table, free list and id counter.
    /// The replacer is only called while it is held.
    state: Mutex<PoolState>,
    /// Eviction policy over unpinned frames
    replacer: Box<dyn Replacer>,
    /// Disk scheduler for all page I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolInner {
    /// Drops one pin on a resident page, OR-ing `is_dirty` into its dirty flag.
    /// The frame becomes evictable when the last pin goes away.
    /// Returns false if the page is not resident or was not pinned.
    ///
    /// Pin and dirty state change only under the structural lock, never under the
    /// page latch: guards unpin after releasing their latch.
    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            warn!("unpin of {} which is not resident", page_id);
            return false;
        };

        let page = &self.pages[frame_id.as_usize()];
        if page.pin_count() == 0 {
            warn!("unpin of {} with pin count 0", page_id);
            return false;
        }

        if is_dirty {
            page.set_dirty(true);
        }
        if page.decr_pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Finds a frame for a new occupant: the free list first, then a replacer victim.
    /// A dirty victim is written back before its page table entry is dropped; if the
    /// write fails the victim stays resident and evictable.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.victim() else {
            warn!("no evictable frame among {} frames", self.pages.len());
            return Err(PoolError::NoFrameAvailable);
        };

        let page = &self.pages[frame_id.as_usize()];
        let old_page_id = page.page_id();

        if page.is_dirty() {
            // Unpinned frames are never latched, so this does not wait
            let latch = page.read_latch();
            if let Err(e) = self
                .disk_scheduler
                .write_page_sync(old_page_id, &latch[..])
            {
                drop(latch);
                error!("failed to write back {} during eviction: {}", old_page_id, e);
                self.replacer.unpin(frame_id);
                return Err(e);
            }
            page.set_dirty(false);
        }

        state.page_table.remove(&old_page_id);
        debug!("evicted {} from {}", old_page_id, frame_id);
        Ok(frame_id)
    }

    /// Drops one pin on a frame whose disk read failed. The first call unmaps the
    /// page, so later fetches start a fresh read instead of finding the frame.
    /// The frame returns to the free list once every caller that pinned it during
    /// the read has let go.
    fn release_failed(&self, page_id: PageId, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.page_table.get(&page_id) == Some(&frame_id) {
            state.page_table.remove(&page_id);
        }

        let page = &self.pages[frame_id.as_usize()];
        if page.decr_pin_count() == 0 {
            page.set_page_id(INVALID_PAGE_ID);
            state.free_list.push_back(frame_id);
        }
    }

    /// Pins a resident page so it can be written out without the structural lock.
    fn pin_resident(&self, page_id: PageId) -> Option<Arc<Page>> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        let page = &self.pages[frame_id.as_usize()];
        page.incr_pin_count();
        self.replacer.pin(frame_id);
        Some(Arc::clone(page))
    }

    /// Writes a pinned page's bytes out under its read latch.
    fn write_back(&self, page: &Page) -> Result<()> {
        let latch = page.read_latch();
        page.set_dirty(false);
        if let Err(e) = self
            .disk_scheduler
            .write_page_sync(page.page_id(), &latch[..])
        {
            page.set_dirty(true);
            return Err(e);
        }
        Ok(())
    }
}

/// BufferPoolManager caches disk pages in a fixed set of in-memory frames.
///
/// Every resident page is either pinned (in use by at least one caller) or tracked
/// by the replacer as a candidate for eviction. All disk transfers go through a
/// `DiskScheduler`; reads for a fetch run after the structural lock is released,
/// under the frame's own write latch, so concurrent fetchers of the same page wait
/// for the bytes instead of seeing a half-loaded frame.
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with `pool_size` frames and LRU replacement.
    pub fn new(pool_size: usize, disk_manager: Arc<dyn DiskManager>) -> Self {
        Self::with_replacer(pool_size, disk_manager, Box::new(LruReplacer::new(pool_size)))
    }

    /// Creates a new BufferPoolManager with a caller-supplied eviction policy.
    pub fn with_replacer(
        pool_size: usize,
        disk_manager: Arc<dyn DiskManager>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            pages.push(Arc::new(Page::new(frame_id)));
            free_list.push_back(frame_id);
        }

        info!("buffer pool created with {} frames", pool_size);

        Self {
            inner: Arc::new(BufferPoolInner {
                pages,
                state: Mutex::new(PoolState {
                    page_table: HashMap::new(),
                    free_list,
                    next_page_id: 0,
                }),
                replacer,
                disk_scheduler: DiskScheduler::new(disk_manager),
            }),
        }
    }

    /// Allocates a fresh page id and gives it a zeroed frame.
    /// The new page starts with a pin count of 1; release it with `unpin_page`.
    pub fn new_page(&self) -> Result<PageId> {
        self.new_page_pinned().map(|page| page.page_id())
    }

    fn new_page_pinned(&self) -> Result<Arc<Page>> {
        let inner = &*self.inner;
        let mut state = inner.state.lock();

        let frame_id = inner.acquire_frame(&mut state)?;
        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += 1;

        let page = &inner.pages[frame_id.as_usize()];
        {
            let mut latch = page.write_latch();
            page.reset(page_id, &mut latch);
        }
        page.incr_pin_count();
        state.page_table.insert(page_id, frame_id);
        inner.replacer.pin(frame_id);

        debug!("allocated {} in {}", page_id, frame_id);
        Ok(Arc::clone(page))
    }

    /// Pins `page_id`, reading it from disk if it is not resident.
    /// Every successful fetch must be paired with one `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        if !page_id.is_valid() {
            return Err(PoolError::InvalidPageId(page_id));
        }

        let inner = &*self.inner;
        let mut state = inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = Arc::clone(&inner.pages[frame_id.as_usize()]);
            page.incr_pin_count();
            inner.replacer.pin(frame_id);
            drop(state);

            if page.is_loading() {
                // Another caller is still reading the page in; its latch is held
                // until the outcome is recorded
                let failed = {
                    let _latch = page.read_latch();
                    page.load_failed()
                };
                if failed {
                    inner.release_failed(page_id, frame_id);
                    return Err(PoolError::DiskRequestFailed {
                        page_id,
                        reason: "concurrent read of the page failed".to_string(),
                    });
                }
            }
            return Ok(page);
        }

        let frame_id = inner.acquire_frame(&mut state)?;
        let page = Arc::clone(&inner.pages[frame_id.as_usize()]);

        // Latch before publishing the frame so later fetchers wait for the read
        let mut latch = page.write_latch();
        page.reset(page_id, &mut latch);
        page.start_load();
        page.incr_pin_count();
        state.page_table.insert(page_id, frame_id);
        inner.replacer.pin(frame_id);
        drop(state);

        match inner.disk_scheduler.read_page_sync(page_id, new_page_buf()) {
            Ok(buf) => {
                *latch = buf;
                page.finish_load(true);
                drop(latch);
                debug!("read {} into {}", page_id, frame_id);
                Ok(page)
            }
            Err(e) => {
                page.finish_load(false);
                drop(latch);
                error!("failed to read {}: {}", page_id, e);
                inner.release_failed(page_id, frame_id);
                Err(e)
            }
        }
    }

    /// Drops one pin on `page_id` and records whether the caller modified it.
    /// Returns false if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.inner.unpin_page(page_id, is_dirty)
    }

    /// Writes a resident page to disk regardless of its dirty flag and clears the flag.
    /// Returns Ok(false) if the page is not resident.
    ///
    /// Must not be called by a thread that holds a write guard on the same page.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(PoolError::InvalidPageId(page_id));
        }
        self.flush_resident(page_id)
    }

    /// Writes every resident page to disk, dirty or not.
    /// Keeps going after a failed write and returns the first error.
    pub fn flush_all_pages(&self) -> Result<()> {
        let resident: Vec<PageId> = {
            let state = self.inner.state.lock();
            state.page_table.keys().copied().collect()
        };

        let mut first_err = None;
        for page_id in resident {
            if let Err(e) = self.flush_resident(page_id) {
                error!("failed to flush {}: {}", page_id, e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn flush_resident(&self, page_id: PageId) -> Result<bool> {
        let Some(page) = self.inner.pin_resident(page_id) else {
            return Ok(false);
        };

        let result = self.inner.write_back(&page);
        self.inner.unpin_page(page_id, false);
        result.map(|()| true)
    }

    /// Removes a page from the pool and deallocates it on disk.
    /// Returns Ok(false) if the page is pinned. Deleting a page that is not
    /// resident is a no-op that reports success.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(PoolError::InvalidPageId(page_id));
        }

        let inner = &*self.inner;
        {
            let mut state = inner.state.lock();

            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(true);
            };

            let page = &inner.pages[frame_id.as_usize()];
            if page.pin_count() > 0 {
                debug!("cannot delete {}: pinned {} times", page_id, page.pin_count());
                return Ok(false);
            }

            state.page_table.remove(&page_id);
            inner.replacer.pin(frame_id);
            {
                let mut latch = page.write_latch();
                page.reset(INVALID_PAGE_ID, &mut latch);
            }
            state.free_list.push_back(frame_id);
        }

        inner
            .disk_scheduler
            .disk_manager()
            .deallocate_page(page_id)?;
        Ok(true)
    }

    /// Allocates a new page and returns a guard holding its pin.
    pub fn new_page_guarded(&self) -> Result<BasicPageGuard> {
        let page = self.new_page_pinned()?;
        Ok(BasicPageGuard::new(Arc::clone(&self.inner), page))
    }

    /// Fetches a page and returns a guard holding only its pin.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard> {
        let page = self.fetch_page(page_id)?;
        Ok(BasicPageGuard::new(Arc::clone(&self.inner), page))
    }

    /// Fetches a page and returns a guard holding its pin and a shared latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.fetch_page_basic(page_id).map(BasicPageGuard::upgrade_read)
    }

    /// Fetches a page and returns a guard holding its pin and the exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.fetch_page_basic(page_id).map(BasicPageGuard::upgrade_write)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.inner.pages[frame_id.as_usize()].pin_count())
    }

    /// Returns the dirty flag of a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.inner.pages[frame_id.as_usize()].is_dirty())
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.inner.pages.len()
    }

    /// Returns the number of frames holding no page.
    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    /// Returns the number of resident pages the replacer may evict.
    pub fn evictable_count(&self) -> usize {
        let _state = self.inner.state.lock();
        self.inner.replacer.size()
    }

    /// Returns the disk manager behind the pool's scheduler.
    pub fn disk_manager(&self) -> &Arc<dyn DiskManager> {
        self.inner.disk_scheduler.disk_manager()
    }
}
