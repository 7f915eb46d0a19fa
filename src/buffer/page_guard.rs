use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::common::PageId;
use crate::storage::page::{Page, PageReadLatch, PageWriteLatch};

use super::buffer_pool_manager::BufferPoolInner;

/// One pin on a page, returned to the pool when dropped.
struct PageGuardBase {
    pool: Arc<BufferPoolInner>,
    page: Arc<Page>,
    /// The page ID being guarded
    page_id: PageId,
    /// Whether the holder modified the page
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(pool: Arc<BufferPoolInner>, page: Arc<Page>) -> Self {
        let page_id = page.page_id();
        Self {
            pool,
            page,
            page_id,
            is_dirty: false,
        }
    }
}

impl Drop for PageGuardBase {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.is_dirty);
    }
}

/// RAII guard holding a pin without a latch.
///
/// The bytes can be reached briefly through `with_data`/`with_data_mut`, each of
/// which latches only for the duration of the closure. Upgrading consumes the guard
/// and keeps the same pin.
pub struct BasicPageGuard {
    base: PageGuardBase,
}

impl BasicPageGuard {
    pub(crate) fn new(pool: Arc<BufferPoolInner>, page: Arc<Page>) -> Self {
        Self {
            base: PageGuardBase::new(pool, page),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Runs `f` over the page bytes under a shared latch.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let latch = self.base.page.read_latch();
        f(&latch[..])
    }

    /// Runs `f` over the page bytes under the exclusive latch and marks the page dirty.
    pub fn with_data_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut latch = self.base.page.write_latch();
        self.base.is_dirty = true;
        f(&mut latch[..])
    }

    /// Takes a shared latch, blocking while a writer holds the page.
    pub fn upgrade_read(self) -> ReadPageGuard {
        let Self { base } = self;
        ReadPageGuard {
            latch: base.page.read_latch(),
            base,
        }
    }

    /// Takes the exclusive latch, blocking while anyone else holds the page latched.
    pub fn upgrade_write(self) -> WritePageGuard {
        let Self { base } = self;
        WritePageGuard {
            latch: base.page.write_latch(),
            base,
        }
    }

    /// Drops this guard, releasing the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

/// RAII guard for read-only access to a page.
/// Releases the shared latch, then the pin, when dropped.
pub struct ReadPageGuard {
    // Fields drop in declaration order: the latch goes before the pin
    latch: PageReadLatch,
    base: PageGuardBase,
}

impl ReadPageGuard {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.latch[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// RAII guard for read-write access to a page.
/// Releases the exclusive latch, then the pin, when dropped. The page is
/// reported dirty if `data_mut` was ever called.
pub struct WritePageGuard {
    // Fields drop in declaration order: the latch goes before the pin
    latch: PageWriteLatch,
    base: PageGuardBase,
}

impl WritePageGuard {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.latch[..]
    }

    /// Returns a mutable reference to the page data.
    /// Marks the page as dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.latch[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}
