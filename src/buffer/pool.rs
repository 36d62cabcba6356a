use std::sync::{Arc, Mutex, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::config::Config;
use crate::container::extendible::SyncExtendibleHashTable;
use crate::container::HashTable;
use crate::disk::{new_disk, DiskManager};
use crate::error::{Error, Result};

use super::page::{Page, PageData, PageId, INVALID_PAGE_ID};
use super::replacer::SyncLRUKReplacer;
use super::{FrameId, Replacer};

/// The buffer pool is responsible for moving physical pages back and
/// forth between main memory and the block device. It allows the system
/// to work against databases larger than the memory available to it.
///
/// The pool's operations are transparent to the layers above: they ask
/// for a page by its unique identifier and do not know whether the page
/// is already in memory or has to be fetched from the device.
struct BufferPool {
    pool_size: usize,
    /// The block device pages are read from and written back to.
    io: Box<dyn DiskManager>,
    /// Array of buffer pool pages; the array index is the FrameId, i.e.
    /// frame ids are in the range [0, pool_size).
    pages: Vec<Arc<Page>>,
    /// Page table keeping track of resident pages, page id to frame id.
    page_table: Arc<dyn HashTable<PageId, FrameId>>,
    /// Replacer to find unpinned frames for replacement.
    replacer: Arc<dyn Replacer>,
    /// Frames that hold no page at all. Victims come from here before the
    /// replacer is consulted, which favors zeroed frames during warm-up.
    free_list: Vec<FrameId>,
}

impl BufferPool {
    fn new(
        io: Box<dyn DiskManager>,
        pool_size: usize,
        replacer_k: usize,
        bucket_size: usize,
    ) -> Result<Self> {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);
        let page_table: Arc<dyn HashTable<PageId, FrameId>> =
            Arc::new(SyncExtendibleHashTable::new(bucket_size)?);
        let replacer: Arc<dyn Replacer> = Arc::new(SyncLRUKReplacer::new(replacer_k, pool_size));
        for i in 0..pool_size {
            pages.push(Arc::new(Page::new()));
            // initially, every frame is in the free list
            free_list.push(i);
        }
        Ok(BufferPool { pool_size, io, pages, page_table, replacer, free_list })
    }

    /// Obtain a frame for a page about to become resident: pop the free
    /// list first, fall back to evicting through the replacer. An evicted
    /// page is written back if dirty and unlinked from the page table;
    /// the frame comes back zeroed with invalid metadata.
    fn available_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.pop() {
            return Ok(frame_id);
        }
        let frame_id = self.replacer.evict().ok_or(Error::PoolExhausted)?;
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        if guard.id != INVALID_PAGE_ID {
            if guard.is_dirty {
                debug!("frame {}: writing back dirty page {} before reuse", frame_id, guard.id);
                self.io.write_page(guard.id, guard.data())?;
            }
            self.page_table.remove(&guard.id);
        }
        guard.reset();
        Ok(frame_id)
    }

    /// Create a new page in the buffer pool, or fail with PoolExhausted
    /// if all frames are currently in use and pinned.
    ///
    /// The new page starts zeroed and clean, pinned once, recorded with
    /// the replacer and marked non-evictable so the replacer cannot take
    /// the frame back before the pin is released.
    fn new_page(&mut self) -> Result<(PageId, Arc<Page>)> {
        let frame_id = self.available_frame()?;
        let page_id = self.io.allocate_id()?;
        let page = Arc::clone(&self.pages[frame_id]);
        {
            let mut guard = page.write()?;
            guard.id = page_id;
            guard.pin_count = 1;
        }
        self.page_table.insert(page_id, frame_id)?;
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false);
        Ok((page_id, page))
    }

    /// Fetch the page with the given page id, reading it from the block
    /// device if it is not resident. Fails with PoolExhausted when the
    /// page would need a frame and none can be freed.
    fn fetch_page(&mut self, page_id: PageId) -> Result<Arc<Page>> {
        // resident: bump the pin and re-record the access
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let page = Arc::clone(&self.pages[frame_id]);
            {
                let mut guard = page.write()?;
                guard.pin_count += 1;
            }
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false);
            return Ok(page);
        }

        let frame_id = self.available_frame()?;
        let page = Arc::clone(&self.pages[frame_id]);
        {
            let mut guard = page.write()?;
            self.io.read_page(page_id, guard.data_mut())?;
            guard.id = page_id;
            guard.pin_count = 1;
        }
        self.page_table.insert(page_id, frame_id)?;
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false);
        Ok(page)
    }

    /// Drop one pin on the page. Returns false if the page is not
    /// resident or was not pinned. A true `is_dirty` marks the page
    /// dirty; false leaves an earlier mark untouched. The frame becomes
    /// evictable once its pin count reaches zero.
    fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let frame_id = match self.page_table.find(&page_id) {
            None => return Ok(false),
            Some(frame_id) => frame_id,
        };
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        if guard.pin_count == 0 {
            return Ok(false);
        }
        guard.pin_count -= 1;
        if is_dirty {
            guard.is_dirty = true;
        }
        if guard.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        Ok(true)
    }

    /// Write the page back to the block device regardless of the dirty
    /// flag, then clear the flag. Returns false if the page id is the
    /// invalid sentinel or the page is not resident.
    fn flush_page(&mut self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let frame_id = match self.page_table.find(&page_id) {
            None => return Ok(false),
            Some(frame_id) => frame_id,
        };
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        self.io.write_page(page_id, guard.data())?;
        guard.is_dirty = false;
        Ok(true)
    }

    /// Write every resident page back to the block device. Frames that
    /// hold no page are skipped.
    fn flush_all(&mut self) -> Result<()> {
        let io = &mut self.io;
        for page in &self.pages {
            let mut guard = page.write()?;
            if guard.id == INVALID_PAGE_ID {
                continue;
            }
            io.write_page(guard.id, guard.data())?;
            guard.is_dirty = false;
        }
        Ok(())
    }

    /// Delete a page from the buffer pool. A page that is not resident is
    /// trivially deleted; a pinned page cannot be and reports false.
    ///
    /// The frame stops being tracked by the replacer, goes back on the
    /// free list zeroed, and the page id is handed back to the device.
    /// Contents still dirty are written back first.
    fn delete_page(&mut self, page_id: PageId) -> Result<bool> {
        let frame_id = match self.page_table.find(&page_id) {
            None => return Ok(true),
            Some(frame_id) => frame_id,
        };
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        if guard.pin_count > 0 {
            return Ok(false);
        }
        if guard.is_dirty {
            self.io.write_page(page_id, guard.data())?;
        }
        debug!("frame {}: deleting page {}", frame_id, page_id);
        self.replacer.remove(frame_id)?;
        self.page_table.remove(&page_id);
        self.free_list.push(frame_id);
        guard.reset();
        self.io.deallocate_id(page_id)?;
        Ok(true)
    }
}

/// Buffer pool manager wraps the buffer pool with a mutex latch for
/// concurrent access; all the heavy lifting happens in the buffer pool.
/// Disk I/O runs while the latch is held.
pub struct BufferPoolManager {
    inner: Arc<Mutex<BufferPool>>,
}

impl BufferPoolManager {
    pub fn new(
        io: Box<dyn DiskManager>,
        pool_size: usize,
        replacer_k: usize,
        bucket_size: usize,
    ) -> Result<Self> {
        let inner = BufferPool::new(io, pool_size, replacer_k, bucket_size)?;
        Ok(BufferPoolManager { inner: Arc::new(Mutex::new(inner)) })
    }

    /// Build a manager from a configuration, constructing the block
    /// device through the disk factory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let io = new_disk(config.disk_type)?;
        BufferPoolManager::new(io, config.pool_size, config.replacer_k, config.bucket_size)
    }

    /// Create a new page and pin it. The returned guard releases the pin
    /// when dropped.
    pub fn new_page(&self) -> Result<PageGuard> {
        let mut inner = self.inner.lock()?;
        let (page_id, page) = inner.new_page()?;
        drop(inner);
        Ok(PageGuard { page_id, page, pool: Arc::clone(&self.inner), dirty: false })
    }

    /// Fetch the page with the given page id and pin it. The returned
    /// guard releases the pin when dropped.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard> {
        let mut inner = self.inner.lock()?;
        let page = inner.fetch_page(page_id)?;
        drop(inner);
        Ok(PageGuard { page_id, page, pool: Arc::clone(&self.inner), dirty: false })
    }

    /// Drop one pin on the page, marking it dirty if `is_dirty` is true.
    /// Callers using PageGuard never need this; it exists for callers
    /// managing pins by hand.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.unpin_page(page_id, is_dirty)
    }

    /// Write the page back to the block device regardless of the dirty
    /// flag, clearing the flag on success.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.flush_page(page_id)
    }

    /// Write all resident pages back to the block device.
    pub fn flush_all(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        inner.flush_all()
    }

    /// Delete a page from the buffer pool and deallocate its id. Returns
    /// false if the page is resident and pinned, true otherwise.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.delete_page(page_id)
    }

    /// Number of frames owned by the pool.
    pub fn pool_size(&self) -> usize {
        self.inner.lock().unwrap().pool_size
    }
}

/// A pinned page. The pin is held for the lifetime of the guard and
/// released on drop, so a caller cannot forget to unpin; taking write
/// access marks the page dirty for the eventual unpin.
///
/// The page bytes sit behind their own RwLock, separate from the pool
/// latch: holding or using a guard does not block pool operations on
/// other frames.
pub struct PageGuard {
    page_id: PageId,
    page: Arc<Page>,
    pool: Arc<Mutex<BufferPool>>,
    dirty: bool,
}

impl PageGuard {
    pub fn id(&self) -> PageId {
        self.page_id
    }

    /// Shared access to the page bytes and metadata.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, PageData>> {
        Ok(self.page.read()?)
    }

    /// Exclusive access to the page bytes. The page is considered dirty
    /// from here on.
    pub fn write(&mut self) -> Result<RwLockWriteGuard<'_, PageData>> {
        self.dirty = true;
        Ok(self.page.write()?)
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        // Nowhere to report an error from a drop; a poisoned latch means
        // the pool is already lost.
        if let Ok(mut inner) = self.pool.lock() {
            let _ = inner.unpin_page(self.page_id, self.dirty);
        }
    }
}
