use std::ops::Deref;
use std::sync::RwLock;

/// Logical identifier of a page on the block device.
pub type PageId = u32;

/// Reserved sentinel marking a frame that holds no page.
pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// Size of a page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// The in-memory state of one frame: the page bytes plus the metadata the
/// buffer pool tracks for it.
pub struct PageData {
    pub(crate) id: PageId,
    pub(crate) pin_count: u32,
    pub(crate) is_dirty: bool,
    data: Vec<u8>,
}

impl PageData {
    fn new() -> Self {
        PageData { id: INVALID_PAGE_ID, pin_count: 0, is_dirty: false, data: vec![0; PAGE_SIZE] }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the page bytes. Dirtiness is tracked at the pin,
    /// not here.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero the bytes and drop the metadata back to the free state.
    pub(crate) fn reset(&mut self) {
        self.id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
        self.data.fill(0);
    }
}

/// Page is the container of the actual page data, providing concurrent
/// access protection separate from the buffer pool latch: callers holding
/// a pin read or write the bytes without blocking pool operations on
/// other frames.
pub struct Page {
    inner: RwLock<PageData>,
}

impl Page {
    pub fn new() -> Self {
        Page { inner: RwLock::new(PageData::new()) }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}

impl Deref for Page {
    type Target = RwLock<PageData>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
