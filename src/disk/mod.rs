use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::buffer::page::PageId;
use crate::error::Result;

pub mod file;
pub mod memory;

/// A block device holding fixed-size pages addressed by page id. The
/// buffer pool is the only caller; durability beyond the device's own
/// buffering is not part of the contract.
///
/// The trait is designed as trait-object compatible so the buffer pool
/// can own any device behind `Box<dyn DiskManager>`.
pub trait DiskManager: Debug + Send + Sync {
    /// Hand out the next page id. Assignment is strictly monotonic;
    /// deallocated ids are never reused.
    fn allocate_id(&mut self) -> Result<PageId>;

    /// Release a page id. Implementations may treat this as a no-op.
    fn deallocate_id(&mut self, page_id: PageId) -> Result<()>;

    /// Fill `buf` with the stored bytes of the page. A page that was
    /// never written reads back as zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()>;

    /// Persist `buf` as the bytes of the page, replacing any previous
    /// contents.
    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Memory,
}

pub fn new_disk(typ: DiskType) -> Result<Box<dyn DiskManager>> {
    match typ {
        DiskType::Memory => Ok(Box::new(memory::Memory::new())),
    }
}
