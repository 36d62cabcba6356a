use std::collections::BTreeMap;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::buffer::page::PageId;
use crate::error::{Error, Result};

use super::DiskManager;

/// Keys under which page images are stored in the backing map.
#[derive(Copy, Clone, Serialize, Deserialize)]
enum Key {
    PageId(PageId),
}

impl Key {
    /// Encode with big-endian variable-length bincode, which keeps the
    /// encoded keys short and sorting in page id order.
    fn encode(&self) -> Result<Vec<u8>> {
        let bytes = bincode::DefaultOptions::new()
            .with_big_endian()
            .with_varint_encoding()
            .serialize(self)?;
        Ok(bytes)
    }
}

/// An in-memory block device: page images in an ordered map. Used as the
/// default device in tests and anywhere persistence is not needed.
#[derive(Debug)]
pub struct Memory {
    pages: BTreeMap<Vec<u8>, Vec<u8>>,
    next_page_id: PageId,
}

impl Memory {
    pub fn new() -> Memory {
        Memory { pages: BTreeMap::new(), next_page_id: 0 }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

impl DiskManager for Memory {
    fn allocate_id(&mut self) -> Result<PageId> {
        if self.next_page_id == PageId::MAX {
            return Err(Error::internal("page id space exhausted"));
        }
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        Ok(page_id)
    }

    fn deallocate_id(&mut self, page_id: PageId) -> Result<()> {
        self.pages.remove(&Key::PageId(page_id).encode()?);
        Ok(())
    }

    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        match self.pages.get(&Key::PageId(page_id).encode()?) {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                buf[n..].fill(0);
            }
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()> {
        self.pages.insert(Key::PageId(page_id).encode()?, buf.to_vec());
        Ok(())
    }
}
