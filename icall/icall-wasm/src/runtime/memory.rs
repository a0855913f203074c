//! Linear memory instance (32-bit index space) with bounds-checked
//! little-endian access at 64-bit effective addresses.

use crate::error::Trap;
use crate::model::MemoryType;
use crate::validate::MAX_PAGES;

/// WASM page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MemoryInstance {
    buf: Vec<u8>,
    max_pages: u32,
}

impl MemoryInstance {
    pub fn new(ty: &MemoryType) -> Self {
        let min = ty.limits.min.min(MAX_PAGES);
        Self { buf: vec![0; min as usize * PAGE_SIZE], max_pages: ty.limits.max.unwrap_or(MAX_PAGES).min(MAX_PAGES) }
    }

    pub fn size_pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    /// Grow by `delta` pages. Returns the previous size, or `None` past the maximum.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let prev = self.size_pages();
        let new = prev.checked_add(delta).filter(|&n| n <= self.max_pages)?;
        self.buf.resize(new as usize * PAGE_SIZE, 0);
        Some(prev)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    fn range(&self, ea: u64, len: usize) -> Result<std::ops::Range<usize>, Trap> {
        let start = usize::try_from(ea).map_err(|_| Trap::MemoryOutOfBounds)?;
        let end = start.checked_add(len).ok_or(Trap::MemoryOutOfBounds)?;
        if end > self.buf.len() {
            return Err(Trap::MemoryOutOfBounds);
        }
        Ok(start..end)
    }

    pub fn read<const N: usize>(&self, ea: u64) -> Result<[u8; N], Trap> {
        let r = self.range(ea, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[r]);
        Ok(out)
    }

    pub fn write(&mut self, ea: u64, bytes: &[u8]) -> Result<(), Trap> {
        let r = self.range(ea, bytes.len())?;
        self.buf[r].copy_from_slice(bytes);
        Ok(())
    }
}
