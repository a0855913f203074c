//! `funcref` table instance. Entries are function addresses in the store.

use crate::error::Trap;
use crate::model::TableType;

#[derive(Debug, Clone, Default)]
pub struct TableInstance {
    elems: Vec<Option<usize>>,
}

impl TableInstance {
    pub fn new(ty: &TableType) -> Self {
        Self { elems: vec![None; ty.limits.min as usize] }
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn get(&self, idx: u32) -> Option<Option<usize>> {
        self.elems.get(idx as usize).copied()
    }

    /// Function address stored in slot `idx`.
    pub fn slot(&self, idx: u32) -> Result<usize, Trap> {
        match self.get(idx) {
            None => Err(Trap::UndefinedElement { index: idx, size: self.size() }),
            Some(None) => Err(Trap::UninitializedElement(idx)),
            Some(Some(addr)) => Ok(addr),
        }
    }

    /// Write `items` starting at `offset`. Nothing is written when the range
    /// does not fit.
    pub fn init(&mut self, offset: u32, items: &[Option<usize>]) -> bool {
        let start = offset as usize;
        match start.checked_add(items.len()) {
            Some(end) if end <= self.elems.len() => {
                self.elems[start..end].copy_from_slice(items);
                true
            }
            _ => false,
        }
    }
}
