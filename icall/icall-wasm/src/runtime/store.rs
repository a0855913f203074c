//! Central store owning every function, table, memory, global and module
//! instance. Addresses are indices into its slabs.
//!
//! Function, table, memory and global slots are freed when their instance is
//! torn down and handed out again by later instantiations. Module slots are
//! never reused, so a stale [`InstanceHandle`] keeps reporting a dead
//! instance (and its last exception) instead of aliasing a new one.

use std::mem;
use std::sync::Arc;

use tracing::debug;

use super::{
    global::GlobalInstance,
    instance::{FuncInstance, ModuleInstance},
    memory::MemoryInstance,
    table::TableInstance,
    InstanceHandle,
};
use crate::error::Trap;

/// Vector of optional entries with a free list of vacated slots.
#[derive(Debug)]
struct Slab<T> {
    entries: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self { entries: Vec::new(), free: Vec::new() }
    }
}

impl<T> Slab<T> {
    fn insert(&mut self, item: T) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.entries[idx] = Some(item);
                idx
            }
            None => {
                self.entries.push(Some(item));
                self.entries.len() - 1
            }
        }
    }

    fn get(&self, idx: usize) -> Option<&T> {
        self.entries.get(idx)?.as_ref()
    }

    fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.entries.get_mut(idx)?.as_mut()
    }

    fn remove(&mut self, idx: usize) -> Option<T> {
        let item = self.entries.get_mut(idx)?.take()?;
        self.free.push(idx);
        Some(item)
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().flatten()
    }
}

#[derive(Debug, Default)]
pub struct Store {
    funcs: Slab<FuncInstance>,
    tables: Slab<TableInstance>,
    mems: Slab<MemoryInstance>,
    globals: Slab<GlobalInstance>,
    modules: Vec<ModuleInstance>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_func(&mut self, f: FuncInstance) -> usize {
        self.funcs.insert(f)
    }

    pub fn alloc_table(&mut self, t: TableInstance) -> usize {
        self.tables.insert(t)
    }

    pub fn alloc_memory(&mut self, m: MemoryInstance) -> usize {
        self.mems.insert(m)
    }

    pub fn alloc_global(&mut self, g: GlobalInstance) -> usize {
        self.globals.insert(g)
    }

    pub fn alloc_module(&mut self, m: ModuleInstance) -> InstanceHandle {
        self.modules.push(m);
        InstanceHandle(self.modules.len() - 1)
    }

    /// Install the finished record for a slot taken by [`Store::alloc_module`].
    pub fn set_module(&mut self, handle: InstanceHandle, m: ModuleInstance) {
        if let Some(slot) = self.modules.get_mut(handle.0) {
            *slot = m;
        }
    }

    /// Mark the instance dead and free everything it owns. The record itself
    /// stays behind, holding only the exception slot.
    pub fn free_instance(&mut self, idx: usize) {
        let Some(m) = self.modules.get_mut(idx) else { return };
        m.alive = false;
        m.exports.clear();
        m.module_ir = Arc::default();
        let funcs = mem::take(&mut m.funcs);
        let tables = mem::take(&mut m.tables);
        let memories = mem::take(&mut m.memories);
        let globals = mem::take(&mut m.globals);

        let mut freed_bytes = 0;
        for addr in memories {
            freed_bytes += self.mems.remove(addr).map_or(0, |m| m.data().len());
        }
        for addr in funcs {
            self.funcs.remove(addr);
        }
        for addr in tables {
            self.tables.remove(addr);
        }
        for addr in globals {
            self.globals.remove(addr);
        }
        debug!(instance = idx, freed_bytes, "instance resources freed");
    }

    /// Any module record, alive or not.
    pub fn module_record(&self, idx: usize) -> Option<&ModuleInstance> {
        self.modules.get(idx)
    }

    pub fn module_record_mut(&mut self, idx: usize) -> Option<&mut ModuleInstance> {
        self.modules.get_mut(idx)
    }

    /// Live module instance; dead or unknown handles trap.
    pub fn module(&self, idx: usize) -> Result<&ModuleInstance, Trap> {
        self.modules.get(idx).filter(|m| m.alive).ok_or(Trap::InstanceGone)
    }

    pub fn module_mut(&mut self, idx: usize) -> Result<&mut ModuleInstance, Trap> {
        self.modules.get_mut(idx).filter(|m| m.alive).ok_or(Trap::InstanceGone)
    }

    pub fn func(&self, addr: usize) -> Result<&FuncInstance, Trap> {
        self.funcs.get(addr).ok_or(Trap::InstanceGone)
    }

    pub fn global(&self, addr: usize) -> Option<&GlobalInstance> {
        self.globals.get(addr)
    }

    pub fn table_mut(&mut self, addr: usize) -> Option<&mut TableInstance> {
        self.tables.get_mut(addr)
    }

    pub fn memory(&self, addr: usize) -> Option<&MemoryInstance> {
        self.mems.get(addr)
    }

    pub fn memory_mut(&mut self, addr: usize) -> Option<&mut MemoryInstance> {
        self.mems.get_mut(addr)
    }

    pub fn memory_of(&mut self, module: usize) -> Result<&mut MemoryInstance, Trap> {
        let addr = self.module(module)?.memory_addr().ok_or(Trap::MemoryOutOfBounds)?;
        self.mems.get_mut(addr).ok_or(Trap::MemoryOutOfBounds)
    }

    pub fn table_of(&self, module: usize) -> Result<&TableInstance, Trap> {
        let addr = self.module(module)?.table_addr().ok_or(Trap::MissingTable)?;
        self.tables.get(addr).ok_or(Trap::MissingTable)
    }

    pub fn global_of(&mut self, module: usize, idx: u32) -> Result<&mut GlobalInstance, Trap> {
        let addr = *self.module(module)?.globals.get(idx as usize).ok_or(Trap::InstanceGone)?;
        self.globals.get_mut(addr).ok_or(Trap::InstanceGone)
    }

    /// Bytes of linear memory currently held across all instances.
    pub fn memory_bytes(&self) -> usize {
        self.mems.iter().map(|m| m.data().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Limits, MemoryType};
    use crate::runtime::PAGE_SIZE;

    fn one_page() -> MemoryInstance {
        MemoryInstance::new(&MemoryType { limits: Limits { min: 1, max: None } })
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut store = Store::new();
        let h = store.alloc_module(ModuleInstance::default());
        let a = store.alloc_memory(one_page());
        let b = store.alloc_memory(one_page());
        store.set_module(h, ModuleInstance { memories: vec![a], alive: true, ..ModuleInstance::default() });
        assert_eq!(store.memory_bytes(), 2 * PAGE_SIZE);

        store.free_instance(h.0);
        assert!(store.memory(a).is_none());
        assert!(store.memory(b).is_some());
        assert_eq!(store.memory_bytes(), PAGE_SIZE);
        assert_eq!(store.alloc_memory(one_page()), a);
    }

    #[test]
    fn freed_instance_keeps_its_exception() {
        let mut store = Store::new();
        let h = store.alloc_module(ModuleInstance { alive: true, ..ModuleInstance::default() });
        store.module_mut(h.0).unwrap().exception = Some("Exception: unreachable".into());
        store.free_instance(h.0);
        assert_eq!(store.module(h.0).err(), Some(Trap::InstanceGone));
        assert_eq!(store.module_record(h.0).and_then(|m| m.exception.as_deref()), Some("Exception: unreachable"));
    }
}
