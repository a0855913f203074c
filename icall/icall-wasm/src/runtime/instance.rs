//! Function and module instance records held by the [`super::Store`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::host::HostFunc;
use crate::model::{FuncType, Module};
use crate::vm::code::Body;

#[derive(Clone)]
pub enum FuncInstance {
    /// Function defined by a module; `module` indexes `Store::modules`.
    Wasm { body: Arc<Body>, module: usize },
    Host { ty: FuncType, f: Arc<HostFunc> },
}

impl FuncInstance {
    pub fn ty(&self) -> &FuncType {
        match self {
            FuncInstance::Wasm { body, .. } => &body.ty,
            FuncInstance::Host { ty, .. } => ty,
        }
    }
}

impl fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncInstance::Wasm { body, module } => {
                f.debug_struct("Wasm").field("ty", &body.ty).field("module", module).finish()
            }
            FuncInstance::Host { ty, .. } => f.debug_struct("Host").field("ty", ty).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeExportDesc {
    Func(usize),
    Table(usize),
    Memory(usize),
    Global(usize),
}

/// Store addresses of a module's index spaces plus its exports and the
/// exception slot the engine reports through.
#[derive(Debug, Clone, Default)]
pub struct ModuleInstance {
    pub funcs: Vec<usize>,
    pub tables: Vec<usize>,
    pub memories: Vec<usize>,
    pub globals: Vec<usize>,
    pub exports: HashMap<String, RuntimeExportDesc>,
    pub module_ir: Arc<Module>,
    /// Latest exception, cleared at the start of each call.
    pub exception: Option<String>,
    pub alive: bool,
}

impl ModuleInstance {
    pub fn export_func(&self, name: &str) -> Option<usize> {
        match self.exports.get(name)? {
            RuntimeExportDesc::Func(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn func_addr(&self, idx: u32) -> Option<usize> {
        self.funcs.get(idx as usize).copied()
    }

    pub fn memory_addr(&self) -> Option<usize> {
        self.memories.first().copied()
    }

    pub fn table_addr(&self) -> Option<usize> {
        self.tables.first().copied()
    }
}
