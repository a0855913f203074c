//! Parse-time module IR: declarations, raw function bodies and segments.

use super::types::{
    Export, FuncIdx, FuncType, GlobalType, Import, ImportDesc, MemIdx, MemoryType, TableIdx, TableType,
    TypeIdx, ValType,
};

/// `count` repetitions of a local of type `val_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDecl {
    pub count: u32,
    pub val_type: ValType,
}

/// Constant expression bytes, including the terminating `end`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expr {
    pub body: Vec<u8>,
}

/// A defined function's locals and raw instruction bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeBody {
    pub locals: Vec<LocalDecl>,
    pub body: Vec<u8>,
}

impl CodeBody {
    pub fn local_count(&self) -> u64 {
        self.locals.iter().map(|l| l.count as u64).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementMode {
    Active { table: TableIdx, offset: Expr },
    Passive,
    Declared,
}

/// Element segment. `None` entries are `ref.null func` items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub mode: ElementMode,
    pub init: Vec<Option<FuncIdx>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMode {
    Active { memory: MemIdx, offset: Expr },
    Passive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub mode: DataMode,
    pub init: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of each defined function, in module order.
    pub func_type_indices: Vec<TypeIdx>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,
    pub elements: Vec<ElementSegment>,
    pub data_count: Option<u32>,
    pub codes: Vec<CodeBody>,
    pub data: Vec<DataSegment>,

    pub imported_funcs: u32,
    pub imported_tables: u32,
    pub imported_memories: u32,
    pub imported_globals: u32,
}

impl Module {
    pub fn total_funcs(&self) -> u32 {
        self.imported_funcs + self.func_type_indices.len() as u32
    }
    pub fn total_tables(&self) -> u32 {
        self.imported_tables + self.tables.len() as u32
    }
    pub fn total_memories(&self) -> u32 {
        self.imported_memories + self.memories.len() as u32
    }
    pub fn total_globals(&self) -> u32 {
        self.imported_globals + self.globals.len() as u32
    }

    /// Type index of a function in the combined (imports first) index space.
    pub fn func_type_idx(&self, func: FuncIdx) -> Option<TypeIdx> {
        if func < self.imported_funcs {
            self.imports
                .iter()
                .filter_map(|i| match i.desc {
                    ImportDesc::Func(t) => Some(t),
                    _ => None,
                })
                .nth(func as usize)
        } else {
            self.func_type_indices.get((func - self.imported_funcs) as usize).copied()
        }
    }

    pub fn func_type(&self, func: FuncIdx) -> Option<&FuncType> {
        self.func_type_idx(func).and_then(|t| self.types.get(t as usize))
    }

    /// Type of a global in the combined index space.
    pub fn global_type(&self, global: u32) -> Option<GlobalType> {
        if global < self.imported_globals {
            self.imports
                .iter()
                .filter_map(|i| match i.desc {
                    ImportDesc::Global(g) => Some(g),
                    _ => None,
                })
                .nth(global as usize)
        } else {
            self.globals.get((global - self.imported_globals) as usize).map(|g| g.ty)
        }
    }
}
