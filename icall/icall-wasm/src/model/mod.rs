//! Module IR shared by the decoder, validator and runtime.

pub mod module;
pub mod types;

pub use module::{CodeBody, DataMode, DataSegment, ElementMode, ElementSegment, Expr, Global, LocalDecl, Module};
pub use types::{
    Export, ExportDesc, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc, Limits, MemIdx,
    MemoryType, TableIdx, TableType, TypeIdx, ValType, Value,
};
