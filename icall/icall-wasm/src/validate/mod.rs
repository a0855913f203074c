//! Module-level validation: index spaces, limits, exports, start function,
//! constant expressions and segment references. Function bodies are checked
//! when they are compiled (see [`crate::vm::code`]).

use std::collections::HashSet;

use crate::binary::cursor::Cursor;
use crate::error::ValidationError;
use crate::model::{
    DataMode, ElementMode, ExportDesc, Expr, FuncType, ImportDesc, Limits, Module, ValType,
};

type VResult<T> = Result<T, ValidationError>;

/// Largest memory expressible with 32-bit addresses, in pages.
pub const MAX_PAGES: u32 = 65_536;
/// Largest initial table size a module may declare. Tables never grow, so
/// only the minimum is allocated.
pub const MAX_TABLE_ELEMS: u32 = 10_000_000;

fn unknown(space: &'static str, index: u32) -> ValidationError {
    ValidationError::UnknownIndex { space, index }
}

fn check_limits(limits: &Limits, bound: Option<u32>, context: &'static str) -> VResult<()> {
    if let Some(max) = limits.max {
        if max < limits.min {
            return Err(ValidationError::InvalidLimits {
                context,
                detail: format!("max {max} is below min {}", limits.min),
            });
        }
    }
    if let Some(bound) = bound {
        let largest = limits.max.unwrap_or(limits.min);
        if limits.min > bound || largest > bound {
            return Err(ValidationError::InvalidLimits {
                context,
                detail: format!("size must be at most {bound} pages"),
            });
        }
    }
    Ok(())
}

/// Type produced by a constant expression. Only numeric constants and
/// `global.get` of an immutable imported global are accepted.
pub fn const_expr_type(m: &Module, expr: &Expr, context: &'static str) -> VResult<ValType> {
    let bad = |detail| ValidationError::ConstExpr { context, detail };
    let mut cur = Cursor::new(&expr.body);
    let op = cur.read_u8().map_err(|_| bad("empty expression"))?;
    let ty = match op {
        0x41 => ValType::I32,
        0x42 => ValType::I64,
        0x43 => ValType::F32,
        0x44 => ValType::F64,
        0x23 => {
            let idx = cur.read_var_u32().map_err(|_| bad("truncated global index"))?;
            if idx >= m.imported_globals {
                return Err(bad("global.get must reference an imported global"));
            }
            let gt = m.global_type(idx).ok_or_else(|| unknown("global", idx))?;
            if gt.mutable {
                return Err(bad("global.get must reference an immutable global"));
            }
            gt.val_type
        }
        0xD0 | 0xD2 => return Err(bad("reference expressions are only allowed in element segments")),
        _ => return Err(bad("unsupported instruction")),
    };
    // Skip the immediate of a numeric constant, then expect `end` as the last byte.
    let immediate_ok = match op {
        0x41 => cur.read_var_i32().is_ok(),
        0x42 => cur.read_var_i64().is_ok(),
        0x43 => cur.read_bytes(4).is_ok(),
        0x44 => cur.read_bytes(8).is_ok(),
        _ => true,
    };
    if !immediate_ok || cur.read_u8() != Ok(0x0B) || !cur.is_eof() {
        return Err(bad("expression must be a single constant followed by end"));
    }
    Ok(ty)
}

fn expect_i32_offset(m: &Module, expr: &Expr, context: &'static str) -> VResult<()> {
    match const_expr_type(m, expr, context)? {
        ValType::I32 => Ok(()),
        _ => Err(ValidationError::ConstExpr { context, detail: "offset must be an i32" }),
    }
}

pub fn validate_module(m: &Module) -> VResult<()> {
    let types = m.types.len() as u32;

    for imp in &m.imports {
        match &imp.desc {
            ImportDesc::Func(t) if *t >= types => return Err(unknown("type", *t)),
            ImportDesc::Table(tt) => check_limits(&tt.limits, None, "imported table")?,
            ImportDesc::Memory(mt) => check_limits(&mt.limits, Some(MAX_PAGES), "imported memory")?,
            _ => {}
        }
    }
    for &t in &m.func_type_indices {
        if t >= types {
            return Err(unknown("type", t));
        }
    }

    if m.total_tables() > 1 {
        return Err(ValidationError::Multiple("tables"));
    }
    if m.total_memories() > 1 {
        return Err(ValidationError::Multiple("memories"));
    }
    for tt in &m.tables {
        check_limits(&tt.limits, None, "table")?;
        if tt.limits.min > MAX_TABLE_ELEMS {
            return Err(ValidationError::InvalidLimits {
                context: "table",
                detail: format!("initial size must be at most {MAX_TABLE_ELEMS} elements"),
            });
        }
    }
    for mt in &m.memories {
        check_limits(&mt.limits, Some(MAX_PAGES), "memory")?;
    }

    for g in &m.globals {
        let ty = const_expr_type(m, &g.init, "global initializer")?;
        if ty != g.ty.val_type {
            return Err(ValidationError::ConstExpr {
                context: "global initializer",
                detail: "initializer type does not match the global",
            });
        }
    }

    let mut names = HashSet::with_capacity(m.exports.len());
    for e in &m.exports {
        if !names.insert(e.name.as_str()) {
            return Err(ValidationError::DuplicateExport(e.name.clone()));
        }
        match e.desc {
            ExportDesc::Func(i) if i >= m.total_funcs() => return Err(unknown("function", i)),
            ExportDesc::Table(i) if i >= m.total_tables() => return Err(unknown("table", i)),
            ExportDesc::Memory(i) if i >= m.total_memories() => return Err(unknown("memory", i)),
            ExportDesc::Global(i) if i >= m.total_globals() => return Err(unknown("global", i)),
            _ => {}
        }
    }

    if let Some(start) = m.start {
        let ty = m.func_type(start).ok_or_else(|| unknown("function", start))?;
        if *ty != FuncType::default() {
            return Err(ValidationError::StartSignature(ty.clone()));
        }
    }

    for seg in &m.elements {
        if let ElementMode::Active { table, offset } = &seg.mode {
            if *table >= m.total_tables() {
                return Err(unknown("table", *table));
            }
            expect_i32_offset(m, offset, "element offset")?;
        }
        for f in seg.init.iter().flatten() {
            if *f >= m.total_funcs() {
                return Err(unknown("function", *f));
            }
        }
    }

    for seg in &m.data {
        if let DataMode::Active { memory, offset } = &seg.mode {
            if *memory >= m.total_memories() {
                return Err(unknown("memory", *memory));
            }
            expect_i32_offset(m, offset, "data offset")?;
        }
    }

    Ok(())
}
