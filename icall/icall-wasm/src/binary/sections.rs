//! Section ids, payload decoders and the top-level module parser.

use super::{cursor::Cursor, BinaryReadError, Result};
use crate::model::{
    CodeBody, DataMode, DataSegment, ElementMode, ElementSegment, Export, ExportDesc, Expr, FuncIdx, FuncType,
    Global, GlobalType, Import, ImportDesc, Limits, LocalDecl, MemoryType, Module, TableType, ValType,
};

/// Per-function ceiling on declared locals.
pub const MAX_LOCALS: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Custom,
    Type,
    Import,
    Function,
    Table,
    Memory,
    Global,
    Export,
    Start,
    Element,
    Code,
    Data,
    DataCount,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            12 => SectionId::DataCount,
            _ => return None,
        })
    }

    /// Position in the mandated section order. Data count sits between
    /// element and code despite its larger id.
    fn rank(self) -> u8 {
        match self {
            SectionId::Custom => 0,
            SectionId::Type => 1,
            SectionId::Import => 2,
            SectionId::Function => 3,
            SectionId::Table => 4,
            SectionId::Memory => 5,
            SectionId::Global => 6,
            SectionId::Export => 7,
            SectionId::Start => 8,
            SectionId::Element => 9,
            SectionId::DataCount => 10,
            SectionId::Code => 11,
            SectionId::Data => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: SectionId,
    pub payload_len: u32,
    pub payload_offset: usize,
}

pub fn read_section_header(cur: &mut Cursor) -> Result<SectionHeader> {
    let id_byte = cur.read_u8()?;
    let id = SectionId::from_byte(id_byte).ok_or(cur.malformed("unknown section id"))?;
    let payload_len = cur.read_var_u32()?;
    Ok(SectionHeader { id, payload_len, payload_offset: cur.offset() })
}

pub(crate) fn read_val_type(cur: &mut Cursor) -> Result<ValType> {
    match cur.read_u8()? {
        0x7F => Ok(ValType::I32),
        0x7E => Ok(ValType::I64),
        0x7D => Ok(ValType::F32),
        0x7C => Ok(ValType::F64),
        _ => Err(cur.malformed("invalid valtype")),
    }
}

fn expect_funcref(cur: &mut Cursor) -> Result<()> {
    match cur.read_u8()? {
        0x70 => Ok(()),
        _ => Err(cur.malformed("invalid reftype (expected funcref)")),
    }
}

fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    match cur.read_u8()? {
        0x00 => Ok(Limits::new(cur.read_var_u32()?, None)),
        0x01 => {
            let min = cur.read_var_u32()?;
            let max = cur.read_var_u32()?;
            Ok(Limits::new(min, Some(max)))
        }
        _ => Err(cur.malformed("invalid limits tag")),
    }
}

fn read_func_type(cur: &mut Cursor) -> Result<FuncType> {
    if cur.read_u8()? != 0x60 {
        return Err(cur.malformed("expected functype (0x60)"));
    }
    let params = cur.read_vec(read_val_type)?;
    let results = cur.read_vec(read_val_type)?;
    Ok(FuncType { params, results })
}

fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    expect_funcref(cur)?;
    Ok(TableType { limits: read_limits(cur)? })
}

fn read_memory_type(cur: &mut Cursor) -> Result<MemoryType> {
    Ok(MemoryType { limits: read_limits(cur)? })
}

fn read_global_type(cur: &mut Cursor) -> Result<GlobalType> {
    let val_type = read_val_type(cur)?;
    let mutable = match cur.read_u8()? {
        0x00 => false,
        0x01 => true,
        _ => return Err(cur.malformed("invalid global mutability")),
    };
    Ok(GlobalType { val_type, mutable })
}

/// Constant expression. Immediates are decoded so that an embedded 0x0B byte
/// is not mistaken for `end`; non-constant opcodes are rejected here.
fn read_expr(cur: &mut Cursor) -> Result<Expr> {
    let mut probe = *cur;
    loop {
        match probe.read_u8()? {
            0x0B => break,
            0x41 => {
                probe.read_var_i32()?;
            }
            0x42 => {
                probe.read_var_i64()?;
            }
            0x43 => {
                probe.read_bytes(4)?;
            }
            0x44 => {
                probe.read_bytes(8)?;
            }
            0x23 | 0xD2 => {
                probe.read_var_u32()?;
            }
            0xD0 => expect_funcref(&mut probe)?,
            _ => return Err(probe.malformed("unsupported instruction in constant expression")),
        }
    }
    let len = probe.offset() - cur.offset();
    Ok(Expr { body: cur.read_bytes(len)?.to_vec() })
}

/// Element item expression: `ref.func idx` or `ref.null func`.
fn read_elem_item(cur: &mut Cursor) -> Result<Option<FuncIdx>> {
    let item = match cur.read_u8()? {
        0xD2 => Some(cur.read_var_u32()?),
        0xD0 => {
            expect_funcref(cur)?;
            None
        }
        _ => return Err(cur.malformed("element expression must be ref.func or ref.null")),
    };
    if cur.read_u8()? != 0x0B {
        return Err(cur.malformed("element expression missing end"));
    }
    Ok(item)
}

fn read_import_section(cur: &mut Cursor, module: &mut Module) -> Result<()> {
    module.imports = cur.read_vec(|c| {
        let module = c.read_name()?;
        let name = c.read_name()?;
        let desc = match c.read_u8()? {
            0x00 => ImportDesc::Func(c.read_var_u32()?),
            0x01 => ImportDesc::Table(read_table_type(c)?),
            0x02 => ImportDesc::Memory(read_memory_type(c)?),
            0x03 => ImportDesc::Global(read_global_type(c)?),
            _ => return Err(c.malformed("invalid import desc tag")),
        };
        Ok(Import { module, name, desc })
    })?;
    for imp in &module.imports {
        match imp.desc {
            ImportDesc::Func(_) => module.imported_funcs += 1,
            ImportDesc::Table(_) => module.imported_tables += 1,
            ImportDesc::Memory(_) => module.imported_memories += 1,
            ImportDesc::Global(_) => module.imported_globals += 1,
        }
    }
    Ok(())
}

fn read_export_section(cur: &mut Cursor) -> Result<Vec<Export>> {
    cur.read_vec(|c| {
        let name = c.read_name()?;
        let desc = match c.read_u8()? {
            0x00 => ExportDesc::Func(c.read_var_u32()?),
            0x01 => ExportDesc::Table(c.read_var_u32()?),
            0x02 => ExportDesc::Memory(c.read_var_u32()?),
            0x03 => ExportDesc::Global(c.read_var_u32()?),
            _ => return Err(c.malformed("invalid export desc tag")),
        };
        Ok(Export { name, desc })
    })
}

fn read_element_segment(cur: &mut Cursor) -> Result<ElementSegment> {
    let flags = cur.read_var_u32()?;
    if flags > 7 {
        return Err(cur.malformed("invalid element segment flags"));
    }
    let mode = match flags {
        0 | 4 => ElementMode::Active { table: 0, offset: read_expr(cur)? },
        2 | 6 => {
            let table = cur.read_var_u32()?;
            ElementMode::Active { table, offset: read_expr(cur)? }
        }
        1 | 5 => ElementMode::Passive,
        _ => ElementMode::Declared,
    };
    // Explicit element kind / reftype byte for every encoding except 0 and 4.
    let uses_exprs = flags & 0b100 != 0;
    if flags != 0 && flags != 4 {
        if uses_exprs {
            expect_funcref(cur)?;
        } else if cur.read_u8()? != 0x00 {
            return Err(cur.malformed("invalid element kind"));
        }
    }
    let init = if uses_exprs {
        cur.read_vec(read_elem_item)?
    } else {
        cur.read_vec(|c| c.read_var_u32().map(Some))?
    };
    Ok(ElementSegment { mode, init })
}

fn read_data_segment(cur: &mut Cursor) -> Result<DataSegment> {
    let mode = match cur.read_var_u32()? {
        0 => DataMode::Active { memory: 0, offset: read_expr(cur)? },
        1 => DataMode::Passive,
        2 => {
            let memory = cur.read_var_u32()?;
            DataMode::Active { memory, offset: read_expr(cur)? }
        }
        _ => return Err(cur.malformed("invalid data segment flags")),
    };
    let init = cur.read_len_prefixed()?.to_vec();
    Ok(DataSegment { mode, init })
}

fn read_code_body(cur: &mut Cursor) -> Result<CodeBody> {
    let bytes = cur.read_len_prefixed()?;
    let mut sub = Cursor::new(bytes);
    let locals = sub.read_vec(|c| {
        let count = c.read_var_u32()?;
        let val_type = read_val_type(c)?;
        Ok(LocalDecl { count, val_type })
    })?;
    let body = CodeBody { locals, body: Vec::new() };
    if body.local_count() > MAX_LOCALS {
        return Err(sub.malformed("too many locals"));
    }
    let rest = sub.read_bytes(sub.remaining())?;
    if rest.last() != Some(&0x0B) {
        return Err(sub.malformed("function body must end with `end`"));
    }
    Ok(CodeBody { body: rest.to_vec(), ..body })
}

/// Parse a complete binary module into the IR.
pub fn parse_module_from_bytes(bytes: &[u8]) -> Result<Module> {
    let mut cur = Cursor::new(bytes);
    if cur.read_u32_le()? != 0x6D73_6100 {
        return Err(BinaryReadError::Malformed { offset: 0, msg: "bad magic header" });
    }
    if cur.read_u32_le()? != 1 {
        return Err(BinaryReadError::Malformed { offset: 4, msg: "unsupported version" });
    }

    let mut module = Module::default();
    let mut last_rank = 0u8;

    while !cur.is_eof() {
        let header = read_section_header(&mut cur)?;
        let payload = cur.read_bytes(header.payload_len as usize)?;
        if header.id == SectionId::Custom {
            continue;
        }
        let rank = header.id.rank();
        if rank <= last_rank {
            let msg = if rank == last_rank { "duplicate section" } else { "section out of order" };
            return Err(BinaryReadError::Malformed { offset: header.payload_offset, msg });
        }
        last_rank = rank;

        let mut pcur = Cursor::new(payload);
        match header.id {
            SectionId::Type => module.types = pcur.read_vec(read_func_type)?,
            SectionId::Import => read_import_section(&mut pcur, &mut module)?,
            SectionId::Function => module.func_type_indices = pcur.read_vec(|c| c.read_var_u32())?,
            SectionId::Table => module.tables = pcur.read_vec(read_table_type)?,
            SectionId::Memory => module.memories = pcur.read_vec(read_memory_type)?,
            SectionId::Global => {
                module.globals = pcur.read_vec(|c| {
                    let ty = read_global_type(c)?;
                    Ok(Global { ty, init: read_expr(c)? })
                })?
            }
            SectionId::Export => module.exports = read_export_section(&mut pcur)?,
            SectionId::Start => module.start = Some(pcur.read_var_u32()?),
            SectionId::Element => module.elements = pcur.read_vec(read_element_segment)?,
            SectionId::DataCount => module.data_count = Some(pcur.read_var_u32()?),
            SectionId::Code => module.codes = pcur.read_vec(read_code_body)?,
            SectionId::Data => module.data = pcur.read_vec(read_data_segment)?,
            SectionId::Custom => {}
        }
        if !pcur.is_eof() {
            return Err(BinaryReadError::Malformed {
                offset: header.payload_offset + pcur.offset(),
                msg: "section payload not fully consumed",
            });
        }
    }

    if module.func_type_indices.len() != module.codes.len() {
        return Err(BinaryReadError::Malformed { offset: 0, msg: "function and code section length mismatch" });
    }
    if let Some(count) = module.data_count {
        if count as usize != module.data.len() {
            return Err(BinaryReadError::Malformed { offset: 0, msg: "data count and data section disagree" });
        }
    }
    Ok(module)
}
