//! Function body compilation.
//!
//! Each body is decoded once into a flat [`Instr`] vector. Structured control
//! instructions carry the positions of their matching `else`/`end` and the
//! arities of their block type, so the interpreter never rescans bytes. Index
//! immediates are checked against the module here; anything the interpreter
//! does not implement is rejected as an unknown opcode.

use std::iter;
use std::sync::Arc;

use crate::binary::cursor::Cursor;
use crate::binary::sections::{read_val_type, MAX_LOCALS};
use crate::error::ValidationError;
use crate::model::{CodeBody, FuncIdx, FuncType, Module, ValType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Unreachable,
    Nop,
    Block { params: u32, results: u32, end: usize },
    Loop { params: u32, results: u32 },
    If { params: u32, results: u32, else_at: Option<usize>, end: usize },
    Else { end: usize },
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Box<[u32]>, default: u32 },
    Return,
    Call(FuncIdx),
    CallIndirect { type_idx: u32 },
    Drop,
    Select,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    /// Memory load; `op` is the original opcode (0x28..=0x35).
    Load { op: u8, offset: u32 },
    /// Memory store; `op` is the original opcode (0x36..=0x3E).
    Store { op: u8, offset: u32 },
    MemorySize,
    MemoryGrow,
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    /// Stack-only numeric instruction, opcodes 0x45..=0xC4.
    Numeric(u8),
    /// Saturating truncation, `0xFC` sub-opcodes 0..=7.
    TruncSat(u8),
}

/// A compiled function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub ty: FuncType,
    /// Declared locals, not including parameters.
    pub locals: Vec<ValType>,
    pub code: Vec<Instr>,
}

impl Body {
    pub fn frame_slots(&self) -> usize {
        self.ty.params.len() + self.locals.len()
    }
}

/// Compile every defined function of a validated module.
pub fn compile_module(m: &Module) -> Result<Vec<Arc<Body>>, ValidationError> {
    m.codes
        .iter()
        .enumerate()
        .map(|(i, code)| compile_function(m, m.imported_funcs + i as u32, code).map(Arc::new))
        .collect()
}

pub fn compile_function(m: &Module, func: FuncIdx, code: &CodeBody) -> Result<Body, ValidationError> {
    let ty = m.func_type(func).cloned().ok_or(ValidationError::UnknownIndex { space: "function", index: func })?;
    let declared = code.local_count();
    if declared > MAX_LOCALS {
        return Err(ValidationError::TooManyLocals { func, count: declared, limit: MAX_LOCALS });
    }
    let locals: Vec<ValType> =
        code.locals.iter().flat_map(|d| iter::repeat(d.val_type).take(d.count as usize)).collect();

    let mut c = Compiler { m, func, local_slots: (ty.params.len() + locals.len()) as u32, out: Vec::new(), open: Vec::new() };
    c.run(&code.body)?;
    Ok(Body { ty, locals, code: c.out })
}

struct Compiler<'m> {
    m: &'m Module,
    func: FuncIdx,
    local_slots: u32,
    out: Vec<Instr>,
    /// Positions of `block`/`loop`/`if` still waiting for their `end`.
    open: Vec<usize>,
}

type Step<T> = Result<T, &'static str>;

impl<'m> Compiler<'m> {
    fn run(&mut self, bytes: &[u8]) -> Result<(), ValidationError> {
        let mut cur = Cursor::new(bytes);
        loop {
            let at = self.out.len();
            let done = self.step(&mut cur).map_err(|detail| ValidationError::Body { func: self.func, at, detail })?;
            if done {
                if !cur.is_eof() {
                    return Err(ValidationError::Body { func: self.func, at, detail: "bytes after the final end" });
                }
                return Ok(());
            }
            if cur.is_eof() {
                return Err(ValidationError::Body { func: self.func, at, detail: "missing final end" });
            }
        }
    }

    /// Decode one instruction. Returns true once the function's own `end` is seen.
    fn step(&mut self, cur: &mut Cursor) -> Step<bool> {
        const TRUNCATED: &str = "truncated or malformed immediate";
        let at = self.out.len();
        let op = cur.read_u8().map_err(|_| TRUNCATED)?;
        let instr = match op {
            0x00 => Instr::Unreachable,
            0x01 => Instr::Nop,
            0x02 | 0x03 | 0x04 => {
                let (params, results) = self.block_type(cur)?;
                self.open.push(at);
                match op {
                    0x02 => Instr::Block { params, results, end: 0 },
                    0x03 => Instr::Loop { params, results },
                    _ => Instr::If { params, results, else_at: None, end: 0 },
                }
            }
            0x05 => {
                let top = self.open.last().copied().ok_or("else without if")?;
                match &mut self.out[top] {
                    Instr::If { else_at: slot @ None, .. } => *slot = Some(at),
                    _ => return Err("else without if"),
                }
                Instr::Else { end: 0 }
            }
            0x0B => {
                let Some(start) = self.open.pop() else {
                    self.out.push(Instr::End);
                    return Ok(true);
                };
                let mut else_pos = None;
                match &mut self.out[start] {
                    Instr::Block { end, .. } => *end = at,
                    Instr::If { end, else_at, .. } => {
                        *end = at;
                        else_pos = *else_at;
                    }
                    _ => {}
                }
                if let Some(e) = else_pos {
                    self.out[e] = Instr::Else { end: at };
                }
                Instr::End
            }
            0x0C => Instr::Br(self.label(cur)?),
            0x0D => Instr::BrIf(self.label(cur)?),
            0x0E => {
                let targets = cur.read_vec(|c| c.read_var_u32()).map_err(|_| TRUNCATED)?;
                for &t in &targets {
                    self.check_depth(t)?;
                }
                let default = self.label(cur)?;
                Instr::BrTable { targets: targets.into_boxed_slice(), default }
            }
            0x0F => Instr::Return,
            0x10 => {
                let f = cur.read_var_u32().map_err(|_| TRUNCATED)?;
                if f >= self.m.total_funcs() {
                    return Err("call to unknown function");
                }
                Instr::Call(f)
            }
            0x11 => {
                let type_idx = cur.read_var_u32().map_err(|_| TRUNCATED)?;
                let table = cur.read_var_u32().map_err(|_| TRUNCATED)?;
                if type_idx as usize >= self.m.types.len() {
                    return Err("call_indirect with unknown type");
                }
                if table >= self.m.total_tables() {
                    return Err("call_indirect requires a table");
                }
                Instr::CallIndirect { type_idx }
            }
            0x1A => Instr::Drop,
            0x1B => Instr::Select,
            0x1C => {
                let tys = cur.read_vec(read_val_type).map_err(|_| TRUNCATED)?;
                if tys.len() != 1 {
                    return Err("typed select takes exactly one type");
                }
                Instr::Select
            }
            0x20..=0x22 => {
                let idx = cur.read_var_u32().map_err(|_| TRUNCATED)?;
                if idx >= self.local_slots {
                    return Err("unknown local");
                }
                match op {
                    0x20 => Instr::LocalGet(idx),
                    0x21 => Instr::LocalSet(idx),
                    _ => Instr::LocalTee(idx),
                }
            }
            0x23 | 0x24 => {
                let idx = cur.read_var_u32().map_err(|_| TRUNCATED)?;
                let gt = self.m.global_type(idx).ok_or("unknown global")?;
                if op == 0x23 {
                    Instr::GlobalGet(idx)
                } else if gt.mutable {
                    Instr::GlobalSet(idx)
                } else {
                    return Err("global.set on an immutable global");
                }
            }
            0x28..=0x3E => {
                self.require_memory()?;
                let _align = cur.read_var_u32().map_err(|_| TRUNCATED)?;
                let offset = cur.read_var_u32().map_err(|_| TRUNCATED)?;
                if op <= 0x35 {
                    Instr::Load { op, offset }
                } else {
                    Instr::Store { op, offset }
                }
            }
            0x3F | 0x40 => {
                self.require_memory()?;
                if cur.read_u8().map_err(|_| TRUNCATED)? != 0x00 {
                    return Err("memory index immediate must be zero");
                }
                if op == 0x3F {
                    Instr::MemorySize
                } else {
                    Instr::MemoryGrow
                }
            }
            0x41 => Instr::I32Const(cur.read_var_i32().map_err(|_| TRUNCATED)?),
            0x42 => Instr::I64Const(cur.read_var_i64().map_err(|_| TRUNCATED)?),
            0x43 => Instr::F32Const(cur.read_u32_le().map_err(|_| TRUNCATED)?),
            0x44 => Instr::F64Const(cur.read_u64_le().map_err(|_| TRUNCATED)?),
            0x45..=0xC4 => Instr::Numeric(op),
            0xFC => match cur.read_var_u32().map_err(|_| TRUNCATED)? {
                sub @ 0..=7 => Instr::TruncSat(sub as u8),
                _ => return Err("unknown opcode"),
            },
            _ => return Err("unknown opcode"),
        };
        self.out.push(instr);
        Ok(false)
    }

    fn block_type(&self, cur: &mut Cursor) -> Step<(u32, u32)> {
        match cur.peek_u8().map_err(|_| "truncated block type")? {
            0x40 => {
                cur.read_u8().map_err(|_| "truncated block type")?;
                Ok((0, 0))
            }
            0x7F | 0x7E | 0x7D | 0x7C => {
                cur.read_u8().map_err(|_| "truncated block type")?;
                Ok((0, 1))
            }
            _ => {
                let idx = cur.read_var_s33().map_err(|_| "malformed block type")?;
                let ft = usize::try_from(idx).ok().and_then(|i| self.m.types.get(i)).ok_or("unknown block type")?;
                Ok((ft.params.len() as u32, ft.results.len() as u32))
            }
        }
    }

    fn label(&self, cur: &mut Cursor) -> Step<u32> {
        let depth = cur.read_var_u32().map_err(|_| "truncated label")?;
        self.check_depth(depth)?;
        Ok(depth)
    }

    /// Depth equal to the number of open blocks names the function itself.
    fn check_depth(&self, depth: u32) -> Step<()> {
        if depth as usize > self.open.len() {
            return Err("branch depth out of range");
        }
        Ok(())
    }

    fn require_memory(&self) -> Step<()> {
        if self.m.total_memories() == 0 {
            return Err("memory instruction without a memory");
        }
        Ok(())
    }
}
