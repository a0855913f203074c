//! Interpreter over compiled [`Body`] code.
//!
//! Calls never recurse on the Rust stack: the caller's [`Frame`] is parked in
//! a vector while the callee runs. Operand values live in one
//! [`ValueStack`] whose byte budget also pays for every active frame, so deep
//! wasm recursion ends in `wasm operand stack overflow` rather than a native
//! stack overflow.

use std::mem;
use std::sync::Arc;

use tracing::trace;

use crate::error::Trap;
use crate::exec_env::StackBudget;
use crate::model::{FuncType, ValType, Value};
use crate::runtime::{FuncInstance, Store};
use crate::vm::code::{Body, Instr};
use crate::vm::numeric;
use crate::vm::stack::ValueStack;

/// Run the function at store address `addr` with `args` under `budget`.
pub fn invoke(store: &mut Store, addr: usize, args: &[Value], budget: StackBudget) -> Result<Vec<Value>, Trap> {
    let ty = store.func(addr)?.ty().clone();
    if args.len() != ty.params.len() || args.iter().zip(&ty.params).any(|(a, t)| a.ty() != *t) {
        let found = FuncType::new(args.iter().map(Value::ty).collect::<Vec<_>>(), ty.results.clone());
        return Err(Trap::SignatureMismatch { expected: ty, found });
    }

    let mut m = Machine { store, stack: ValueStack::new(budget), max_depth: budget.max_call_depth };
    for a in args {
        m.stack.push(*a)?;
    }
    if let Some(frame) = m.enter(addr, 0)? {
        m.run(frame)?;
    }
    m.stack.pop_typed(&ty.results)
}

#[derive(Debug, Clone, Copy)]
struct Label {
    /// Stack height when the block was entered, below its parameters.
    height: usize,
    /// Values carried by a branch to this label.
    branch_arity: usize,
    /// Values left when control falls through the block's `end`.
    end_arity: usize,
    /// Where a branch continues: past `end` for blocks, the loop header for loops.
    cont: usize,
}

#[derive(Debug)]
struct Frame {
    body: Arc<Body>,
    module: usize,
    pc: usize,
    locals: Vec<Value>,
    /// Stack height after the arguments were popped.
    base: usize,
    labels: Vec<Label>,
    /// Bytes reserved for this frame.
    cost: usize,
}

enum Flow {
    Next,
    Call(usize),
    Return,
}

struct Machine<'s> {
    store: &'s mut Store,
    stack: ValueStack,
    max_depth: usize,
}

impl Machine<'_> {
    /// Set up a call to `addr` with `depth` wasm frames already active. Host
    /// functions run to completion here and yield no frame.
    fn enter(&mut self, addr: usize, depth: usize) -> Result<Option<Frame>, Trap> {
        let func = self.store.func(addr)?.clone();
        match func {
            FuncInstance::Host { ty, f } => {
                let args = self.stack.pop_typed(&ty.params)?;
                match (f(&args)?, ty.results.as_slice()) {
                    (None, []) => {}
                    (Some(v), [t]) if v.ty() == *t => self.stack.push(v)?,
                    _ => return Err(Trap::Host(format!("host function returned a value that does not match {ty}"))),
                }
                Ok(None)
            }
            FuncInstance::Wasm { body, module } => {
                if depth >= self.max_depth {
                    return Err(Trap::CallStackExhausted);
                }
                let mut locals = self.stack.pop_typed(&body.ty.params)?;
                let cost = StackBudget::frame_cost(body.frame_slots());
                self.stack.reserve(cost)?;
                locals.extend(body.locals.iter().map(|t| Value::zero(*t)));
                trace!(addr, depth, "enter");
                Ok(Some(Frame { base: self.stack.len(), body, module, pc: 0, locals, labels: Vec::new(), cost }))
            }
        }
    }

    /// Drop everything the frame left above its results and give back its bytes.
    fn leave(&mut self, frame: &Frame) -> Result<(), Trap> {
        self.stack.unwind(frame.base, frame.body.ty.results.len())?;
        self.stack.release(frame.cost);
        Ok(())
    }

    fn run(&mut self, entry: Frame) -> Result<(), Trap> {
        let mut frame = entry;
        let mut callers: Vec<Frame> = Vec::new();
        let mut body = Arc::clone(&frame.body);
        loop {
            match self.step(&mut frame, &body)? {
                Flow::Next => {}
                Flow::Call(addr) => {
                    if let Some(callee) = self.enter(addr, callers.len() + 1)? {
                        callers.push(mem::replace(&mut frame, callee));
                        body = Arc::clone(&frame.body);
                    }
                }
                Flow::Return => {
                    self.leave(&frame)?;
                    match callers.pop() {
                        Some(caller) => {
                            frame = caller;
                            body = Arc::clone(&frame.body);
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn block_label(&self, params: u32, branch_arity: u32, end_arity: u32, cont: usize) -> Result<Label, Trap> {
        let height = self.stack.len().checked_sub(params as usize).ok_or(Trap::StackUnderflow)?;
        Ok(Label { height, branch_arity: branch_arity as usize, end_arity: end_arity as usize, cont })
    }

    fn end_block(&mut self, frame: &mut Frame) -> Result<(), Trap> {
        let label = frame.labels.pop().ok_or(Trap::StackUnderflow)?;
        self.stack.unwind(label.height, label.end_arity)
    }

    fn branch(&mut self, frame: &mut Frame, depth: u32) -> Result<Flow, Trap> {
        let depth = depth as usize;
        // One past the innermost open block is the function body itself.
        if depth >= frame.labels.len() {
            return Ok(Flow::Return);
        }
        let idx = frame.labels.len() - 1 - depth;
        let label = frame.labels[idx];
        self.stack.unwind(label.height, label.branch_arity)?;
        frame.labels.truncate(idx);
        frame.pc = label.cont;
        Ok(Flow::Next)
    }

    fn step(&mut self, frame: &mut Frame, body: &Body) -> Result<Flow, Trap> {
        let pc = frame.pc;
        let Some(instr) = body.code.get(pc) else {
            return Ok(Flow::Return);
        };
        frame.pc += 1;
        match instr {
            Instr::Unreachable => return Err(Trap::Unreachable),
            Instr::Nop => {}
            Instr::Block { params, results, end } => {
                let label = self.block_label(*params, *results, *results, end + 1)?;
                frame.labels.push(label);
            }
            Instr::Loop { params, results } => {
                let label = self.block_label(*params, *params, *results, pc)?;
                frame.labels.push(label);
            }
            Instr::If { params, results, else_at, end } => {
                let cond = self.stack.pop_i32()?;
                match (cond != 0, else_at) {
                    (true, _) => frame.labels.push(self.block_label(*params, *results, *results, end + 1)?),
                    (false, Some(e)) => {
                        frame.labels.push(self.block_label(*params, *results, *results, end + 1)?);
                        frame.pc = e + 1;
                    }
                    (false, None) => frame.pc = end + 1,
                }
            }
            Instr::Else { end } => {
                self.end_block(frame)?;
                frame.pc = end + 1;
            }
            Instr::End => {
                if frame.labels.is_empty() {
                    return Ok(Flow::Return);
                }
                self.end_block(frame)?;
            }
            Instr::Br(depth) => return self.branch(frame, *depth),
            Instr::BrIf(depth) => {
                if self.stack.pop_i32()? != 0 {
                    return self.branch(frame, *depth);
                }
            }
            Instr::BrTable { targets, default } => {
                let i = self.stack.pop_i32()? as u32 as usize;
                let depth = targets.get(i).copied().unwrap_or(*default);
                return self.branch(frame, depth);
            }
            Instr::Return => return Ok(Flow::Return),
            Instr::Call(f) => {
                let addr = self.store.module(frame.module)?.func_addr(*f).ok_or(Trap::InstanceGone)?;
                return Ok(Flow::Call(addr));
            }
            Instr::CallIndirect { type_idx } => {
                let idx = self.stack.pop_i32()? as u32;
                let expected = self
                    .store
                    .module(frame.module)?
                    .module_ir
                    .types
                    .get(*type_idx as usize)
                    .cloned()
                    .ok_or(Trap::InstanceGone)?;
                let addr = self.store.table_of(frame.module)?.slot(idx)?;
                let found = self.store.func(addr)?.ty();
                if *found != expected {
                    return Err(Trap::IndirectCallTypeMismatch { expected, found: found.clone() });
                }
                return Ok(Flow::Call(addr));
            }
            Instr::Drop => {
                self.stack.pop()?;
            }
            Instr::Select => {
                let cond = self.stack.pop_i32()?;
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                if a.ty() != b.ty() {
                    return Err(Trap::OperandTypeMismatch(a.ty()));
                }
                self.stack.push(if cond != 0 { a } else { b })?;
            }
            Instr::LocalGet(i) => {
                let v = *frame.locals.get(*i as usize).ok_or(Trap::StackUnderflow)?;
                self.stack.push(v)?;
            }
            Instr::LocalSet(i) => {
                let v = self.stack.pop()?;
                set_local(frame, *i, v)?;
            }
            Instr::LocalTee(i) => {
                let v = self.stack.pop()?;
                self.stack.push(v)?;
                set_local(frame, *i, v)?;
            }
            Instr::GlobalGet(i) => {
                let v = self.store.global_of(frame.module, *i)?.get();
                self.stack.push(v)?;
            }
            Instr::GlobalSet(i) => {
                let v = self.stack.pop()?;
                self.store.global_of(frame.module, *i)?.set(v)?;
            }
            Instr::Load { op, offset } => self.load(frame.module, *op, *offset)?,
            Instr::Store { op, offset } => self.store_mem(frame.module, *op, *offset)?,
            Instr::MemorySize => {
                let pages = self.store.memory_of(frame.module)?.size_pages();
                self.stack.push(Value::I32(pages as i32))?;
            }
            Instr::MemoryGrow => {
                let delta = self.stack.pop_i32()? as u32;
                let prev = self.store.memory_of(frame.module)?.grow(delta).map_or(-1, |p| p as i32);
                self.stack.push(Value::I32(prev))?;
            }
            Instr::I32Const(v) => self.stack.push(Value::I32(*v))?,
            Instr::I64Const(v) => self.stack.push(Value::I64(*v))?,
            Instr::F32Const(bits) => self.stack.push(Value::F32(*bits))?,
            Instr::F64Const(bits) => self.stack.push(Value::F64(*bits))?,
            Instr::Numeric(op) => numeric::execute(&mut self.stack, *op)?,
            Instr::TruncSat(sub) => numeric::trunc_sat(&mut self.stack, *sub)?,
        }
        Ok(Flow::Next)
    }

    fn effective_address(&mut self, offset: u32) -> Result<u64, Trap> {
        let base = self.stack.pop_i32()? as u32;
        Ok(u64::from(base) + u64::from(offset))
    }

    fn load(&mut self, module: usize, op: u8, offset: u32) -> Result<(), Trap> {
        let ea = self.effective_address(offset)?;
        let mem = self.store.memory_of(module)?;
        let v = match op {
            0x28 /* i32.load */ => Value::I32(i32::from_le_bytes(mem.read(ea)?)),
            0x29 /* i64.load */ => Value::I64(i64::from_le_bytes(mem.read(ea)?)),
            0x2A /* f32.load */ => Value::F32(u32::from_le_bytes(mem.read(ea)?)),
            0x2B /* f64.load */ => Value::F64(u64::from_le_bytes(mem.read(ea)?)),
            0x2C /* i32.load8_s */ => Value::I32(i8::from_le_bytes(mem.read(ea)?) as i32),
            0x2D /* i32.load8_u */ => Value::I32(u8::from_le_bytes(mem.read(ea)?) as i32),
            0x2E /* i32.load16_s */ => Value::I32(i16::from_le_bytes(mem.read(ea)?) as i32),
            0x2F /* i32.load16_u */ => Value::I32(u16::from_le_bytes(mem.read(ea)?) as i32),
            0x30 /* i64.load8_s */ => Value::I64(i8::from_le_bytes(mem.read(ea)?) as i64),
            0x31 /* i64.load8_u */ => Value::I64(u8::from_le_bytes(mem.read(ea)?) as i64),
            0x32 /* i64.load16_s */ => Value::I64(i16::from_le_bytes(mem.read(ea)?) as i64),
            0x33 /* i64.load16_u */ => Value::I64(u16::from_le_bytes(mem.read(ea)?) as i64),
            0x34 /* i64.load32_s */ => Value::I64(i32::from_le_bytes(mem.read(ea)?) as i64),
            _ /* i64.load32_u */ => Value::I64(u32::from_le_bytes(mem.read(ea)?) as i64),
        };
        self.stack.push(v)
    }

    fn store_mem(&mut self, module: usize, op: u8, offset: u32) -> Result<(), Trap> {
        let value = self.stack.pop()?;
        let ea = self.effective_address(offset)?;
        let mem = self.store.memory_of(module)?;
        match (op, value) {
            (0x36 /* i32.store */, Value::I32(v)) => mem.write(ea, &v.to_le_bytes()),
            (0x37 /* i64.store */, Value::I64(v)) => mem.write(ea, &v.to_le_bytes()),
            (0x38 /* f32.store */, Value::F32(bits)) => mem.write(ea, &bits.to_le_bytes()),
            (0x39 /* f64.store */, Value::F64(bits)) => mem.write(ea, &bits.to_le_bytes()),
            (0x3A /* i32.store8 */, Value::I32(v)) => mem.write(ea, &[v as u8]),
            (0x3B /* i32.store16 */, Value::I32(v)) => mem.write(ea, &(v as u16).to_le_bytes()),
            (0x3C /* i64.store8 */, Value::I64(v)) => mem.write(ea, &[v as u8]),
            (0x3D /* i64.store16 */, Value::I64(v)) => mem.write(ea, &(v as u16).to_le_bytes()),
            (0x3E /* i64.store32 */, Value::I64(v)) => mem.write(ea, &(v as u32).to_le_bytes()),
            _ => Err(Trap::OperandTypeMismatch(stored_type(op))),
        }
    }
}

fn stored_type(op: u8) -> ValType {
    match op {
        0x36 | 0x3A | 0x3B => ValType::I32,
        0x38 => ValType::F32,
        0x39 => ValType::F64,
        _ => ValType::I64,
    }
}

fn set_local(frame: &mut Frame, idx: u32, v: Value) -> Result<(), Trap> {
    let slot = frame.locals.get_mut(idx as usize).ok_or(Trap::StackUnderflow)?;
    if slot.ty() != v.ty() {
        return Err(Trap::OperandTypeMismatch(slot.ty()));
    }
    *slot = v;
    Ok(())
}
