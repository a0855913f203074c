//! Operand stack with a byte budget shared with the frames above it.

use crate::error::Trap;
use crate::exec_env::{StackBudget, SLOT_BYTES};
use crate::model::{ValType, Value};

#[derive(Debug)]
pub struct ValueStack {
    values: Vec<Value>,
    capacity: usize,
    /// Bytes held by active frames.
    reserved: usize,
}

impl ValueStack {
    pub fn new(budget: StackBudget) -> Self {
        Self { values: Vec::new(), capacity: budget.bytes, reserved: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn used(&self) -> usize {
        self.values.len() * SLOT_BYTES + self.reserved
    }

    #[inline]
    pub fn push(&mut self, v: Value) -> Result<(), Trap> {
        if self.used() + SLOT_BYTES > self.capacity {
            return Err(Trap::StackOverflow);
        }
        self.values.push(v);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, Trap> {
        self.values.pop().ok_or(Trap::StackUnderflow)
    }

    pub fn pop_i32(&mut self) -> Result<i32, Trap> {
        match self.pop()? {
            Value::I32(v) => Ok(v),
            _ => Err(Trap::OperandTypeMismatch(ValType::I32)),
        }
    }

    pub fn pop_i64(&mut self) -> Result<i64, Trap> {
        match self.pop()? {
            Value::I64(v) => Ok(v),
            _ => Err(Trap::OperandTypeMismatch(ValType::I64)),
        }
    }

    pub fn pop_f32(&mut self) -> Result<f32, Trap> {
        match self.pop()? {
            Value::F32(bits) => Ok(f32::from_bits(bits)),
            _ => Err(Trap::OperandTypeMismatch(ValType::F32)),
        }
    }

    pub fn pop_f64(&mut self) -> Result<f64, Trap> {
        match self.pop()? {
            Value::F64(bits) => Ok(f64::from_bits(bits)),
            _ => Err(Trap::OperandTypeMismatch(ValType::F64)),
        }
    }

    /// Pop `n` values, returned in push order.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, Trap> {
        let at = self.values.len().checked_sub(n).ok_or(Trap::StackUnderflow)?;
        Ok(self.values.split_off(at))
    }

    /// Pop `n` values checked against `types`, returned in push order.
    pub fn pop_typed(&mut self, types: &[ValType]) -> Result<Vec<Value>, Trap> {
        let values = self.pop_n(types.len())?;
        if let Some((_, &want)) = values.iter().zip(types).find(|(v, t)| v.ty() != **t) {
            return Err(Trap::OperandTypeMismatch(want));
        }
        Ok(values)
    }

    /// Keep the top `keep` values, drop everything between them and `height`.
    pub fn unwind(&mut self, height: usize, keep: usize) -> Result<(), Trap> {
        let top = self.values.len().checked_sub(keep).ok_or(Trap::StackUnderflow)?;
        if height > top {
            return Err(Trap::StackUnderflow);
        }
        self.values.drain(height..top);
        Ok(())
    }

    pub fn reserve(&mut self, bytes: usize) -> Result<(), Trap> {
        if self.used() + bytes > self.capacity {
            return Err(Trap::StackOverflow);
        }
        self.reserved += bytes;
        Ok(())
    }

    pub fn release(&mut self, bytes: usize) {
        self.reserved = self.reserved.saturating_sub(bytes);
    }
}
