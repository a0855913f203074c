use crate::error::Trap;
use crate::model::{GlobalType, Value};

#[derive(Debug, Clone)]
pub struct GlobalInstance {
    ty: GlobalType,
    val: Value,
}

impl GlobalInstance {
    pub fn new(ty: GlobalType, init: Value) -> Self {
        Self { ty, val: init }
    }

    pub fn get(&self) -> Value {
        self.val
    }

    /// Mutability is checked when bodies are compiled; the value type is checked here.
    pub fn set(&mut self, v: Value) -> Result<(), Trap> {
        if v.ty() != self.ty.val_type {
            return Err(Trap::OperandTypeMismatch(self.ty.val_type));
        }
        self.val = v;
        Ok(())
    }

    pub fn ty(&self) -> GlobalType {
        self.ty
    }
}
