//! Execution environments and the stack budget they grant.
//!
//! An [`ExecEnv`] is the per-call context handed out by
//! [`crate::Runtime`]. Its byte size becomes a [`StackBudget`]: every operand
//! slot costs [`SLOT_BYTES`], and every active wasm frame costs
//! [`FRAME_OVERHEAD`] plus one slot per parameter and local. Exceeding the
//! budget traps with `wasm operand stack overflow`.

use crate::runtime::InstanceHandle;

pub const SLOT_BYTES: usize = 8;
pub const FRAME_OVERHEAD: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBudget {
    pub bytes: usize,
    pub max_call_depth: usize,
}

impl StackBudget {
    pub fn new(stack_size: u32, max_call_depth: u32) -> Self {
        Self { bytes: stack_size as usize, max_call_depth: max_call_depth as usize }
    }

    /// Bytes charged for a frame with `slots` parameters and locals.
    pub fn frame_cost(slots: usize) -> usize {
        FRAME_OVERHEAD + slots * SLOT_BYTES
    }
}

/// Execution context bound to one module instance. Not `Clone`: the runtime
/// takes it back by value when it is destroyed.
#[derive(Debug)]
pub struct ExecEnv {
    id: u64,
    instance: InstanceHandle,
    stack_size: u32,
}

impl ExecEnv {
    pub(crate) fn new(id: u64, instance: InstanceHandle, stack_size: u32) -> Self {
        Self { id, instance, stack_size }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    pub fn budget(&self, max_call_depth: u32) -> StackBudget {
        StackBudget::new(self.stack_size, max_call_depth)
    }
}
