use std::sync::Arc;

use crate::error::Trap;
use crate::model::{FuncType, Value};

/// Host callable. At most one result value.
pub type HostFunc = dyn Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync;

/// A host function together with the signature it implements.
#[derive(Clone)]
pub struct HostFunction {
    pub ty: FuncType,
    pub f: Arc<HostFunc>,
}

impl HostFunction {
    pub fn new(ty: FuncType, f: impl Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync + 'static) -> Self {
        Self { ty, f: Arc::new(f) }
    }
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction").field("ty", &self.ty).finish_non_exhaustive()
    }
}
