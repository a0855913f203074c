//! Host-side import resolution. Only function imports can be provided; a
//! module importing a table, memory or global fails to link.

pub mod func;

use std::collections::HashMap;

use tracing::info;

use crate::error::Trap;
use crate::model::{FuncType, Value};
pub use func::{HostFunc, HostFunction};

pub trait ImportResolver {
    /// Host function for `module.name`. The linker compares its signature
    /// against `ty` and rejects mismatches.
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<HostFunction>;
}

/// Name-keyed set of host functions.
#[derive(Debug, Clone, Default)]
pub struct HostImports {
    funcs: HashMap<(String, String), HostFunction>,
}

impl HostImports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(
        &mut self,
        module: &str,
        name: &str,
        ty: FuncType,
        f: impl Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync + 'static,
    ) -> &mut Self {
        self.funcs.insert((module.to_string(), name.to_string()), HostFunction::new(ty, f));
        self
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl ImportResolver for HostImports {
    fn resolve_func(&self, module: &str, name: &str, _ty: &FuncType) -> Option<HostFunction> {
        self.funcs.get(&(module.to_string(), name.to_string())).cloned()
    }
}

/// Resolves every function import to a stub that logs its arguments and
/// returns zero. Functions with more than one result cannot be stubbed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubImports;

impl ImportResolver for StubImports {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<HostFunction> {
        let result = match ty.results.as_slice() {
            [] => None,
            [t] => Some(Value::zero(*t)),
            _ => return None,
        };
        let label = format!("{module}.{name}");
        Some(HostFunction::new(ty.clone(), move |args| {
            info!(import = %label, ?args, "stub import called");
            Ok(result)
        }))
    }
}

/// Chain of resolvers; the first that knows an import wins.
impl<A: ImportResolver, B: ImportResolver> ImportResolver for (A, B) {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<HostFunction> {
        self.0.resolve_func(module, name, ty).or_else(|| self.1.resolve_func(module, name, ty))
    }
}
