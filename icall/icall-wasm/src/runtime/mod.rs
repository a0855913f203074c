//! Store, instances and the [`Runtime`] that ties them to the dispatch
//! protocol.

pub mod engine;
pub mod global;
pub mod instance;
pub mod instantiate;
pub mod memory;
pub mod store;
pub mod table;

use std::sync::Arc;

pub use engine::{FunctionRef, Runtime};
pub use global::GlobalInstance;
pub use instance::{FuncInstance, ModuleInstance, RuntimeExportDesc};
pub use instantiate::instantiate;
pub use memory::{MemoryInstance, PAGE_SIZE};
pub use store::Store;
pub use table::TableInstance;

use crate::error::LoadError;
use crate::model::Module;
use crate::vm::code::{compile_module, Body};

/// Index of a module instance in its [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub usize);

/// A decoded, validated and compiled module, ready to be instantiated any
/// number of times.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    module: Arc<Module>,
    bodies: Vec<Arc<Body>>,
}

impl LoadedModule {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let module = crate::parse(bytes)?;
        crate::validate(&module)?;
        let bodies = compile_module(&module)?;
        Ok(Self { module: Arc::new(module), bodies })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub(crate) fn module_arc(&self) -> Arc<Module> {
        Arc::clone(&self.module)
    }

    pub(crate) fn bodies(&self) -> &[Arc<Body>] {
        &self.bodies
    }

    /// Names of the exported functions, in declaration order.
    pub fn function_exports(&self) -> impl Iterator<Item = &str> {
        self.module
            .exports
            .iter()
            .filter(|e| matches!(e.desc, crate::model::ExportDesc::Func(_)))
            .map(|e| e.name.as_str())
    }
}
