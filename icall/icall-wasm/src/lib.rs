//! icall-wasm: a compact WebAssembly MVP interpreter that implements the
//! [`icall_core::Engine`] capabilities.
//!
//! The pipeline is [`parse`] → [`validate`] → compile (both wrapped by
//! [`Runtime::load`]) → [`Runtime::instantiate`]. Only function imports can
//! be linked, and each instance has at most one table and one memory.
//!
//! ```no_run
//! use icall_core::dispatch;
//! use icall_wasm::{Runtime, RuntimeConfig, StubImports};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("guest.wasm")?;
//! let mut rt = Runtime::new(RuntimeConfig::default())?;
//! let module = rt.load(&bytes)?;
//! let instance = rt.instantiate(&module, &StubImports)?;
//! dispatch(&mut rt, &instance, 8192, "get_callback_index", 42)?;
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod config;
pub mod error;
pub mod exec_env;
pub mod host;
pub mod model;
pub mod runtime;
pub mod validate;
pub mod vm;

pub use config::{ConfigError, RuntimeConfig};
pub use error::{InvokeError, LinkError, LoadError, ParseError, Trap, ValidationError};
pub use exec_env::{ExecEnv, StackBudget};
pub use host::{HostFunction, HostImports, ImportResolver, StubImports};
pub use model::{FuncType, Module, ValType, Value};
pub use runtime::{FunctionRef, InstanceHandle, LoadedModule, Runtime};

/// Decode a binary module.
pub fn parse(bytes: &[u8]) -> Result<Module, ParseError> {
    Ok(binary::sections::parse_module_from_bytes(bytes)?)
}

/// Check a decoded module's index spaces, limits, exports and segments.
/// Function bodies are checked when they are compiled.
pub fn validate(m: &Module) -> Result<(), ValidationError> {
    validate::validate_module(m)
}
