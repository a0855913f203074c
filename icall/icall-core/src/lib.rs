#![doc = r#"
icall-core: indirect-call dispatch through a WebAssembly function table.

A guest module publishes a callback by exporting a zero-argument function that
returns a slot in its indirect function table. The host calls that export, then
calls whatever the slot holds with a single `u32` argument.

This crate provides:
- `Engine`: the capability surface consumed from an execution engine
- `ScopedExecEnv`: scoped execution-context acquisition, released on drop
- `dispatch`, `resolve_slot`, `call_slot`: the resolve-then-invoke protocol
- `DispatchError` / `FailureKind`: the failure taxonomy

The crate has no engine of its own; `icall-wasm` provides one.
"#]

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod exec_env;

pub use dispatch::{call_slot, dispatch, resolve_slot, Stage};
pub use engine::{Callee, Engine, ExceptionRaised, TableIndex};
pub use error::{DispatchError, FailureKind};
pub use exec_env::ScopedExecEnv;
