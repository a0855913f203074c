//! Execution: body compilation, the operand stack and the interpreter loop.

pub mod code;
pub mod interpreter;
mod numeric;
pub mod stack;

pub use code::{compile_module, Body, Instr};
pub use interpreter::invoke;
pub use stack::ValueStack;
