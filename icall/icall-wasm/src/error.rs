//! Error types for loading, linking and running modules.

use thiserror::Error;

use crate::model::{FuncType, ValType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Binary(#[from] crate::binary::BinaryReadError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown {space} {index}")]
    UnknownIndex { space: &'static str, index: u32 },

    #[error("duplicate export name `{0}`")]
    DuplicateExport(String),

    #[error("invalid limits ({context}): {detail}")]
    InvalidLimits { context: &'static str, detail: String },

    #[error("multiple {0} are not supported")]
    Multiple(&'static str),

    #[error("start function must have type () -> (), found {0}")]
    StartSignature(FuncType),

    #[error("invalid constant expression ({context}): {detail}")]
    ConstExpr { context: &'static str, detail: &'static str },

    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),

    #[error("invalid body of function {func} at instruction {at}: {detail}")]
    Body { func: u32, at: usize, detail: &'static str },

    #[error("function {func} has {count} locals, more than the limit of {limit}")]
    TooManyLocals { func: u32, count: u64, limit: u64 },
}

/// Failure of [`crate::Runtime::load`]: either the bytes do not decode or the
/// decoded module is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl From<crate::binary::BinaryReadError> for LoadError {
    fn from(e: crate::binary::BinaryReadError) -> Self {
        LoadError::Parse(e.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("unresolved import: {module}.{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("unsupported {kind} import: {module}.{name} (only function imports can be linked)")]
    UnsupportedImport { module: String, name: String, kind: &'static str },

    #[error("type mismatch ({context}): expected {expected}, found {found}")]
    TypeMismatch { context: &'static str, expected: String, found: String },

    #[error("element segment initialization out of bounds")]
    ElemOutOfBounds,

    #[error("data segment initialization out of bounds")]
    DataOutOfBounds,

    #[error("invalid constant expression: {0}")]
    ConstExpr(&'static str),

    #[error("trap while running start function: {0}")]
    StartTrap(#[source] Trap),
}

/// Failure of [`crate::Runtime::invoke`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("no exported function named `{0}`")]
    ExportNotFound(String),

    #[error(transparent)]
    Trap(#[from] Trap),
}

/// Runtime trap. The `Display` text is what the engine reports as the
/// exception message (prefixed with `Exception: `).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable")]
    Unreachable,

    #[error("out of bounds memory access")]
    MemoryOutOfBounds,

    #[error("undefined element: table index {index} is out of bounds (table size {size})")]
    UndefinedElement { index: u32, size: u32 },

    #[error("uninitialized element {0}")]
    UninitializedElement(u32),

    #[error("indirect call type mismatch: expected {expected}, found {found}")]
    IndirectCallTypeMismatch { expected: FuncType, found: FuncType },

    #[error("invalid function signature: expected {expected}, found {found}")]
    SignatureMismatch { expected: FuncType, found: FuncType },

    #[error("integer divide by zero")]
    IntegerDivideByZero,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("invalid conversion to integer")]
    InvalidConversion,

    #[error("wasm operand stack overflow")]
    StackOverflow,

    #[error("call stack exhausted")]
    CallStackExhausted,

    #[error("no table in module")]
    MissingTable,

    #[error("type mismatch: expected {0}")]
    OperandTypeMismatch(ValType),

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("module instance is not alive")]
    InstanceGone,

    #[error("host function failed: {0}")]
    Host(String),
}
