//! Resolve-then-invoke dispatch.
//!
//! The callee is not known statically: guest code computes a table slot at run
//! time and hands it out through a named export. Dispatch therefore has two
//! legs on one execution environment:
//!
//! 1. direct call of the export, no arguments, one `u32` result (the slot);
//! 2. indirect call of that slot with one `u32` argument and no result.
//!
//! Each failure short-circuits. The environment is released by
//! [`ScopedExecEnv`]'s `Drop` on every path.

use std::fmt;

use tracing::{debug, debug_span, info, warn};

use crate::engine::{Callee, Engine, TableIndex};
use crate::error::DispatchError;
use crate::exec_env::ScopedExecEnv;

/// Progress of one dispatch attempt. Ordered by protocol step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Idle,
    ContextAcquired,
    ExportResolved,
    IndexObtained,
    Invoked,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Stage::Idle => "idle",
            Stage::ContextAcquired => "context acquired",
            Stage::ExportResolved => "export resolved",
            Stage::IndexObtained => "index obtained",
            Stage::Invoked => "invoked",
        };
        f.write_str(text)
    }
}

/// Run the full protocol against `instance`: acquire an execution
/// environment of `stack_size` bytes, call `export_name` to obtain a table
/// index, call that slot with `indirect_arg`, release.
pub fn dispatch<E: Engine>(
    engine: &mut E,
    instance: &E::Instance,
    stack_size: u32,
    export_name: &str,
    indirect_arg: u32,
) -> Result<(), DispatchError> {
    let span = debug_span!("dispatch", export = export_name, stack_size, arg = indirect_arg);
    let _enter = span.enter();

    let outcome = ScopedExecEnv::acquire(engine, instance, stack_size).and_then(|mut env| {
        let index = resolve_slot(&mut env, instance, export_name)?;
        call_slot(&mut env, instance, index, indirect_arg)
    });

    match &outcome {
        Ok(()) => info!("indirect call succeeded"),
        Err(err) => warn!(kind = %err.kind(), stage = %err.failed_at(), "dispatch failed: {err}"),
    }
    outcome
}

/// Look up `export_name` and call it with no arguments; its single `u32`
/// result is returned unchanged as the table index.
///
/// The index is not checked against the table here. Bounds and signature
/// checks belong to the engine when the slot is called.
pub fn resolve_slot<E: Engine>(
    env: &mut ScopedExecEnv<'_, E>,
    instance: &E::Instance,
    export_name: &str,
) -> Result<TableIndex, DispatchError> {
    let func = env
        .engine()
        .lookup_function(instance, export_name)
        .ok_or_else(|| DispatchError::ExportNotFound(export_name.to_string()))?;
    debug!(stage = %Stage::ExportResolved, "export resolved");

    let mut results = [0u32; 1];
    env.call(Callee::Export(&func), &[], &mut results)
        .map_err(|_| DispatchError::DirectCallTrapped(exception_message(env, instance)))?;

    let index = results[0];
    debug!(stage = %Stage::IndexObtained, index, "got function index from wasm");
    Ok(index)
}

/// Call the function in table slot `index` with the single argument `arg`.
pub fn call_slot<E: Engine>(
    env: &mut ScopedExecEnv<'_, E>,
    instance: &E::Instance,
    index: TableIndex,
    arg: u32,
) -> Result<(), DispatchError> {
    env.call(Callee::TableSlot(index), &[arg], &mut [])
        .map_err(|_| DispatchError::IndirectCallTrapped(exception_message(env, instance)))?;
    debug!(stage = %Stage::Invoked, index, "table slot invoked");
    Ok(())
}

fn exception_message<E: Engine>(env: &ScopedExecEnv<'_, E>, instance: &E::Instance) -> String {
    env.engine().exception(instance).unwrap_or_default()
}
