// Allow doc-style comments in proptest blocks
#![allow(unused_doc_comments)]
mod common;

use common::{guest, guest_with, GUEST, MEMORY_GUEST, RECURSIVE_GUEST};
use icall_core::{dispatch, resolve_slot, DispatchError, Engine, FailureKind, ScopedExecEnv};
use icall_wasm::{ConfigError, Runtime, RuntimeConfig, Value};
use proptest::prelude::*;

#[test]
fn slot_receives_the_argument() {
    let mut g = guest(GUEST);
    dispatch(&mut g.rt, &g.instance, 8192, "addr", 42).unwrap();
    assert_eq!(g.recorded(), vec![42]);
    assert_eq!(g.rt.live_exec_envs(), 0);
    assert_eq!(g.rt.exception(&g.instance), None);
}

#[test]
fn missing_export() {
    let mut g = guest(GUEST);
    let err = dispatch(&mut g.rt, &g.instance, 8192, "missing", 42).unwrap_err();
    assert_eq!(err, DispatchError::ExportNotFound("missing".into()));
    assert_eq!(g.rt.live_exec_envs(), 0);
    assert!(g.recorded().is_empty());
}

#[test]
fn index_past_the_table_end() {
    let mut g = guest(GUEST);
    let err = dispatch(&mut g.rt, &g.instance, 8192, "oob", 42).unwrap_err();
    assert_eq!(
        err,
        DispatchError::IndirectCallTrapped(
            "Exception: undefined element: table index 999 is out of bounds (table size 4)".into()
        )
    );
    assert!(err.engine_message().unwrap().contains("out of bounds"));
    assert_eq!(g.rt.live_exec_envs(), 0);
}

#[test]
fn stack_size_below_minimum() {
    let mut g = guest(GUEST);
    for stack_size in [0, 1, 255] {
        let err = dispatch(&mut g.rt, &g.instance, stack_size, "addr", 42).unwrap_err();
        assert_eq!(err, DispatchError::ContextCreationFailed { stack_size });
    }
    let too_big = g.rt.config().max_stack_size + 1;
    let err = dispatch(&mut g.rt, &g.instance, too_big, "addr", 42).unwrap_err();
    assert_eq!(err.kind(), FailureKind::ContextCreationFailed);
    assert_eq!(g.rt.live_exec_envs(), 0);
    assert!(g.recorded().is_empty());
}

#[test]
fn zero_stack_size_is_refused_under_any_bounds() {
    let cfg = RuntimeConfig::default().with_min_stack_size(0);
    assert_eq!(Runtime::new(cfg).err(), Some(ConfigError::ZeroStackSize));

    let mut g = guest_with(GUEST, RuntimeConfig::default().with_min_stack_size(1));
    let err = dispatch(&mut g.rt, &g.instance, 0, "addr", 42).unwrap_err();
    assert_eq!(err, DispatchError::ContextCreationFailed { stack_size: 0 });
    assert_eq!(g.rt.live_exec_envs(), 0);
    assert!(g.recorded().is_empty());
}

#[test]
fn slot_with_the_wrong_signature() {
    let mut g = guest(GUEST);
    let err = dispatch(&mut g.rt, &g.instance, 8192, "wrong_sig", 42).unwrap_err();
    assert_eq!(err.kind(), FailureKind::IndirectCallTrapped);
    assert_eq!(
        err.engine_message(),
        Some("Exception: indirect call type mismatch: expected (i32) -> (), found () -> (i32)")
    );
}

#[test]
fn empty_slot() {
    let mut g = guest(GUEST);
    let err = dispatch(&mut g.rt, &g.instance, 8192, "hole", 42).unwrap_err();
    assert_eq!(err, DispatchError::IndirectCallTrapped("Exception: uninitialized element 3".into()));
}

#[test]
fn resolver_export_traps() {
    let mut g = guest(GUEST);
    let err = dispatch(&mut g.rt, &g.instance, 8192, "boom", 42).unwrap_err();
    assert_eq!(err, DispatchError::DirectCallTrapped("Exception: unreachable".into()));
    assert!(g.recorded().is_empty());
    assert_eq!(g.rt.live_exec_envs(), 0);
}

#[test]
fn resolver_export_with_parameters_is_rejected() {
    let mut g = guest(GUEST);
    let err = dispatch(&mut g.rt, &g.instance, 8192, "needs_arg", 42).unwrap_err();
    assert_eq!(err.kind(), FailureKind::DirectCallTrapped);
    let msg = err.engine_message().unwrap();
    assert!(msg.starts_with("Exception: invalid function signature"), "unexpected message: {msg}");
}

#[test]
fn exception_is_cleared_by_the_next_call() {
    let mut g = guest(GUEST);
    dispatch(&mut g.rt, &g.instance, 8192, "oob", 1).unwrap_err();
    assert!(g.rt.exception(&g.instance).is_some());
    dispatch(&mut g.rt, &g.instance, 8192, "addr", 2).unwrap();
    assert_eq!(g.rt.exception(&g.instance), None);
    assert_eq!(g.recorded(), vec![2]);
}

#[test]
fn failures_repeat_identically() {
    let mut g = guest(GUEST);
    for export in ["missing", "oob", "wrong_sig", "hole", "boom"] {
        let first = dispatch(&mut g.rt, &g.instance, 8192, export, 7).unwrap_err();
        let second = dispatch(&mut g.rt, &g.instance, 8192, export, 7).unwrap_err();
        assert_eq!(first, second, "export {export}");
    }
    assert_eq!(g.rt.live_exec_envs(), 0);
}

#[test]
fn index_read_from_linear_memory() {
    let mut g = guest(MEMORY_GUEST);
    dispatch(&mut g.rt, &g.instance, 8192, "addr", 42).unwrap();
    assert_eq!(g.recorded(), vec![43]);
    assert_eq!(&g.rt.memory(g.instance).unwrap()[16..20], &[1, 0, 0, 0]);
}

#[test]
fn runaway_recursion_exhausts_the_stack_budget() {
    let mut g = guest(RECURSIVE_GUEST);
    let err = dispatch(&mut g.rt, &g.instance, 8192, "addr", 0).unwrap_err();
    assert_eq!(err, DispatchError::IndirectCallTrapped("Exception: wasm operand stack overflow".into()));
    assert_eq!(g.rt.live_exec_envs(), 0);
}

#[test]
fn runaway_recursion_hits_the_call_depth_limit() {
    let config = RuntimeConfig::default().with_max_call_depth(64);
    let mut g = guest_with(RECURSIVE_GUEST, config);
    let err = dispatch(&mut g.rt, &g.instance, 1 << 20, "addr", 0).unwrap_err();
    assert_eq!(err, DispatchError::IndirectCallTrapped("Exception: call stack exhausted".into()));
}

#[test]
fn dead_instance_refuses_contexts() {
    let mut g = guest(GUEST);
    assert!(g.rt.deinstantiate(g.instance));
    let err = dispatch(&mut g.rt, &g.instance, 8192, "addr", 42).unwrap_err();
    assert_eq!(err, DispatchError::ContextCreationFailed { stack_size: 8192 });
    assert_eq!(g.rt.live_exec_envs(), 0);
}

#[test]
fn deinstantiating_under_a_live_context() {
    let mut g = guest(GUEST);
    let instance = g.instance;
    let mut env = ScopedExecEnv::acquire(&mut g.rt, &instance, 8192).unwrap();
    assert_eq!(resolve_slot(&mut env, &instance, "addr"), Ok(1));
    env.release();
    assert_eq!(g.rt.live_exec_envs(), 0);

    let mut env = g.rt.create_exec_env(&instance, 8192).unwrap();
    g.rt.deinstantiate(instance);
    let f = g.rt.lookup_function(&instance, "addr");
    assert!(f.is_none());
    let mut out = [0u32];
    assert!(g.rt.call(&mut env, icall_core::Callee::TableSlot(1), &[5], &mut out).is_err());
    assert_eq!(g.rt.exception(&instance).as_deref(), Some("Exception: module instance is not alive"));
    g.rt.destroy_exec_env(env);
    assert_eq!(g.rt.live_exec_envs(), 0);
}

#[test]
fn stale_function_does_not_reach_a_later_instance() {
    let mut g = guest(GUEST);
    let old = g.instance;
    let stale = g.rt.lookup_function(&old, "addr").unwrap();
    g.rt.deinstantiate(old);

    let bytes = wat::parse_str(GUEST).unwrap();
    let module = g.rt.load(&bytes).unwrap();
    let (imports, _) = common::recording_imports();
    let fresh = g.rt.instantiate(&module, &imports).unwrap();

    let mut env = g.rt.create_exec_env(&fresh, 8192).unwrap();
    let mut out = [0u32];
    assert!(g.rt.call(&mut env, icall_core::Callee::Export(&stale), &[], &mut out).is_err());
    assert_eq!(g.rt.exception(&fresh).as_deref(), Some("Exception: module instance is not alive"));
    g.rt.destroy_exec_env(env);
    dispatch(&mut g.rt, &fresh, 8192, "addr", 3).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The slot sees exactly the argument handed to dispatch.
    #[test]
    fn argument_is_forwarded_untouched(arg in any::<u32>()) {
        let mut g = guest(GUEST);
        dispatch(&mut g.rt, &g.instance, 8192, "addr", arg).unwrap();
        prop_assert_eq!(g.recorded(), vec![arg]);
    }

    /// The index the guest computes is the one the engine is asked to call.
    #[test]
    fn computed_index_is_used_verbatim(index in prop_oneof![0u32..8, any::<u32>()]) {
        let mut g = guest(GUEST);
        g.rt.invoke(g.instance, "set_index", &[Value::from(index)]).unwrap();
        let outcome = dispatch(&mut g.rt, &g.instance, 8192, "dynamic", 9);
        match index {
            0 => prop_assert!(outcome.is_ok()),
            1 => {
                prop_assert!(outcome.is_ok());
                prop_assert_eq!(g.recorded(), vec![9]);
            }
            2 => prop_assert!(outcome.unwrap_err().engine_message().unwrap().contains("type mismatch")),
            3 => prop_assert!(outcome.unwrap_err().engine_message().unwrap().contains("uninitialized element 3")),
            _ => {
                let err = outcome.unwrap_err();
                let expected = format!("table index {index} is out of bounds");
                prop_assert!(err.engine_message().unwrap().contains(&expected));
            }
        }
        prop_assert_eq!(g.rt.live_exec_envs(), 0);
    }
}
