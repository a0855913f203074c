mod common;

use common::{Event, Export, Instance, RecordingEngine, Slot};
use icall_core::{call_slot, dispatch, resolve_slot, DispatchError, FailureKind, ScopedExecEnv, Stage};

const INSTANCE: Instance = Instance(0);

// addr -> 1, slot 1 takes (u32) -> ().
#[test]
fn golden_success_path_event_order() {
    let mut engine = RecordingEngine::canonical(1);
    dispatch(&mut engine, &INSTANCE, 8192, "addr", 42).unwrap();

    assert_eq!(
        engine.events(),
        vec![
            Event::Create { stack_size: 8192, granted: Some(1) },
            Event::Lookup("addr".into()),
            Event::CallExport { env: 1, name: "addr".into() },
            Event::CallSlot { env: 1, index: 1, args: vec![42] },
            Event::Destroy(1),
        ]
    );
    assert_eq!(engine.live_contexts(), 0);
}

#[test]
fn missing_export_skips_both_calls() {
    let mut engine = RecordingEngine::canonical(1);
    engine.exports.clear();

    let err = dispatch(&mut engine, &INSTANCE, 8192, "addr", 42).unwrap_err();
    assert_eq!(err, DispatchError::ExportNotFound("addr".into()));
    assert_eq!(err.failed_at(), Stage::ContextAcquired);
    assert_eq!(engine.export_calls(), 0);
    assert!(engine.slot_calls().is_empty());
    assert_eq!((engine.creates(), engine.destroys()), (1, 1));
}

#[test]
fn out_of_bounds_index_surfaces_engine_message() {
    let mut engine = RecordingEngine::canonical(999);

    let err = dispatch(&mut engine, &INSTANCE, 8192, "addr", 42).unwrap_err();
    assert_eq!(err.kind(), FailureKind::IndirectCallTrapped);
    let msg = err.engine_message().unwrap();
    assert!(msg.contains("out of bounds"), "unexpected message: {msg}");
    assert_eq!(engine.slot_calls(), vec![(999, vec![42])]);
    assert_eq!(engine.live_contexts(), 0);
}

#[test]
fn refused_context_stops_before_lookup() {
    for stack_size in [0, 1, 1023] {
        let mut engine = RecordingEngine::canonical(1);
        let err = dispatch(&mut engine, &INSTANCE, stack_size, "addr", 42).unwrap_err();
        assert_eq!(err, DispatchError::ContextCreationFailed { stack_size });
        assert_eq!(err.failed_at(), Stage::Idle);
        assert_eq!(engine.events(), vec![Event::Create { stack_size, granted: None }]);
        assert_eq!(engine.destroys(), 0);
    }
}

// Slot holds a function with another signature.
#[test]
fn signature_mismatch_in_slot() {
    let mut engine = RecordingEngine::canonical(1);
    engine.table[1] = Some(Slot::WrongSignature);

    let err = dispatch(&mut engine, &INSTANCE, 8192, "addr", 42).unwrap_err();
    assert_eq!(err.kind(), FailureKind::IndirectCallTrapped);
    assert!(err.engine_message().unwrap().contains("type mismatch"));
    assert_eq!((engine.creates(), engine.destroys()), (1, 1));
}

#[test]
fn trapping_resolver_never_reaches_table() {
    let mut engine = RecordingEngine::canonical(1);
    engine.exports.insert("addr".into(), Export::Traps("unreachable"));

    let err = dispatch(&mut engine, &INSTANCE, 8192, "addr", 42).unwrap_err();
    assert_eq!(err, DispatchError::DirectCallTrapped("Exception: unreachable".into()));
    assert!(engine.slot_calls().is_empty());
    assert_eq!(engine.live_contexts(), 0);
}

#[test]
fn trap_inside_callee_is_indirect_failure() {
    let mut engine = RecordingEngine::canonical(0);
    engine.table[0] = Some(Slot::Traps("integer divide by zero"));

    let err = dispatch(&mut engine, &INSTANCE, 8192, "addr", 7).unwrap_err();
    assert_eq!(err, DispatchError::IndirectCallTrapped("Exception: integer divide by zero".into()));
}

#[test]
fn uninitialized_slot_is_indirect_failure() {
    let mut engine = RecordingEngine::canonical(1);
    engine.table[1] = None;

    let err = dispatch(&mut engine, &INSTANCE, 8192, "addr", 7).unwrap_err();
    assert_eq!(err.engine_message(), Some("Exception: uninitialized element 1"));
}

#[test]
fn missing_exception_message_becomes_empty_string() {
    let mut engine = RecordingEngine::canonical(5);
    engine.suppress_messages = true;

    let err = dispatch(&mut engine, &INSTANCE, 8192, "addr", 1).unwrap_err();
    assert_eq!(err, DispatchError::IndirectCallTrapped(String::new()));
}

#[test]
fn other_export_names_are_resolved_verbatim() {
    let mut engine = RecordingEngine::canonical(1);
    engine.exports.insert("on_tick".into(), Export::Returns(0));

    dispatch(&mut engine, &INSTANCE, 4096, "on_tick", 3).unwrap();
    assert_eq!(engine.slot_calls(), vec![(0, vec![3])]);

    let err = dispatch(&mut engine, &INSTANCE, 4096, "ADDR", 3).unwrap_err();
    assert_eq!(err, DispatchError::ExportNotFound("ADDR".into()));
}

#[test]
fn split_legs_share_one_context() {
    let mut engine = RecordingEngine::canonical(1);
    {
        let mut env = ScopedExecEnv::acquire(&mut engine, &INSTANCE, 2048).unwrap();
        let index = resolve_slot(&mut env, &INSTANCE, "addr").unwrap();
        assert_eq!(index, 1);
        call_slot(&mut env, &INSTANCE, index, 10).unwrap();
        call_slot(&mut env, &INSTANCE, 0, 11).unwrap();
    }
    let envs: Vec<u64> = engine
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::CallExport { env, .. } | Event::CallSlot { env, .. } => Some(*env),
            _ => None,
        })
        .collect();
    assert_eq!(envs, vec![1, 1, 1]);
    assert_eq!((engine.creates(), engine.destroys()), (1, 1));
}

#[test]
fn explicit_release_destroys_immediately() {
    let mut engine = RecordingEngine::canonical(1);
    let env = ScopedExecEnv::acquire(&mut engine, &INSTANCE, 2048).unwrap();
    env.release();
    assert_eq!(engine.events().last(), Some(&Event::Destroy(1)));
    assert_eq!(engine.live_contexts(), 0);
}

#[test]
fn every_dispatch_gets_a_fresh_context() {
    let mut engine = RecordingEngine::canonical(1);
    for _ in 0..3 {
        dispatch(&mut engine, &INSTANCE, 8192, "addr", 1).unwrap();
    }
    let granted: Vec<u64> = engine
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Create { granted: Some(id), .. } => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(granted, vec![1, 2, 3]);
}
