#![allow(dead_code)]
//! WAT guests and a runtime wired to a recording `env.record` import.

use std::sync::{Arc, Mutex};

use icall_wasm::{FuncType, HostImports, InstanceHandle, Runtime, RuntimeConfig, Value};

/// Table layout: slot 0 takes an i32 and ignores it, slot 1 forwards its
/// argument to `env.record`, slot 2 has the wrong signature, slot 3 is empty.
pub const GUEST: &str = r#"
(module
  (import "env" "record" (func $record (param i32)))
  (table 4 funcref)
  (elem (i32.const 0) $noop $callback $nullary)
  (global $index (mut i32) (i32.const 1))

  (func $noop (param i32))
  (func $callback (param i32)
    local.get 0
    call $record)
  (func $nullary (result i32)
    i32.const 0)

  (func (export "addr") (result i32) i32.const 1)
  (func (export "oob") (result i32) i32.const 999)
  (func (export "wrong_sig") (result i32) i32.const 2)
  (func (export "hole") (result i32) i32.const 3)
  (func (export "boom") (result i32) unreachable)
  (func (export "needs_arg") (param i32) (result i32) local.get 0)
  (func (export "set_index") (param i32)
    local.get 0
    global.set $index)
  (func (export "dynamic") (result i32) global.get $index)
)
"#;

/// The slot index lives in linear memory, placed there by a data segment.
pub const MEMORY_GUEST: &str = r#"
(module
  (import "env" "record" (func $record (param i32)))
  (memory 1)
  (data (i32.const 16) "\01\00\00\00")
  (table 2 funcref)
  (elem (i32.const 0) $noop $callback)

  (func $noop (param i32))
  (func $callback (param i32)
    (call $record (i32.add (local.get 0) (i32.load (i32.const 16)))))
  (func (export "addr") (result i32)
    (i32.load (i32.const 16)))
)
"#;

/// Slot 0 recurses without bound.
pub const RECURSIVE_GUEST: &str = r#"
(module
  (table 1 funcref)
  (elem (i32.const 0) $deep)
  (func $deep (param i32)
    (call $deep (i32.add (local.get 0) (i32.const 1))))
  (func (export "addr") (result i32) i32.const 0)
)
"#;

pub struct Guest {
    pub rt: Runtime,
    pub instance: InstanceHandle,
    calls: Arc<Mutex<Vec<u32>>>,
}

impl Guest {
    /// Arguments `env.record` has seen, in call order.
    pub fn recorded(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn recording_imports() -> (HostImports, Arc<Mutex<Vec<u32>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let mut imports = HostImports::new();
    imports.define("env", "record", FuncType::cells(1, 0), move |args| {
        if let Some(v) = args.first().and_then(Value::as_u32) {
            sink.lock().unwrap().push(v);
        }
        Ok(None)
    });
    (imports, calls)
}

pub fn guest_with(src: &str, config: RuntimeConfig) -> Guest {
    let (imports, calls) = recording_imports();
    let mut rt = Runtime::new(config).unwrap();
    let bytes = wat::parse_str(src).unwrap();
    let module = rt.load(&bytes).unwrap();
    let instance = rt.instantiate(&module, &imports).unwrap();
    Guest { rt, instance, calls }
}

pub fn guest(src: &str) -> Guest {
    guest_with(src, RuntimeConfig::default())
}
