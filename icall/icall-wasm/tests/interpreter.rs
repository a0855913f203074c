use icall_wasm::{FuncType, HostImports, InstanceHandle, InvokeError, Runtime, RuntimeConfig, Trap, Value};

const PROGRAMS: &str = r#"
(module
  (import "env" "twice" (func $twice (param i32) (result i32)))
  (type $ret (func (result i32)))
  (memory 1 2)
  (table 2 funcref)
  (elem (i32.const 0) $hundred $ident)
  (global $counter (mut i32) (i32.const 10))

  (func $hundred (result i32) i32.const 100)
  (func $ident (param i32) (result i32) local.get 0)

  (func (export "add") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    i32.add)

  (func (export "fac") (param i64) (result i64) (local i64)
    i64.const 1
    local.set 1
    block
      loop
        local.get 0
        i64.eqz
        br_if 1
        local.get 1
        local.get 0
        i64.mul
        local.set 1
        local.get 0
        i64.const 1
        i64.sub
        local.set 0
        br 0
      end
    end
    local.get 1)

  (func $fib (export "fib") (param i32) (result i32)
    (if (result i32) (i32.lt_u (local.get 0) (i32.const 2))
      (then (local.get 0))
      (else
        (i32.add
          (call $fib (i32.sub (local.get 0) (i32.const 1)))
          (call $fib (i32.sub (local.get 0) (i32.const 2)))))))

  (func (export "classify") (param i32) (result i32)
    block
      block
        block
          local.get 0
          br_table 0 1 2
        end
        i32.const 10
        return
      end
      i32.const 11
      return
    end
    i32.const 12)

  (func (export "pick") (param i32) (result i32)
    (block (result i32)
      i32.const 5
      local.get 0
      br_if 0
      drop
      i32.const 7))

  (func (export "sign") (param i32) (result i32)
    (if (result i32) (i32.lt_s (local.get 0) (i32.const 0))
      (then (i32.const -1))
      (else (i32.const 1))))

  (func (export "bytes") (result i32)
    (i32.store (i32.const 8) (i32.const 0x01020304))
    (i32.load8_u (i32.const 9)))

  (func (export "grow") (result i32)
    (memory.grow (i32.const 1)))

  (func (export "size") (result i32)
    memory.size)

  (func (export "load_oob") (result i32)
    (i32.load (i32.const 65534)))

  (func (export "div") (param i32 i32) (result i32)
    (i32.div_s (local.get 0) (local.get 1)))

  (func (export "bump") (result i32)
    (global.set $counter (i32.add (global.get $counter) (i32.const 1)))
    global.get $counter)

  (func (export "indirect") (param i32) (result i32)
    (call_indirect (type $ret) (local.get 0)))

  (func (export "host") (param i32) (result i32)
    (i32.add (call $twice (local.get 0)) (i32.const 1)))

  (func (export "sqrt") (param f64) (result f64)
    (f64.sqrt (local.get 0)))

  (func (export "trunc") (param f32) (result i32)
    (i32.trunc_f32_s (local.get 0)))
)
"#;

fn setup() -> (Runtime, InstanceHandle) {
    let mut imports = HostImports::new();
    imports.define("env", "twice", FuncType::cells(1, 1), |args| {
        Ok(args[0].as_u32().map(|v| Value::from(v.wrapping_mul(2))))
    });
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let module = rt.load(&wat::parse_str(PROGRAMS).unwrap()).unwrap();
    let instance = rt.instantiate(&module, &imports).unwrap();
    (rt, instance)
}

fn call(rt: &mut Runtime, instance: InstanceHandle, name: &str, args: &[Value]) -> Result<Vec<Value>, InvokeError> {
    rt.invoke(instance, name, args)
}

fn i32s(rt: &mut Runtime, instance: InstanceHandle, name: &str, args: &[i32]) -> Result<i32, InvokeError> {
    let args: Vec<Value> = args.iter().map(|&a| Value::I32(a)).collect();
    match call(rt, instance, name, &args)?.as_slice() {
        [Value::I32(v)] => Ok(*v),
        other => panic!("{name} returned {other:?}"),
    }
}

#[test]
fn arithmetic_and_locals() {
    let (mut rt, inst) = setup();
    assert_eq!(i32s(&mut rt, inst, "add", &[2, 40]), Ok(42));
    assert_eq!(i32s(&mut rt, inst, "add", &[i32::MAX, 1]), Ok(i32::MIN));
    assert_eq!(call(&mut rt, inst, "fac", &[Value::I64(20)]), Ok(vec![Value::I64(2_432_902_008_176_640_000)]));
    assert_eq!(call(&mut rt, inst, "fac", &[Value::I64(0)]), Ok(vec![Value::I64(1)]));
}

#[test]
fn recursion() {
    let (mut rt, inst) = setup();
    assert_eq!(i32s(&mut rt, inst, "fib", &[15]), Ok(610));
    assert_eq!(i32s(&mut rt, inst, "fib", &[1]), Ok(1));
}

#[test]
fn branches() {
    let (mut rt, inst) = setup();
    for (arg, want) in [(0, 10), (1, 11), (2, 12), (7, 12), (-1, 12)] {
        assert_eq!(i32s(&mut rt, inst, "classify", &[arg]), Ok(want), "classify({arg})");
    }
    assert_eq!(i32s(&mut rt, inst, "pick", &[1]), Ok(5));
    assert_eq!(i32s(&mut rt, inst, "pick", &[0]), Ok(7));
    assert_eq!(i32s(&mut rt, inst, "sign", &[-9]), Ok(-1));
    assert_eq!(i32s(&mut rt, inst, "sign", &[0]), Ok(1));
}

#[test]
fn linear_memory() {
    let (mut rt, inst) = setup();
    assert_eq!(i32s(&mut rt, inst, "bytes", &[]), Ok(3));
    assert_eq!(rt.memory(inst).unwrap()[8..12], [4, 3, 2, 1]);
    assert_eq!(i32s(&mut rt, inst, "size", &[]), Ok(1));
    assert_eq!(i32s(&mut rt, inst, "grow", &[]), Ok(1));
    assert_eq!(i32s(&mut rt, inst, "grow", &[]), Ok(-1));
    assert_eq!(i32s(&mut rt, inst, "size", &[]), Ok(2));
    assert_eq!(i32s(&mut rt, inst, "load_oob", &[]), Ok(0));
}

#[test]
fn out_of_bounds_load_traps() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let src = r#"(module (memory 1) (func (export "f") (result i32) (i32.load (i32.const 65534))))"#;
    let module = rt.load(&wat::parse_str(src).unwrap()).unwrap();
    let inst = rt.instantiate(&module, &icall_wasm::StubImports).unwrap();
    assert_eq!(rt.invoke(inst, "f", &[]), Err(InvokeError::Trap(Trap::MemoryOutOfBounds)));
    assert_eq!(
        icall_core::Engine::exception(&rt, &inst).as_deref(),
        Some("Exception: out of bounds memory access")
    );
}

#[test]
fn integer_traps() {
    let (mut rt, inst) = setup();
    assert_eq!(i32s(&mut rt, inst, "div", &[7, 2]), Ok(3));
    assert_eq!(i32s(&mut rt, inst, "div", &[7, 0]), Err(InvokeError::Trap(Trap::IntegerDivideByZero)));
    assert_eq!(i32s(&mut rt, inst, "div", &[i32::MIN, -1]), Err(InvokeError::Trap(Trap::IntegerOverflow)));
}

#[test]
fn globals_persist_between_calls() {
    let (mut rt, inst) = setup();
    assert_eq!(i32s(&mut rt, inst, "bump", &[]), Ok(11));
    assert_eq!(i32s(&mut rt, inst, "bump", &[]), Ok(12));
}

#[test]
fn call_indirect_checks_signatures_structurally() {
    let (mut rt, inst) = setup();
    assert_eq!(i32s(&mut rt, inst, "indirect", &[0]), Ok(100));
    assert_eq!(
        i32s(&mut rt, inst, "indirect", &[1]),
        Err(InvokeError::Trap(Trap::IndirectCallTypeMismatch {
            expected: FuncType::cells(0, 1),
            found: FuncType::cells(1, 1),
        }))
    );
    assert_eq!(
        i32s(&mut rt, inst, "indirect", &[5]),
        Err(InvokeError::Trap(Trap::UndefinedElement { index: 5, size: 2 }))
    );
}

#[test]
fn host_functions_return_values() {
    let (mut rt, inst) = setup();
    assert_eq!(i32s(&mut rt, inst, "host", &[20]), Ok(41));
}

#[test]
fn floats() {
    let (mut rt, inst) = setup();
    assert_eq!(
        call(&mut rt, inst, "sqrt", &[Value::F64(16.0f64.to_bits())]),
        Ok(vec![Value::F64(4.0f64.to_bits())])
    );
    assert_eq!(call(&mut rt, inst, "trunc", &[Value::F32((-3.7f32).to_bits())]), Ok(vec![Value::I32(-3)]));
    assert_eq!(
        call(&mut rt, inst, "trunc", &[Value::F32(f32::NAN.to_bits())]),
        Err(InvokeError::Trap(Trap::InvalidConversion))
    );
}

#[test]
fn invoke_checks_arguments_and_names() {
    let (mut rt, inst) = setup();
    assert_eq!(call(&mut rt, inst, "nope", &[]), Err(InvokeError::ExportNotFound("nope".into())));
    let err = call(&mut rt, inst, "add", &[Value::I32(1)]).unwrap_err();
    assert!(matches!(err, InvokeError::Trap(Trap::SignatureMismatch { .. })), "{err:?}");
    let err = call(&mut rt, inst, "add", &[Value::I32(1), Value::I64(2)]).unwrap_err();
    assert!(matches!(err, InvokeError::Trap(Trap::SignatureMismatch { .. })), "{err:?}");
}
