mod common;

use common::*;
use wedge::*;

const FIB: &str = r#"
(module
  (func $fib (export "fib") (param $n i32) (result i32)
    (if (result i32) (i32.lt_u (local.get $n) (i32.const 2))
      (then (i32.const 1))
      (else
        (i32.add
          (call $fib (i32.sub (local.get $n) (i32.const 1)))
          (call $fib (i32.sub (local.get $n) (i32.const 2))))))))
"#;

#[test]
fn fibonacci() {
    let (mut store, inst) = instance(FIB);
    assert_eq!(call_i32(&mut store, inst, "fib", &[Value::I32(0)]), 1);
    assert_eq!(call_i32(&mut store, inst, "fib", &[Value::I32(1)]), 1);
    assert_eq!(call_i32(&mut store, inst, "fib", &[Value::I32(5)]), 8);
    assert_eq!(call_i32(&mut store, inst, "fib", &[Value::I32(20)]), 10946);
}

#[test]
fn repeated_runs_are_deterministic() {
    let module = valid(FIB);
    let results: Vec<_> = (0..3)
        .map(|_| {
            let mut store = Store::default();
            let inst = instantiate(&mut store, &module, &Imports::new()).unwrap();
            call(&mut store, inst, "fib", &[Value::I32(15)]).unwrap()
        })
        .collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

const ARITH: &str = r#"
(module
  (func (export "add") (param i32 i32) (result i32) (i32.add (local.get 0) (local.get 1)))
  (func (export "div_s") (param i32 i32) (result i32) (i32.div_s (local.get 0) (local.get 1)))
  (func (export "div_u") (param i32 i32) (result i32) (i32.div_u (local.get 0) (local.get 1)))
  (func (export "rem_s") (param i32 i32) (result i32) (i32.rem_s (local.get 0) (local.get 1)))
  (func (export "rem_u") (param i32 i32) (result i32) (i32.rem_u (local.get 0) (local.get 1)))
  (func (export "shl") (param i32 i32) (result i32) (i32.shl (local.get 0) (local.get 1)))
  (func (export "shr_s") (param i32 i32) (result i32) (i32.shr_s (local.get 0) (local.get 1)))
  (func (export "rotl") (param i32 i32) (result i32) (i32.rotl (local.get 0) (local.get 1)))
  (func (export "clz") (param i32) (result i32) (i32.clz (local.get 0)))
  (func (export "i64_div_s") (param i64 i64) (result i64) (i64.div_s (local.get 0) (local.get 1)))
  (func (export "extend8") (param i32) (result i32) (i32.extend8_s (local.get 0))))
"#;

#[test]
fn integer_arithmetic_wraps() {
    let (mut store, inst) = instance(ARITH);
    assert_eq!(call_i32(&mut store, inst, "add", &[Value::I32(-1), Value::I32(1)]), 0);
    assert_eq!(call_i32(&mut store, inst, "add", &[Value::I32(i32::MAX), Value::I32(1)]), i32::MIN);
    assert_eq!(call_i32(&mut store, inst, "div_u", &[Value::I32(-1), Value::I32(2)]), 0x7fff_ffff);
    assert_eq!(call_i32(&mut store, inst, "rem_s", &[Value::I32(-7), Value::I32(2)]), -1);
    assert_eq!(call_i32(&mut store, inst, "rem_s", &[Value::I32(i32::MIN), Value::I32(-1)]), 0);
    assert_eq!(call_i32(&mut store, inst, "shl", &[Value::I32(1), Value::I32(33)]), 2);
    assert_eq!(call_i32(&mut store, inst, "shr_s", &[Value::I32(-8), Value::I32(1)]), -4);
    assert_eq!(call_i32(&mut store, inst, "rotl", &[Value::I32(i32::MIN), Value::I32(1)]), 1);
    assert_eq!(call_i32(&mut store, inst, "clz", &[Value::I32(0)]), 32);
    assert_eq!(call_i32(&mut store, inst, "extend8", &[Value::I32(0x80)]), -128);
}

#[test]
fn division_traps() {
    let (mut store, inst) = instance(ARITH);
    let trap = trap_of(call(&mut store, inst, "div_s", &[Value::I32(i32::MIN), Value::I32(-1)]));
    assert_eq!(trap, TrapKind::IntegerOverflow);
    for name in ["div_s", "div_u", "rem_s", "rem_u"] {
        let trap = trap_of(call(&mut store, inst, name, &[Value::I32(1), Value::I32(0)]));
        assert_eq!(trap, TrapKind::DivideByZero, "{name}");
    }
    let trap = trap_of(call(&mut store, inst, "i64_div_s", &[Value::I64(i64::MIN), Value::I64(-1)]));
    assert_eq!(trap, TrapKind::IntegerOverflow);
    assert_eq!(trap.to_string(), "integer overflow");
}

#[test]
fn trap_records_location() {
    let (mut store, inst) = instance(ARITH);
    let Err(Error::Trap(trap)) = call(&mut store, inst, "div_u", &[Value::I32(1), Value::I32(0)]) else {
        panic!("expected trap");
    };
    assert_eq!(trap.func, Some(2));
    assert_eq!(trap.offset, Some(2));
}

#[test]
fn float_semantics() {
    let (mut store, inst) = instance(
        r#"(module
          (func (export "min") (param f32 f32) (result f32) (f32.min (local.get 0) (local.get 1)))
          (func (export "max") (param f64 f64) (result f64) (f64.max (local.get 0) (local.get 1)))
          (func (export "nearest") (param f64) (result f64) (f64.nearest (local.get 0)))
          (func (export "trunc") (param f32) (result i32) (i32.trunc_f32_s (local.get 0)))
          (func (export "trunc_u") (param f64) (result i32) (i32.trunc_f64_u (local.get 0)))
          (func (export "trunc_sat") (param f32) (result i32) (i32.trunc_sat_f32_s (local.get 0)))
          (func (export "neg") (param f32) (result f32) (f32.neg (local.get 0))))"#,
    );
    let f32_of = |r: Vec<Value>| r[0].as_f32().unwrap();
    let f64_of = |r: Vec<Value>| r[0].as_f64().unwrap();

    let min = f32_of(call(&mut store, inst, "min", &[Value::f32(0.0), Value::f32(-0.0)]).unwrap());
    assert!(min == 0.0 && min.is_sign_negative());
    assert!(f32_of(call(&mut store, inst, "min", &[Value::f32(f32::NAN), Value::f32(1.0)]).unwrap()).is_nan());
    let max = f64_of(call(&mut store, inst, "max", &[Value::f64(-0.0), Value::f64(0.0)]).unwrap());
    assert!(max == 0.0 && max.is_sign_positive());

    assert_eq!(f64_of(call(&mut store, inst, "nearest", &[Value::f64(2.5)]).unwrap()), 2.0);
    assert_eq!(f64_of(call(&mut store, inst, "nearest", &[Value::f64(3.5)]).unwrap()), 4.0);
    let neg_zero = f64_of(call(&mut store, inst, "nearest", &[Value::f64(-0.4)]).unwrap());
    assert!(neg_zero == 0.0 && neg_zero.is_sign_negative());

    assert_eq!(call_i32(&mut store, inst, "trunc", &[Value::f32(-3.9)]), -3);
    assert_eq!(call_i32(&mut store, inst, "trunc_u", &[Value::f64(-0.9)]), 0);
    assert_eq!(call_i32(&mut store, inst, "trunc_u", &[Value::f64(4294967295.9)]), -1);
    assert_eq!(trap_of(call(&mut store, inst, "trunc", &[Value::f32(f32::NAN)])), TrapKind::InvalidConversion);
    assert_eq!(trap_of(call(&mut store, inst, "trunc", &[Value::f32(2147483648.0)])), TrapKind::IntegerOverflow);
    assert_eq!(trap_of(call(&mut store, inst, "trunc_u", &[Value::f64(-1.0)])), TrapKind::IntegerOverflow);
    assert_eq!(call_i32(&mut store, inst, "trunc_sat", &[Value::f32(1e10)]), i32::MAX);
    assert_eq!(call_i32(&mut store, inst, "trunc_sat", &[Value::f32(f32::NAN)]), 0);

    let Value::F32(bits) = call(&mut store, inst, "neg", &[Value::F32(0x7fc0_0001)]).unwrap()[0] else { panic!() };
    assert_eq!(bits, 0xffc0_0001);
}

#[test]
fn control_flow() {
    let (mut store, inst) = instance(
        r#"(module
          (func (export "switch") (param i32) (result i32)
            (block $d
              (block $c
                (block $b
                  (block $a
                    (br_table $a $b $c $d (local.get 0)))
                  (return (i32.const 10)))
                (return (i32.const 11)))
              (return (i32.const 12)))
            (i32.const 13))
          (func (export "sum") (param $n i32) (result i32) (local $acc i32)
            (loop $top
              (local.set $acc (i32.add (local.get $acc) (local.get $n)))
              (local.tee $n (i32.sub (local.get $n) (i32.const 1)))
              (br_if $top))
            (local.get $acc))
          (func (export "br_value") (result i32)
            (block (result i32)
              (drop (br_if 0 (i32.const 7) (i32.const 1)))
              (i32.const 99)))
          (func (export "select") (param i32) (result i32)
            (select (i32.const 1) (i32.const 2) (local.get 0))))"#,
    );
    assert_eq!(call_i32(&mut store, inst, "switch", &[Value::I32(0)]), 10);
    assert_eq!(call_i32(&mut store, inst, "switch", &[Value::I32(2)]), 12);
    assert_eq!(call_i32(&mut store, inst, "switch", &[Value::I32(3)]), 13);
    assert_eq!(call_i32(&mut store, inst, "switch", &[Value::I32(100)]), 13);
    assert_eq!(call_i32(&mut store, inst, "sum", &[Value::I32(10)]), 55);
    assert_eq!(call_i32(&mut store, inst, "br_value", &[]), 7);
    assert_eq!(call_i32(&mut store, inst, "select", &[Value::I32(0)]), 2);
}

#[test]
fn multi_value_results_in_order() {
    let (mut store, inst) = instance(
        r#"(module
          (func $pair (result i32 i64) (i32.const 1) (i64.const 2))
          (func (export "pair") (result i32 i64) (call $pair))
          (func (export "swap") (param i32 i32) (result i32 i32)
            local.get 0
            local.get 1
            (block (param i32 i32) (result i32 i32)
              (local.set 0) (local.set 1) (local.get 0) (local.get 1))))"#,
    );
    assert_eq!(call(&mut store, inst, "pair", &[]).unwrap(), vec![Value::I32(1), Value::I64(2)]);
    assert_eq!(
        call(&mut store, inst, "swap", &[Value::I32(1), Value::I32(2)]).unwrap(),
        vec![Value::I32(2), Value::I32(1)]
    );
}

#[test]
fn memory_bounds_and_growth() {
    let (mut store, inst) = instance(
        r#"(module
          (memory (export "mem") 1 2)
          (func (export "load") (param i32) (result i32) (i32.load8_u (local.get 0)))
          (func (export "load_offset") (param i32) (result i32) (i32.load offset=0xffffffff (local.get 0)))
          (func (export "store") (param i32 i32) (i32.store (local.get 0) (local.get 1)))
          (func (export "grow") (param i32) (result i32) (memory.grow (local.get 0)))
          (func (export "size") (result i32) (memory.size)))"#,
    );
    assert_eq!(call_i32(&mut store, inst, "load", &[Value::I32(65535)]), 0);
    assert_eq!(trap_of(call(&mut store, inst, "load", &[Value::I32(65536)])), TrapKind::MemoryOutOfBounds);
    assert_eq!(trap_of(call(&mut store, inst, "load_offset", &[Value::I32(1)])), TrapKind::MemoryOutOfBounds);
    assert_eq!(trap_of(call(&mut store, inst, "store", &[Value::I32(65533), Value::I32(1)])), TrapKind::MemoryOutOfBounds);

    call(&mut store, inst, "store", &[Value::I32(8), Value::I32(0x0403_0201)]).unwrap();
    let Some(Extern::Memory(mem)) = store.export(inst, "mem") else { panic!() };
    assert_eq!(store.read_memory(mem, 8, 4).unwrap(), &[1, 2, 3, 4]);

    assert_eq!(call_i32(&mut store, inst, "grow", &[Value::I32(0)]), 1);
    assert_eq!(call_i32(&mut store, inst, "grow", &[Value::I32(1)]), 1);
    assert_eq!(call_i32(&mut store, inst, "grow", &[Value::I32(1)]), -1);
    assert_eq!(call_i32(&mut store, inst, "size", &[]), 2);
    assert_eq!(call_i32(&mut store, inst, "load", &[Value::I32(131071)]), 0);
}

#[test]
fn bulk_memory() {
    let (mut store, inst) = instance(
        r#"(module
          (memory (export "mem") 1)
          (data $d "hello")
          (func (export "init") (param i32 i32 i32) (memory.init $d (local.get 0) (local.get 1) (local.get 2)))
          (func (export "drop") (data.drop $d))
          (func (export "copy") (param i32 i32 i32) (memory.copy (local.get 0) (local.get 1) (local.get 2)))
          (func (export "fill") (param i32 i32 i32) (memory.fill (local.get 0) (local.get 1) (local.get 2))))"#,
    );
    let Some(Extern::Memory(mem)) = store.export(inst, "mem") else { panic!() };
    call(&mut store, inst, "init", &[Value::I32(0), Value::I32(0), Value::I32(5)]).unwrap();
    call(&mut store, inst, "copy", &[Value::I32(2), Value::I32(0), Value::I32(5)]).unwrap();
    assert_eq!(store.read_memory(mem, 0, 7).unwrap(), b"hehello");
    call(&mut store, inst, "fill", &[Value::I32(0), Value::I32(b'x' as i32), Value::I32(2)]).unwrap();
    assert_eq!(store.read_memory(mem, 0, 3).unwrap(), b"xxh");

    assert_eq!(
        trap_of(call(&mut store, inst, "fill", &[Value::I32(65535), Value::I32(0), Value::I32(2)])),
        TrapKind::MemoryOutOfBounds
    );
    call(&mut store, inst, "drop", &[]).unwrap();
    call(&mut store, inst, "init", &[Value::I32(0), Value::I32(0), Value::I32(0)]).unwrap();
    assert_eq!(
        trap_of(call(&mut store, inst, "init", &[Value::I32(0), Value::I32(0), Value::I32(1)])),
        TrapKind::MemoryOutOfBounds
    );
}

#[test]
fn call_indirect() {
    let (mut store, inst) = instance(
        r#"(module
          (type $unary (func (param i32) (result i32)))
          (table 4 funcref)
          (elem (i32.const 0) $double $square)
          (elem (i32.const 3) $nullary)
          (func $double (param i32) (result i32) (i32.mul (local.get 0) (i32.const 2)))
          (func $square (param i32) (result i32) (i32.mul (local.get 0) (local.get 0)))
          (func $nullary (result i32) (i32.const 0))
          (func (export "dispatch") (param i32 i32) (result i32)
            (call_indirect (type $unary) (local.get 1) (local.get 0))))"#,
    );
    assert_eq!(call_i32(&mut store, inst, "dispatch", &[Value::I32(0), Value::I32(7)]), 14);
    assert_eq!(call_i32(&mut store, inst, "dispatch", &[Value::I32(1), Value::I32(7)]), 49);
    let trap = |store: &mut Store, i| trap_of(call(store, inst, "dispatch", &[Value::I32(i), Value::I32(0)]));
    assert_eq!(trap(&mut store, 2), TrapKind::UninitializedElement);
    assert_eq!(trap(&mut store, 3), TrapKind::IndirectCallTypeMismatch);
    assert_eq!(trap(&mut store, 4), TrapKind::UndefinedElement);
}

#[test]
fn table_instructions() {
    let (mut store, inst) = instance(
        r#"(module
          (table $t 1 3 funcref)
          (func $f (result i32) (i32.const 42))
          (elem declare func $f)
          (func (export "grow") (param i32) (result i32) (table.grow $t (ref.func $f) (local.get 0)))
          (func (export "size") (result i32) (table.size $t))
          (func (export "is_null") (param i32) (result i32) (ref.is_null (table.get $t (local.get 0))))
          (func (export "call") (param i32) (result i32) (call_indirect $t (result i32) (local.get 0))))"#,
    );
    assert_eq!(call_i32(&mut store, inst, "is_null", &[Value::I32(0)]), 1);
    assert_eq!(call_i32(&mut store, inst, "grow", &[Value::I32(2)]), 1);
    assert_eq!(call_i32(&mut store, inst, "grow", &[Value::I32(1)]), -1);
    assert_eq!(call_i32(&mut store, inst, "size", &[]), 3);
    assert_eq!(call_i32(&mut store, inst, "is_null", &[Value::I32(2)]), 0);
    assert_eq!(call_i32(&mut store, inst, "call", &[Value::I32(2)]), 42);
    assert_eq!(trap_of(call(&mut store, inst, "is_null", &[Value::I32(3)])), TrapKind::TableOutOfBounds);
}

#[test]
fn globals() {
    let (mut store, inst) = instance(
        r#"(module
          (global $base i32 (i32.const 40))
          (global $g (export "g") (mut i32) (global.get $base))
          (func (export "bump") (result i32)
            (global.set $g (i32.add (global.get $g) (i32.const 2)))
            (global.get $g)))"#,
    );
    assert_eq!(call_i32(&mut store, inst, "bump", &[]), 42);
    let Some(Extern::Global(g)) = store.export(inst, "g") else { panic!() };
    assert_eq!(store.global_value(g), Some(Value::I32(42)));
    store.set_global(g, Value::I32(0)).unwrap();
    assert_eq!(call_i32(&mut store, inst, "bump", &[]), 2);
    assert!(store.set_global(g, Value::I64(0)).is_err());
}

#[test]
fn call_depth_is_bounded() {
    let module = valid(r#"(module (func $f (export "f") (call $f)))"#);
    let mut store = Store::default();
    let inst = instantiate(&mut store, &module, &Imports::new()).unwrap();
    let Some(Extern::Func(f)) = store.export(inst, "f") else { panic!() };
    let config = Config { max_call_depth: 100, ..Config::default() };
    let err = Interpreter::new(&config).invoke(&mut store, f, &[]).unwrap_err();
    assert_eq!(err.trap_kind(), Some(&TrapKind::CallStackExhausted));
    assert_eq!(err.to_string(), "trap: call stack exhausted in function 0 at instruction 0");
}

#[test]
fn arguments_are_checked_before_execution() {
    let (mut store, inst) = instance(FIB);
    let err = call(&mut store, inst, "fib", &[Value::I64(5)]).unwrap_err();
    assert!(matches!(err, Error::Invocation(InvocationError::ArgumentMismatch { .. })));
    let err = call(&mut store, inst, "fib", &[]).unwrap_err();
    assert!(matches!(err, Error::Invocation(InvocationError::ArgumentMismatch { .. })));
}

#[test]
fn unreachable_traps_and_store_stays_usable() {
    let (mut store, inst) = instance(
        r#"(module
          (memory 1)
          (func (export "write_then_trap") (i32.store (i32.const 0) (i32.const 9)) (unreachable))
          (func (export "read") (result i32) (i32.load (i32.const 0))))"#,
    );
    assert_eq!(trap_of(call(&mut store, inst, "write_then_trap", &[])), TrapKind::Unreachable);
    assert_eq!(call_i32(&mut store, inst, "read", &[]), 9);
}
