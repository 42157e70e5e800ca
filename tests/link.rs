mod common;

use common::*;
use wedge::*;
use wedge::types::ExternKind;

fn add_type() -> FuncType {
    FuncType::new([ValType::I32, ValType::I32], [ValType::I32])
}

const USES_ADD: &str = r#"
(module
  (import "env" "add" (func $add (param i32 i32) (result i32)))
  (func (export "add_twice") (param i32) (result i32)
    (call $add (local.get 0) (call $add (local.get 0) (local.get 0)))))
"#;

#[test]
fn host_function_import() {
    let mut store = Store::default();
    let add = store.alloc_host_func(add_type(), |args| match args {
        [Value::I32(a), Value::I32(b)] => Ok(vec![Value::I32(a.wrapping_add(*b))]),
        _ => Err(Trap::host("bad arguments")),
    });
    let mut imports = Imports::new();
    imports.define("env", "add", Extern::Func(add));
    let inst = instantiate(&mut store, &valid(USES_ADD), &imports).unwrap();
    assert_eq!(call_i32(&mut store, inst, "add_twice", &[Value::I32(7)]), 21);
}

#[test]
fn mismatched_host_signature_is_a_link_error() {
    let mut store = Store::default();
    let add = store.alloc_host_func(FuncType::new([ValType::I64, ValType::I64], [ValType::I64]), |_| Ok(vec![]));
    let mut imports = Imports::new();
    imports.define("env", "add", Extern::Func(add));
    let err = instantiate(&mut store, &valid(USES_ADD), &imports).unwrap_err();
    assert!(matches!(
        err,
        Error::Link(LinkError::IncompatibleImport { ref module, ref field, .. }) if module == "env" && field == "add"
    ));
}

#[test]
fn missing_and_wrong_kind_imports() {
    let mut store = Store::default();
    let err = instantiate(&mut store, &valid(USES_ADD), &Imports::new()).unwrap_err();
    assert_eq!(err.to_string(), "link error: unknown import env.add");

    let mem = store.alloc_memory(MemoryType { limits: Limits { min: 1, max: None } }).unwrap();
    let mut imports = Imports::new();
    imports.define("env", "add", Extern::Memory(mem));
    let err = instantiate(&mut store, &valid(USES_ADD), &imports).unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::IncompatibleImport { reason: "incompatible import kind", .. })));
}

#[test]
fn import_limits_are_checked() {
    let importer = valid(r#"(module (import "env" "mem" (memory 2 4)) (import "env" "tab" (table 1 funcref)))"#);
    let mut store = Store::default();
    let tab = store.alloc_table(TableType { elem: RefType::FuncRef, limits: Limits { min: 1, max: None } }).unwrap();

    let mut imports = Imports::new();
    let small = store.alloc_memory(MemoryType { limits: Limits { min: 1, max: Some(4) } }).unwrap();
    imports.define("env", "mem", Extern::Memory(small)).define("env", "tab", Extern::Table(tab));
    assert!(matches!(instantiate(&mut store, &importer, &imports), Err(Error::Link(_))));

    let unbounded = store.alloc_memory(MemoryType { limits: Limits { min: 2, max: None } }).unwrap();
    imports.define("env", "mem", Extern::Memory(unbounded));
    assert!(matches!(instantiate(&mut store, &importer, &imports), Err(Error::Link(_))));

    let fits = store.alloc_memory(MemoryType { limits: Limits { min: 3, max: Some(4) } }).unwrap();
    imports.define("env", "mem", Extern::Memory(fits));
    assert!(instantiate(&mut store, &importer, &imports).is_ok());
}

#[test]
fn host_results_are_checked() {
    let mut store = Store::default();
    let add = store.alloc_host_func(add_type(), |_| Ok(vec![Value::I64(1)]));
    let mut imports = Imports::new();
    imports.define("env", "add", Extern::Func(add));
    let inst = instantiate(&mut store, &valid(USES_ADD), &imports).unwrap();
    assert_eq!(trap_of(call(&mut store, inst, "add_twice", &[Value::I32(1)])), TrapKind::HostResultMismatch);
}

#[test]
fn host_traps_propagate() {
    let mut store = Store::default();
    let add = store.alloc_host_func(add_type(), |_| Err(Trap::host("boom")));
    let mut imports = Imports::new();
    imports.define("env", "add", Extern::Func(add));
    let inst = instantiate(&mut store, &valid(USES_ADD), &imports).unwrap();
    assert_eq!(trap_of(call(&mut store, inst, "add_twice", &[Value::I32(1)])), TrapKind::Host("boom".into()));
}

#[test]
fn instances_share_memory_through_imports() {
    let mut store = Store::default();
    let provider = instantiate(
        &mut store,
        &valid(r#"(module (memory (export "mem") 1) (func (export "peek") (result i32) (i32.load8_u (i32.const 3))))"#),
        &Imports::new(),
    )
    .unwrap();
    let mut imports = Imports::new();
    imports.define_instance(&store, "provider", provider).unwrap();
    let user = instantiate(
        &mut store,
        &valid(
            r#"(module
              (import "provider" "mem" (memory 1))
              (data (i32.const 3) "\2a")
              (func (export "poke") (param i32) (i32.store8 (i32.const 3) (local.get 0))))"#,
        ),
        &imports,
    )
    .unwrap();
    assert_eq!(call_i32(&mut store, provider, "peek", &[]), 42);
    call(&mut store, user, "poke", &[Value::I32(7)]).unwrap();
    assert_eq!(call_i32(&mut store, provider, "peek", &[]), 7);
}

#[test]
fn global_initializers_cannot_read_later_globals() {
    let module = valid("(module (global i32 (global.get 1)) (global i32 (i32.const 0)))");
    let err = instantiate(&mut Store::default(), &module, &Imports::new()).unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::GlobalForwardReference { global: 0, referenced: 1 })));

    let (store, inst) = instance(
        r#"(module
          (global $a i32 (i32.const 20))
          (global $b (export "b") i32 (i32.add (global.get $a) (i32.const 22))))"#,
    );
    let Some(Extern::Global(b)) = store.export(inst, "b") else { panic!() };
    assert_eq!(store.global_value(b), Some(Value::I32(42)));
}

#[test]
fn out_of_bounds_segment_traps_but_keeps_earlier_writes() {
    let mut store = Store::default();
    let mem = store.alloc_memory(MemoryType { limits: Limits { min: 1, max: None } }).unwrap();
    let mut imports = Imports::new();
    imports.define("env", "mem", Extern::Memory(mem));
    let module = valid(
        r#"(module
          (import "env" "mem" (memory 1))
          (data (i32.const 0) "ok")
          (data (i32.const 65535) "no"))"#,
    );
    let err = instantiate(&mut store, &module, &imports).unwrap_err();
    assert_eq!(err.trap_kind(), Some(&TrapKind::MemoryOutOfBounds));
    assert_eq!(store.read_memory(mem, 0, 2).unwrap(), b"ok");

    let module = valid(r#"(module (table 1 funcref) (func $f) (elem (i32.const 1) $f))"#);
    let err = instantiate(&mut store, &module, &Imports::new()).unwrap_err();
    assert_eq!(err.trap_kind(), Some(&TrapKind::TableOutOfBounds));
}

#[test]
fn start_function() {
    let (mut store, inst) = instance(
        r#"(module
          (global $g (export "g") (mut i32) (i32.const 0))
          (func $init (global.set $g (i32.const 5)))
          (start $init))"#,
    );
    let Some(Extern::Global(g)) = store.export(inst, "g") else { panic!() };
    assert_eq!(store.global_value(g), Some(Value::I32(5)));

    let module = valid("(module (func $boom unreachable) (start $boom))");
    let err = instantiate(&mut store, &module, &Imports::new()).unwrap_err();
    assert_eq!(err.trap_kind(), Some(&TrapKind::Unreachable));
}

#[test]
fn repeated_instantiation_is_independent() {
    let module = valid(
        r#"(module
          (global $n (mut i32) (i32.const 0))
          (func (export "next") (result i32)
            (global.set $n (i32.add (global.get $n) (i32.const 1)))
            (global.get $n)))"#,
    );
    let mut store = Store::default();
    let a = instantiate(&mut store, &module, &Imports::new()).unwrap();
    let b = instantiate(&mut store, &module, &Imports::new()).unwrap();
    assert_ne!(a, b);
    assert_eq!(call_i32(&mut store, a, "next", &[]), 1);
    assert_eq!(call_i32(&mut store, a, "next", &[]), 2);
    assert_eq!(call_i32(&mut store, b, "next", &[]), 1);
}

#[test]
fn exported_functions_run_in_their_own_instance() {
    let mut store = Store::default();
    let lib = instantiate(
        &mut store,
        &valid(
            r#"(module
              (global $k i32 (i32.const 100))
              (func (export "k") (result i32) (global.get $k)))"#,
        ),
        &Imports::new(),
    )
    .unwrap();
    let mut imports = Imports::new();
    imports.define_instance(&store, "lib", lib).unwrap();
    let app = instantiate(
        &mut store,
        &valid(
            r#"(module
              (import "lib" "k" (func $k (result i32)))
              (global $k i32 (i32.const 1))
              (table 1 funcref)
              (elem (i32.const 0) $k)
              (func (export "both") (result i32)
                (i32.add (global.get $k) (call_indirect (result i32) (i32.const 0)))))"#,
        ),
        &imports,
    )
    .unwrap();
    assert_eq!(call_i32(&mut store, app, "both", &[]), 101);
}

#[test]
fn oversized_minimums_fail_instantiation() {
    let err = instantiate(&mut Store::default(), &valid("(module (table 0xffffffff funcref))"), &Imports::new()).unwrap_err();
    assert!(matches!(
        err,
        Error::Link(LinkError::LimitExceeded { kind: ExternKind::Table, min: u32::MAX, limit: 10_000_000 })
    ));

    let config = Config { max_memory_pages: 16, ..Config::default() };
    let mut store = Store::new(&config);
    let err = instantiate_with(&mut store, &valid("(module (memory 65536))"), &Imports::new(), &config).unwrap_err();
    assert_eq!(err.to_string(), "link error: memory minimum of 65536 exceeds the configured limit of 16");
    assert!(instantiate_with(&mut store, &valid("(module (memory 16))"), &Imports::new(), &config).is_ok());
}

#[test]
fn host_writes_are_visible_to_wasm() {
    let mut store = Store::default();
    let mem = store.alloc_memory(MemoryType { limits: Limits { min: 1, max: None } }).unwrap();
    store.write_memory(mem, 100, &[0x78, 0x56, 0x34, 0x12]).unwrap();
    let mut imports = Imports::new();
    imports.define("env", "mem", Extern::Memory(mem));
    let inst = instantiate(
        &mut store,
        &valid(r#"(module (import "env" "mem" (memory 1)) (func (export "get") (result i32) (i32.load (i32.const 100))))"#),
        &imports,
    )
    .unwrap();
    assert_eq!(call_i32(&mut store, inst, "get", &[]), 0x1234_5678);
    assert!(matches!(store.write_memory(mem, 65535, &[1, 2]), Err(Error::Trap(_))));
}
