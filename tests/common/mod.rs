#![allow(dead_code)]

use wedge::*;

pub fn wasm(text: &str) -> Vec<u8> {
    wat::parse_str(text).expect("invalid test WAT")
}

pub fn valid(text: &str) -> ValidModule {
    let module = decode(&wasm(text)).expect("decode failed");
    validate(module, &Features::default()).expect("validation failed")
}

pub fn validate_text(text: &str, features: &Features) -> Result<ValidModule, ValidationError> {
    validate(decode(&wasm(text)).expect("decode failed"), features)
}

/// Instantiates a module without imports into a fresh store.
pub fn instance(text: &str) -> (Store, InstanceHandle) {
    let mut store = Store::default();
    let handle = instantiate(&mut store, &valid(text), &Imports::new()).expect("instantiation failed");
    (store, handle)
}

pub fn call(store: &mut Store, handle: InstanceHandle, name: &str, args: &[Value]) -> Result<Vec<Value>, Error> {
    let Some(Extern::Func(func)) = store.export(handle, name) else { panic!("no exported function {name}") };
    Interpreter::new(&Config::default()).invoke(store, func, args)
}

pub fn call_i32(store: &mut Store, handle: InstanceHandle, name: &str, args: &[Value]) -> i32 {
    match call(store, handle, name, args).expect("call failed").as_slice() {
        [Value::I32(v)] => *v,
        other => panic!("expected a single i32, got {other:?}"),
    }
}

pub fn trap_of(result: Result<Vec<Value>, Error>) -> TrapKind {
    match result {
        Err(Error::Trap(trap)) => trap.kind,
        other => panic!("expected a trap, got {other:?}"),
    }
}
