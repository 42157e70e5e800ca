mod common;

use common::*;
use wedge::error::*;
use wedge::*;

fn message(text: &str) -> &'static str {
    validate_text(text, &Features::default()).expect_err("module should be invalid").message
}

#[test]
fn accepts_well_typed_modules() {
    valid(
        r#"(module
          (memory 1)
          (table 1 funcref)
          (global $g (mut i32) (i32.const 0))
          (func $f (param i32) (result i32)
            (block $out (result i32)
              (loop $l
                (br_if $l (i32.eqz (local.get 0))))
              (i32.load offset=4 align=4 (local.get 0))))
          (func (result i32)
            unreachable
            i64.const 0
            i64.add
            i32.wrap_i64)
          (func (result i32) (i64.const 0) (return (i32.const 1)))
          (elem (i32.const 0) $f))"#,
    );
}

#[test]
fn branch_beyond_enclosing_blocks() {
    let err = validate_text("(module (func (block (br 2))))", &Features::default()).unwrap_err();
    assert_eq!(err.message, UNKNOWN_LABEL);
    // block, br, end, end: the branch is instruction 1.
    assert_eq!((err.func, err.offset), (Some(0), Some(1)));
    assert_eq!(message("(module (func (br_table 0 1 (i32.const 0))))"), UNKNOWN_LABEL);
}

#[test]
fn operand_type_mismatches() {
    let err = validate_text("(module (func (result i32) (i64.const 0)))", &Features::default()).unwrap_err();
    assert_eq!(err.message, TYPE_MISMATCH);
    assert_eq!(err.func, Some(0));
    // Reported at the closing `end`, after `i64.const 0`.
    assert_eq!(err.offset, Some(1));
    assert_eq!(err.expected, Some(ValType::I32));
    assert_eq!(err.actual, Some(ValType::I64));

    assert_eq!(message("(module (func (drop (i32.add (i32.const 1) (f32.const 2)))))"), TYPE_MISMATCH);
    assert_eq!(message("(module (func (i32.const 1)))"), TYPE_MISMATCH);
    assert_eq!(message("(module (func (result i32) (block (result i32) (nop)) ))"), TYPE_MISMATCH);
    assert_eq!(message("(module (func (if (i32.const 0) (then (i32.const 1) (drop)) (else (i64.const 1)))))"), TYPE_MISMATCH);
}

#[test]
fn unknown_indices() {
    assert_eq!(message("(module (func (drop (local.get 3))))"), UNKNOWN_LOCAL);
    assert_eq!(message("(module (func (call 5)))"), UNKNOWN_FUNC);
    assert_eq!(message("(module (func (drop (global.get 0))))"), UNKNOWN_GLOBAL);
    assert_eq!(message("(module (func (drop (i32.load (i32.const 0)))))"), UNKNOWN_MEMORY);
    assert_eq!(message("(module (func (drop (table.size 0))))"), UNKNOWN_TABLE);
}

#[test]
fn module_level_rules() {
    assert_eq!(message(r#"(module (func (export "a")) (func (export "a")))"#), DUP_EXPORT_NAME);
    assert_eq!(message("(module (func $s (param i32)) (start $s))"), START_FUNC);
    assert_eq!(message("(module (memory 2 1))"), MIN_GREATER_THAN_MAX);
    assert_eq!(message("(module (memory 65537))"), MEMORY_SIZE_LIMIT);
    assert_eq!(message("(module (global i32 (i32.const 0)) (func (global.set 0 (i32.const 1))))"), GLOBAL_IS_IMMUTABLE);
    assert_eq!(message("(module (memory 1) (func (drop (i32.load align=8 (i32.const 0)))))"), ALIGNMENT_TOO_LARGE);
    assert_eq!(message("(module (func $f) (func (drop (ref.func $f))))"), UNDECLARED_FUNC_REF);
    assert_eq!(message("(module (global i32 (i32.add (i32.const 1) (nop))))"), CONST_EXP_REQUIRED);
}

#[test]
fn disabled_features_are_rejected() {
    let mvp = Features::mvp();
    let err = |text: &str| validate_text(text, &mvp).unwrap_err().message;
    assert_eq!(err("(module (func (result i32 i32) (i32.const 1) (i32.const 2)))"), INVALID_RESULT_ARITY);
    assert_eq!(err("(module (func (drop (i32.extend8_s (i32.const 1)))))"), FEATURE_DISABLED);
    assert_eq!(err("(module (func (drop (i32.trunc_sat_f32_s (f32.const 1)))))"), FEATURE_DISABLED);
    assert_eq!(err("(module (memory 1) (func (memory.fill (i32.const 0) (i32.const 0) (i32.const 0))))"), FEATURE_DISABLED);
    assert_eq!(err(r#"(module (global (export "g") (mut i32) (i32.const 0)))"#), FEATURE_DISABLED);

    let mut features = Features::default();
    features.disable("sign-extension");
    assert!(validate_text("(module (func (drop (i32.extend8_s (i32.const 1)))))", &features).is_err());
    assert!(validate_text("(module (func (result i32 i32) (i32.const 1) (i32.const 2)))", &features).is_ok());
}

#[test]
fn validated_module_exposes_its_ast() {
    let module = valid(r#"(module (func (export "f")))"#);
    assert_eq!(module.module().exports[0].name, "f");
    assert_eq!(module.code.len(), 1);
}
