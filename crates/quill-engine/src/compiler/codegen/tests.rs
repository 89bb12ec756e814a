// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the bytecode compiler.

use super::*;
use crate::compiler::bytecode::{ANY_EXCEPTION, UNPATCHED};
use crate::config::VmConfig;
use crate::runtime::{Module, Table, UpvalueDesc};

fn compile_source(src: &str) -> (Heap, Result<ObjRef, CompileErrors>) {
    let mut heap = Heap::new(&VmConfig::default());
    let name = heap.intern("test");
    let module = heap.insert(Obj::Module(Module {
        name,
        path: name,
        values: Table::new(),
        loaded: false,
    }));
    let result = crate::compiler::compile(&mut heap, src, module);
    (heap, result)
}

fn compile_ok(src: &str) -> (Heap, ObjRef) {
    let (heap, result) = compile_source(src);
    match result {
        Ok(function) => (heap, function),
        Err(errors) => panic!("compilation should succeed:\n{errors}"),
    }
}

fn compile_err(src: &str) -> Vec<String> {
    let (_, result) = compile_source(src);
    match result {
        Ok(_) => panic!("compilation should fail"),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    }
}

fn ops(heap: &Heap, function: ObjRef) -> Vec<OpCode> {
    let blob = &heap.as_function(function).unwrap().blob;
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < blob.len() {
        let op = blob.op_at(offset).expect("instruction boundary");
        out.push(op);
        offset += 1 + op.operand_len();
    }
    out
}

fn script_ops(src: &str) -> Vec<OpCode> {
    let (heap, function) = compile_ok(src);
    ops(&heap, function)
}

/// First function constant of `function`.
fn nested(heap: &Heap, function: ObjRef) -> ObjRef {
    heap.as_function(function)
        .unwrap()
        .blob
        .constants
        .iter()
        .filter_map(|c| c.as_obj())
        .find(|c| heap.as_function(*c).is_some())
        .expect("nested function")
}

use OpCode::*;

#[test]
fn test_compile_empty_program() {
    assert_eq!(script_ops(""), vec![Empty, Return]);
}

#[test]
fn test_compile_binary_add() {
    assert_eq!(script_ops("1 + 2;"), vec![Constant, Constant, Add, Pop, Empty, Return]);
}

#[test]
fn test_precedence() {
    assert_eq!(
        script_ops("1 + 2 * 3;"),
        vec![Constant, Constant, Constant, Multiply, Add, Pop, Empty, Return]
    );
}

#[test]
fn test_power_is_right_associative() {
    assert_eq!(
        script_ops("2 ** 3 ** 2;"),
        vec![Constant, Constant, Constant, Power, Power, Pop, Empty, Return]
    );
}

#[test]
fn test_unary_binds_tighter_than_power() {
    assert_eq!(
        script_ops("-2 ** 2;"),
        vec![Constant, Negate, Constant, Power, Pop, Empty, Return]
    );
}

#[test]
fn test_global_and_local_variables() {
    assert_eq!(script_ops("var a = 1;"), vec![Constant, DefineGlobal, Empty, Return]);
    assert_eq!(
        script_ops("{ var a = 1; echo a; }"),
        vec![Constant, GetLocal, Echo, Pop, Empty, Return]
    );
}

#[test]
fn test_captured_local_is_closed_at_scope_exit() {
    let (heap, script) = compile_ok("{ var x = 1; function g() { return x; } }");
    assert_eq!(
        ops(&heap, script),
        vec![Constant, Closure, Pop, CloseUpvalue, Empty, Return]
    );
    let g = nested(&heap, script);
    let function = heap.as_function(g).unwrap();
    assert_eq!(
        function.upvalues,
        vec![UpvalueDesc {
            index: 1,
            is_local: true
        }]
    );
    assert_eq!(ops(&heap, g), vec![GetUpvalue, Return, Null, Return]);
}

#[test]
fn test_transitive_upvalue() {
    let (heap, script) =
        compile_ok("function a() { var x = 1; function b() { function c() { return x; } } }");
    let a = nested(&heap, script);
    let b = nested(&heap, a);
    let c = nested(&heap, b);
    assert!(heap.as_function(b).unwrap().upvalues[0].is_local);
    assert!(!heap.as_function(c).unwrap().upvalues[0].is_local);
}

#[test]
fn test_break_is_patched_to_loop_exit() {
    let (heap, script) = compile_ok("while (true) { break; }");
    assert_eq!(
        ops(&heap, script),
        vec![True, JumpIfFalse, Pop, Jump, Loop, Pop, Empty, Return]
    );
    let blob = &heap.as_function(script).unwrap().blob;
    // The jump at offset 5 lands after the exit pop.
    assert_eq!(8 + blob.read_u16(6) as usize, 12);
}

#[test]
fn test_break_inside_try_pops_handler() {
    let code = script_ops("while (true) { try { break; } catch (e) {} }");
    let pop_try = code.iter().position(|op| *op == PopTry).expect("PopTry");
    assert_eq!(code[pop_try + 1], Jump);
    assert!(!code.contains(&BreakPlaceholder));
}

#[test]
fn test_do_while_continue_jumps_forward() {
    let code = script_ops("var i = 0; do { i += 1; continue; } while (i < 3);");
    assert!(code.contains(&Jump));
    assert_eq!(code.iter().filter(|op| **op == Loop).count(), 1);
}

#[test]
fn test_for_in_loop() {
    let code = script_ops("for (x in [1, 2]) { echo x; }");
    assert!(code.contains(&IterNext));
    assert!(code.contains(&IterValue));
    assert!(code.contains(&JumpIfEmpty));

    let code = script_ops("for (k, v in {a: 1}) { echo k; }");
    assert!(code.contains(&IterKey));
    assert!(code.contains(&GetIndex));
}

#[test]
fn test_interpolation() {
    assert_eq!(
        script_ops(r#""a${1}b";"#),
        vec![Constant, Constant, Stringify, Add, Constant, Add, Pop, Empty, Return]
    );
    assert_eq!(
        script_ops(r#""${1}";"#),
        vec![Constant, Stringify, Pop, Empty, Return]
    );
}

#[test]
fn test_try_catch_finally_layout() {
    let (heap, script) = compile_ok("try { } catch (e) { } finally { }");
    assert_eq!(
        ops(&heap, script),
        vec![Try, EndTry, Jump, Pop, EndTry, EndFinally, Empty, Return]
    );
    let blob = &heap.as_function(script).unwrap().blob;
    assert_eq!(blob.read_u16(1), ANY_EXCEPTION);
    assert_ne!(blob.read_u16(3), UNPATCHED);
    assert_ne!(blob.read_u16(5), UNPATCHED);
}

#[test]
fn test_typed_catch_names_class() {
    let (heap, script) = compile_ok("try { } catch (Exception e) { }");
    let blob = &heap.as_function(script).unwrap().blob;
    let class = blob.constants[blob.read_u16(1) as usize];
    assert_eq!(heap.value_str(class), Some("Exception"));
    assert_eq!(blob.read_u16(5), UNPATCHED);
}

#[test]
fn test_default_and_rest_parameters() {
    let (heap, script) = compile_ok("function f(a, b = 2, ...rest) { }");
    let f = nested(&heap, script);
    let function = heap.as_function(f).unwrap();
    assert_eq!(function.arity, 2);
    assert_eq!(function.required, 1);
    assert!(function.variadic);
    assert_eq!(ops(&heap, f)[0], ArgDefault);
}

#[test]
fn test_class_declaration() {
    let code = script_ops(
        "class A { var x = 1; static var n = 0; constructor() {} get size() { return 1; } @to_string() { return 'A'; } }",
    );
    for op in [Class, Field, StaticField, Method, Getter] {
        assert!(code.contains(&op), "missing {op:?}");
    }
}

#[test]
fn test_subclass_binds_super() {
    let code = script_ops("class A {} class B extends A { m() { return super.m(); } }");
    assert!(code.contains(&Inherit));
    // The hidden super local is popped after the class body.
    let inherit = code.iter().position(|op| *op == Inherit).unwrap();
    assert!(code[inherit..].contains(&Pop));
}

#[test]
fn test_self_property_opcodes() {
    let (heap, script) = compile_ok("class A { m() { this._x = 1; return this._x; } }");
    let m = nested(&heap, script);
    let code = ops(&heap, m);
    assert!(code.contains(&SetSelfProperty));
    assert!(code.contains(&GetSelfProperty));
}

#[test]
fn test_slices() {
    assert!(script_ops("var a = [1]; a[1:];").contains(&GetRangedIndex));
    assert!(script_ops("var a = [1]; a[:1];").contains(&GetRangedIndex));
}

#[test]
fn test_error_messages() {
    assert_eq!(compile_err("var;"), vec!["[line 1] Error at ';': Expect variable name."]);
    assert_eq!(compile_err("echo 1"), vec!["[line 1] Error at end: Expect ';' after value."]);
    assert_eq!(compile_err("1 = 2;"), vec!["[line 1] Error at '=': Invalid assignment target."]);
    assert_eq!(compile_err("\"abc"), vec!["[line 1] Error: Unterminated string."]);
}

#[test]
fn test_errors_are_collected_after_resync() {
    let errors = compile_err("var;\nvar;\necho 1;");
    assert_eq!(errors.len(), 2);
    assert!(errors[1].starts_with("[line 2]"));
}

#[test]
fn test_scope_errors() {
    assert!(compile_err("break;")[0].contains("Cannot use 'break' outside of a loop."));
    assert!(compile_err("return this;")[0].contains("Cannot use 'this' outside of a class."));
    assert!(compile_err("{ var a = a; }")[0].contains("own initializer"));
    assert!(compile_err("{ var a; var a; }")[0].contains("Already a variable"));
    assert!(compile_err("class A { m() { super.m(); } }")[0].contains("no superclass"));
    assert!(compile_err("class A extends A {}")[0].contains("inherit from itself"));
    assert!(compile_err("class A { constructor() { return 1; } }")[0].contains("constructor"));
    assert!(compile_err("try { }")[0].contains("Expect 'catch' or 'finally'"));
}

#[test]
fn test_disassembly_lists_nested_functions() {
    let (heap, script) = compile_ok("function add(a, b) { return a + b; } echo add(1, 2);");
    let listing = crate::compiler::disassemble(&heap, script);
    assert!(listing.contains("== <script> =="));
    assert!(listing.contains("== add =="));
    assert!(listing.contains("Closure"));
    assert!(listing.contains("'add'"));
}
