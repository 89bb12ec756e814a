// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end programs, asserting on captured `echo` output.

use quill_engine::{Engine, Error, SharedBuffer, VmConfig};

fn engine() -> (Engine, SharedBuffer) {
    let out = SharedBuffer::new();
    let config = VmConfig {
        report_uncaught: false,
        ..VmConfig::default()
    };
    (Engine::with_config(config).with_output(out.clone()), out)
}

fn run(source: &str) -> String {
    let (mut engine, out) = engine();
    if let Err(error) = engine.eval(source) {
        panic!("script failed: {error}\n--- output ---\n{}", out.contents());
    }
    out.contents()
}

fn fail(source: &str) -> quill_engine::RuntimeError {
    let (mut engine, _) = engine();
    match engine.eval(source) {
        Err(Error::Runtime(error)) => error,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn test_arithmetic_and_globals() {
    assert_eq!(run("var a = 1; var b = 2; echo a + b;"), "3\n");
    assert_eq!(run("echo 2 ** 3 ** 2;"), "512\n");
    assert_eq!(run("echo 7 % 3; echo -0; echo 1 / 0;"), "1\n0\ninf\n");
    assert_eq!(run("echo \"a\" + 1; echo \"ab\" * 2;"), "a1\nabab\n");
}

#[test]
fn test_class_with_method_named_get() {
    let source = "class A { constructor(x) { this.x = x; } get() { return this.x; } }\n\
                  var a = A(5);\necho a.get();";
    assert_eq!(run(source), "5\n");
}

#[test]
fn test_reduce_reenters_the_vm() {
    let source = "var arr = [1, 2, 3];\n\
                  echo arr.reduce(function(acc, x) { return acc + x; });";
    assert_eq!(run(source), "6\n");
}

#[test]
fn test_counter_pair_shares_upvalue() {
    let source = r#"
        function pair() {
            var n = 0;
            function inc() { n = n + 1; return n; }
            function get() { return n; }
            return [inc, get];
        }
        var p = pair();
        var inc = p[0];
        var get = p[1];
        inc();
        inc();
        echo get();
    "#;
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_loop_closures_capture_each_iteration() {
    let source = r#"
        var fns = [];
        for (var i in 0..3) {
            var j = i;
            fns.push(function() { return j; });
        }
        for (var f in fns) { echo f(); }
    "#;
    assert_eq!(run(source), "0\n1\n2\n");
}

#[test]
fn test_c_style_for_closures_capture_each_iteration() {
    let source = r#"
        var fs = [];
        for (var i = 0; i < 3; i = i + 1) {
            fs.push(function() { return i; });
        }
        for (f in fs) { echo f(); }
    "#;
    assert_eq!(run(source), "0\n1\n2\n");
}

#[test]
fn test_c_style_for_body_writes_reach_the_step() {
    let source = r#"
        var seen = [];
        var fs = [];
        for (var i = 0, j = 10; i < 10; i = i + 1) {
            if (i == 2) { i = 5; continue; }
            fs.push(function() { return i + j; });
            seen.push(i);
            if (i == 7) break;
        }
        echo seen;
        echo fs[0]() + " " + fs[2]();
    "#;
    assert_eq!(run(source), "[0, 1, 6, 7]\n10 16\n");
}

#[test]
fn test_try_catch_finally_ordering() {
    let source = r#"
        try { throw Exception("E"); } catch (e) { echo "A " + e.message; } finally { echo "B"; }
        echo "after";
    "#;
    assert_eq!(run(source), "A E\nB\nafter\n");
}

#[test]
fn test_finally_without_catch_repropagates() {
    let source = r#"
        function inner() {
            try { throw Exception("boom"); } finally { echo "B"; }
            echo "unreachable";
        }
        try { inner(); } catch (e) { echo "caught " + e.message; }
    "#;
    assert_eq!(run(source), "B\ncaught boom\n");
}

#[test]
fn test_typed_catch_skips_other_classes() {
    let source = r#"
        class NotFound extends Exception {}
        class Denied extends Exception {}
        function check() {
            try { throw Denied("no"); } catch (NotFound e) { echo "wrong"; }
        }
        try { check(); } catch (Denied e) { echo "denied " + e.message; }
    "#;
    assert_eq!(run(source), "denied no\n");
}

#[test]
fn test_exception_in_catch_runs_finally() {
    let source = r#"
        try {
            try { throw Exception("one"); }
            catch (e) { throw Exception("two"); }
            finally { echo "cleanup"; }
        } catch (e) { echo e.message; }
    "#;
    assert_eq!(run(source), "cleanup\ntwo\n");
}

#[test]
fn test_indexing() {
    assert_eq!(run("var arr = [1, 2, 3]; echo arr[-1]; echo arr[999];"), "3\nnull\n");
    assert_eq!(run("var d = {a: 1}; echo d[\"missing\"]; echo d[\"a\"];"), "null\n1\n");
    assert_eq!(run("var s = \"quill\"; echo s[0]; echo s[1:3]; echo s[-2:];"), "q\nui\nll\n");
    assert_eq!(run("var arr = [1, 2, 3, 4]; echo arr[1:];"), "[2, 3, 4]\n");
}

#[test]
fn test_range_members() {
    let source = "var r = 1..4; echo r.length; echo r.contains(2); echo r.to_list(); echo r.lower + r.upper;";
    assert_eq!(run(source), "3\ntrue\n[1, 2, 3]\n5\n");
}

#[test]
fn test_out_of_range_write_raises() {
    let error = fail("var arr = [1]; arr[5] = 2;");
    assert_eq!(error.message, "Array index 5 out of range.");
}

#[test]
fn test_inheritance_and_super() {
    let source = r#"
        class Animal {
            constructor(name) { this.name = name; }
            speak() { return this.name + " makes a sound"; }
        }
        class Dog extends Animal {
            constructor(name) { super(name); }
            speak() { return super.speak() + " (woof)"; }
        }
        var d = Dog("Rex");
        echo d.speak();
        echo d instanceof Animal;
    "#;
    assert_eq!(run(source), "Rex makes a sound (woof)\ntrue\n");
}

#[test]
fn test_accessors_and_statics() {
    let source = r#"
        class Temp {
            var celsius = 0;
            static var created = 0;
            constructor(c) { this.celsius = c; Temp.created = Temp.created + 1; }
            get fahrenheit() { return this.celsius * 9 / 5 + 32; }
            set fahrenheit(f) { this.celsius = (f - 32) * 5 / 9; }
            static zero() { return Temp(0); }
        }
        var t = Temp(100);
        echo t.fahrenheit;
        t.fahrenheit = 32;
        echo t.celsius;
        Temp.zero();
        echo Temp.created;
    "#;
    assert_eq!(run(source), "212\n0\n2\n");
}

#[test]
fn test_to_string_hook() {
    let source = r#"
        class Point {
            constructor(x, y) { this.x = x; this.y = y; }
            @to_string() { return "(" + this.x + ", " + this.y + ")"; }
        }
        echo Point(1, 2);
        echo [Point(3, 4)];
    "#;
    assert_eq!(run(source), "(1, 2)\n[(3, 4)]\n");
}

#[test]
fn test_default_and_rest_parameters() {
    let source = r#"
        function greet(name, greeting = "hello") { return greeting + " " + name; }
        function count(first, ...rest) { return rest.length; }
        echo greet("bob");
        echo greet("bob", "hi");
        echo count(1, 2, 3);
        echo count(1);
    "#;
    assert_eq!(run(source), "hello bob\nhi bob\n2\n0\n");
}

#[test]
fn test_for_in_over_dict_and_pairs() {
    let source = r#"
        var d = {a: 1, b: 2};
        for (var k in d) { echo k; }
        for (k, v in d) { echo k + "=" + v; }
    "#;
    assert_eq!(run(source), "a\nb\na=1\nb=2\n");
}

#[test]
fn test_loops_with_break_and_continue() {
    let source = r#"
        var total = 0;
        for (var i = 0; i < 10; i = i + 1) {
            if (i == 7) break;
            if (i % 2 == 0) continue;
            total = total + i;
        }
        echo total;
        var n = 0;
        do { n = n + 1; } while (n < 3);
        echo n;
    "#;
    assert_eq!(run(source), "9\n3\n");
}

#[test]
fn test_uncaught_exception_report() {
    let error = fail("function f() { throw Exception(\"bad\"); }\nf();");
    assert_eq!(error.class, "Exception");
    assert_eq!(error.message, "bad");
    assert_eq!(error.line, 1);
    assert_eq!(error.trace, vec!["<main>:1 -> f()", "<main>:2 -> <script>()"]);
}

#[test]
fn test_runtime_errors_are_catchable() {
    let source = r#"
        try { undefined_name; } catch (e) { echo e.message; }
        try { null.x; } catch (e) { echo e.message; }
        try { 1 + []; } catch (e) { echo "caught"; }
    "#;
    assert_eq!(
        run(source),
        "Undefined variable 'undefined_name'.\nUndefined property 'x' on null.\ncaught\n"
    );
}

#[test]
fn test_oversized_string_repetition_is_catchable() {
    let source = r#"
        try { echo "a" * 100000000000000000; } catch (e) { echo e.message; }
        try { "ab".repeat(100000000000000000); } catch (e) { echo e.message; }
        echo "ab" * 3;
    "#;
    assert_eq!(
        run(source),
        "String repetition too large.\nString repetition too large.\nababab\n"
    );
}

#[test]
fn test_private_members() {
    let error = fail("class A { var _secret = 1; } var a = A(); echo a._secret;");
    assert!(error.message.contains("private"), "{}", error.message);
    let source = "class A { var _secret = 41; reveal() { return this._secret + 1; } }\necho A().reveal();";
    assert_eq!(run(source), "42\n");
}

#[test]
fn test_assert() {
    assert_eq!(fail("assert 1 == 2;").message, "Assertion failed.");
    assert_eq!(fail("assert false, \"custom\";").message, "custom");
    assert_eq!(run("assert true; echo \"ok\";"), "ok\n");
}

#[test]
fn test_stack_overflow_is_an_exception() {
    let error = fail("function f() { return f(); } f();");
    assert_eq!(error.message, "Stack overflow.");
}

#[test]
fn test_bindings_persist_between_evals() {
    let (mut engine, out) = engine();
    engine.eval("var count = 1;").unwrap();
    engine.eval("count = count + 1;").unwrap();
    engine.eval("echo count;").unwrap();
    assert_eq!(out.contents(), "2\n");
}

#[test]
fn test_engine_recovers_after_uncaught_exception() {
    let (mut engine, out) = engine();
    assert!(engine.eval("throw Exception(\"x\");").is_err());
    engine.eval("echo 1;").unwrap();
    assert_eq!(out.contents(), "1\n");
}

#[test]
fn test_compile_errors_are_reported() {
    let (mut engine, _) = engine();
    match engine.eval("var = ;") {
        Err(Error::Compile(errors)) => assert!(!errors.is_empty()),
        other => panic!("expected compile errors, got {other:?}"),
    }
}

#[test]
fn test_register_native() {
    let (mut engine, out) = engine();
    engine.register_native("answer", |_vm, _call| Ok(quill_engine::Value::Number(42.0)));
    engine.eval("echo answer();").unwrap();
    assert_eq!(out.contents(), "42\n");
}
