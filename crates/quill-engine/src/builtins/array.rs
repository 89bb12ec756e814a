// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Array methods.
//!
//! Callbacks passed to `map`, `filter`, `each` and `reduce` may mutate the
//! receiver; the length is re-read on every step.

use quill_macros::{arity, bail};

use super::{expect_array, expect_integer, push_item};
use crate::gc::ObjRef;
use crate::runtime::{NativeCall, Value};
use crate::vm::{Vm, VmResult};

pub(super) fn install(vm: &mut Vm) {
    let class = vm.classes.array;
    vm.define_computed(class, "length", length);
    vm.define_method(class, "push", push);
    vm.define_method(class, "pop", pop);
    vm.define_method(class, "shift", shift);
    vm.define_method(class, "insert", insert);
    vm.define_method(class, "remove", remove);
    vm.define_method(class, "contains", contains);
    vm.define_method(class, "index_of", index_of);
    vm.define_method(class, "join", join);
    vm.define_method(class, "reverse", reverse);
    vm.define_method(class, "slice", slice);
    vm.define_method(class, "map", map);
    vm.define_method(class, "filter", filter);
    vm.define_method(class, "reduce", reduce);
    vm.define_method(class, "each", each);
    vm.define_method(class, "first", first);
    vm.define_method(class, "last", last);
    vm.define_method(class, "is_empty", is_empty);
    vm.define_method(class, "clone", clone);
}

fn items_len(vm: &Vm, array: ObjRef) -> usize {
    vm.heap().as_array(array).map_or(0, |a| a.items.len())
}

fn item(vm: &Vm, array: ObjRef, index: usize) -> Option<Value> {
    vm.heap().as_array(array)?.items.get(index).copied()
}

/// Resolve a possibly negative position; `len` itself is allowed when
/// `inclusive` is set.
fn position(vm: &mut Vm, index: Value, len: usize, inclusive: bool) -> VmResult<usize> {
    let raw = expect_integer(vm, index)?;
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    let limit = if inclusive { len as i64 } else { len as i64 - 1 };
    if resolved < 0 || resolved > limit {
        bail!(vm, "Array index {} out of range.", raw);
    }
    Ok(resolved as usize)
}

fn length(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    let array = expect_array(vm, call.this)?;
    Ok(Value::Number(items_len(vm, array) as f64))
}

/// Append every argument; returns the new length.
fn push(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    let array = expect_array(vm, call.this)?;
    for arg in &call.args {
        push_item(vm, array, *arg);
    }
    Ok(Value::Number(items_len(vm, array) as f64))
}

fn pop(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let array = expect_array(vm, call.this)?;
    Ok(vm
        .heap
        .as_array_mut(array)
        .and_then(|a| a.items.pop())
        .unwrap_or(Value::Null))
}

fn shift(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let array = expect_array(vm, call.this)?;
    let Some(a) = vm.heap.as_array_mut(array) else {
        return Ok(Value::Null);
    };
    if a.items.is_empty() {
        return Ok(Value::Null);
    }
    Ok(a.items.remove(0))
}

fn insert(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 2);
    let array = expect_array(vm, call.this)?;
    let at = position(vm, call.arg(0), items_len(vm, array), true)?;
    if let Some(a) = vm.heap.as_array_mut(array) {
        a.items.insert(at, call.arg(1));
    }
    Ok(Value::Null)
}

/// Remove the item at an index and return it.
fn remove(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let array = expect_array(vm, call.this)?;
    let at = position(vm, call.arg(0), items_len(vm, array), false)?;
    Ok(vm
        .heap
        .as_array_mut(array)
        .map_or(Value::Null, |a| a.items.remove(at)))
}

fn find(vm: &Vm, array: ObjRef, needle: Value) -> Option<usize> {
    vm.heap().as_array(array)?.items.iter().position(|v| *v == needle)
}

fn contains(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let array = expect_array(vm, call.this)?;
    Ok(Value::Bool(find(vm, array, call.arg(0)).is_some()))
}

fn index_of(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let array = expect_array(vm, call.this)?;
    Ok(Value::Number(
        find(vm, array, call.arg(0)).map_or(-1.0, |i| i as f64),
    ))
}

fn join(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0..=1);
    let array = expect_array(vm, call.this)?;
    let separator = match call.arg(0) {
        Value::Null | Value::Empty => String::new(),
        value => vm.to_display(value)?,
    };
    let mut parts = Vec::new();
    let mut i = 0;
    while let Some(value) = item(vm, array, i) {
        parts.push(vm.to_display(value)?);
        i += 1;
    }
    let joined = parts.join(&separator);
    Ok(vm.string_value(&joined))
}

/// Reverse in place and return the receiver.
fn reverse(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let array = expect_array(vm, call.this)?;
    if let Some(a) = vm.heap.as_array_mut(array) {
        a.items.reverse();
    }
    Ok(call.this)
}

fn slice(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1..=2);
    expect_array(vm, call.this)?;
    vm.get_ranged_index(call.this, call.arg(0), call.arg(1))
}

fn map(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let array = expect_array(vm, call.this)?;
    let callback = call.arg(0);
    let mut scope = vm.root_scope();
    let result = scope.new_array(Vec::new());
    scope.push_root(result);
    let out = result.as_obj().unwrap_or(array);
    let mut i = 0;
    while let Some(value) = item(&scope, array, i) {
        let mapped = scope.call_value(callback, &[value])?;
        push_item(&mut scope, out, mapped);
        i += 1;
    }
    Ok(result)
}

fn filter(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let array = expect_array(vm, call.this)?;
    let callback = call.arg(0);
    let mut scope = vm.root_scope();
    let result = scope.new_array(Vec::new());
    scope.push_root(result);
    let out = result.as_obj().unwrap_or(array);
    let mut i = 0;
    while let Some(value) = item(&scope, array, i) {
        let keep = scope.call_value(callback, &[value])?;
        if !scope.is_falsey(keep) {
            push_item(&mut scope, out, value);
        }
        i += 1;
    }
    Ok(result)
}

/// `reduce(f, initial)`; without `initial` the first item seeds the fold.
fn reduce(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1..=2);
    let array = expect_array(vm, call.this)?;
    let callback = call.arg(0);
    let (mut acc, mut i) = if call.args.len() == 2 {
        (call.arg(1), 0)
    } else {
        match item(vm, array, 0) {
            Some(value) => (value, 1),
            None => bail!(vm, "Cannot reduce an empty array without an initial value."),
        }
    };
    let mut scope = vm.root_scope();
    let slot = scope.root_count();
    scope.push_root(acc);
    while let Some(value) = item(&scope, array, i) {
        acc = scope.call_value(callback, &[acc, value])?;
        scope.set_root(slot, acc);
        i += 1;
    }
    Ok(acc)
}

fn each(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let array = expect_array(vm, call.this)?;
    let callback = call.arg(0);
    let mut i = 0;
    while let Some(value) = item(vm, array, i) {
        vm.call_value(callback, &[value])?;
        i += 1;
    }
    Ok(Value::Null)
}

fn first(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let array = expect_array(vm, call.this)?;
    Ok(item(vm, array, 0).unwrap_or(Value::Null))
}

fn last(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let array = expect_array(vm, call.this)?;
    let len = items_len(vm, array);
    Ok(len
        .checked_sub(1)
        .and_then(|i| item(vm, array, i))
        .unwrap_or(Value::Null))
}

fn is_empty(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let array = expect_array(vm, call.this)?;
    Ok(Value::Bool(items_len(vm, array) == 0))
}

/// Shallow copy.
fn clone(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let array = expect_array(vm, call.this)?;
    let items = vm.heap().as_array(array).map(|a| a.items.clone()).unwrap_or_default();
    Ok(vm.new_array(items))
}

#[cfg(test)]
mod tests {
    use crate::config::VmConfig;
    use crate::vm::Vm;

    fn eval(source: &str) -> String {
        let mut vm = Vm::new(VmConfig::default());
        let main = vm.main_module();
        let value = vm.interpret(source, main).unwrap();
        vm.to_display(value).unwrap()
    }

    #[test]
    fn test_push_pop_shift() {
        assert_eq!(eval("var a = [1]; a.push(2, 3); return a;"), "[1, 2, 3]");
        assert_eq!(eval("var a = [1, 2]; a.pop(); return a;"), "[1]");
        assert_eq!(eval("var a = [1, 2]; return a.shift();"), "1");
        assert_eq!(eval("return [].pop();"), "null");
    }

    #[test]
    fn test_insert_remove() {
        assert_eq!(eval("var a = [1, 3]; a.insert(1, 2); return a;"), "[1, 2, 3]");
        assert_eq!(eval("var a = [1, 2]; a.insert(2, 3); return a;"), "[1, 2, 3]");
        assert_eq!(eval("var a = [1, 2, 3]; a.remove(-1); return a;"), "[1, 2]");
    }

    #[test]
    fn test_higher_order() {
        assert_eq!(eval("return [1, 2, 3].map(function(x) { return x * 2; });"), "[2, 4, 6]");
        assert_eq!(eval("return [1, 2, 3, 4].filter(function(x) { return x % 2 == 0; });"), "[2, 4]");
        assert_eq!(eval("return [1, 2, 3].reduce(function(a, b) { return a + b; }, 0);"), "6");
        assert_eq!(eval("return [1, 2, 3].reduce(function(a, b) { return a + b; });"), "6");
    }

    #[test]
    fn test_join_and_length() {
        assert_eq!(eval("return [1, \"a\", true].join(\", \");"), "1, a, true");
        assert_eq!(eval("return [1, 2, 3].length;"), "3");
        assert_eq!(eval("return [3, 2, 1].index_of(1);"), "2");
    }
}
