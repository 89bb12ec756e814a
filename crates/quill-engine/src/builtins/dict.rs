// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dictionary methods. Keys keep insertion order.

use quill_macros::arity;

use super::expect_dict;
use crate::gc::ObjRef;
use crate::runtime::{Dict, NativeCall, Obj, Value};
use crate::vm::{Vm, VmResult};

pub(super) fn install(vm: &mut Vm) {
    let class = vm.classes.dict;
    vm.define_computed(class, "length", length);
    vm.define_method(class, "keys", keys);
    vm.define_method(class, "values", values);
    vm.define_method(class, "contains", contains);
    vm.define_method(class, "get", get);
    vm.define_method(class, "remove", remove);
    vm.define_method(class, "clone", clone);
    vm.define_method(class, "is_empty", is_empty);
}

fn with_dict<T>(vm: &Vm, dict: ObjRef, f: impl FnOnce(&Dict) -> T) -> Option<T> {
    vm.heap().as_dict(dict).map(f)
}

fn length(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    let r = expect_dict(vm, call.this)?;
    let len = with_dict(vm, r, Dict::len).unwrap_or(0);
    Ok(Value::Number(len as f64))
}

fn keys(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let r = expect_dict(vm, call.this)?;
    let keys = with_dict(vm, r, |d| d.keys.clone()).unwrap_or_default();
    Ok(vm.new_array(keys))
}

fn values(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let r = expect_dict(vm, call.this)?;
    let values = with_dict(vm, r, |d| {
        d.keys.iter().map(|k| d.get(*k).unwrap_or_default()).collect()
    })
    .unwrap_or_default();
    Ok(vm.new_array(values))
}

fn contains(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let r = expect_dict(vm, call.this)?;
    let found = with_dict(vm, r, |d| d.get(call.arg(0)).is_some()).unwrap_or(false);
    Ok(Value::Bool(found))
}

/// `get(key, fallback = null)`
fn get(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1..=2);
    let r = expect_dict(vm, call.this)?;
    let fallback = match call.arg(1) {
        Value::Empty => Value::Null,
        other => other,
    };
    Ok(with_dict(vm, r, |d| d.get(call.arg(0)))
        .flatten()
        .unwrap_or(fallback))
}

/// Remove a key and return its value, or null if it was absent.
fn remove(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let r = expect_dict(vm, call.this)?;
    Ok(vm
        .heap
        .as_dict_mut(r)
        .and_then(|d| d.remove(call.arg(0)))
        .unwrap_or(Value::Null))
}

/// Shallow copy.
fn clone(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let r = expect_dict(vm, call.this)?;
    let copy = with_dict(vm, r, |d| Dict {
        keys: d.keys.clone(),
        table: d.table.clone(),
    })
    .unwrap_or_default();
    Ok(Value::Obj(vm.alloc(Obj::Dict(copy))))
}

fn is_empty(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let r = expect_dict(vm, call.this)?;
    Ok(Value::Bool(with_dict(vm, r, Dict::is_empty).unwrap_or(true)))
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
    fn test_keys_keep_insertion_order() {
        assert_eq!(eval("var d = {\"b\": 1, \"a\": 2}; d[\"c\"] = 3; return d.keys();"), "['b', 'a', 'c']");
        assert_eq!(eval("var d = {\"b\": 1, \"a\": 2}; return d.values();"), "[1, 2]");
    }

    #[test]
    fn test_remove_and_get() {
        assert_eq!(eval("var d = {\"a\": 1}; d.remove(\"a\"); return d.length;"), "0");
        assert_eq!(eval("var d = {\"a\": 1}; return d.get(\"z\", 9);"), "9");
        assert_eq!(eval("var d = {1: \"one\"}; return d.contains(1);"), "true");
    }

    #[test]
    fn test_clone_is_shallow_copy() {
        assert_eq!(eval("var d = {\"a\": 1}; var e = d.clone(); e[\"b\"] = 2; return d.length;"), "1");
    }
}
