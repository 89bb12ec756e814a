// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Range members.

use quill_macros::arity;

use crate::runtime::{NativeCall, Range, Value};
use crate::vm::{Vm, VmResult};

pub(super) fn install(vm: &mut Vm) {
    let class = vm.classes.range;
    vm.define_computed(class, "lower", lower);
    vm.define_computed(class, "upper", upper);
    vm.define_computed(class, "length", length);
    vm.define_method(class, "to_list", to_list);
    vm.define_method(class, "contains", contains);
}

fn this(vm: &mut Vm, call: &NativeCall) -> VmResult<Range> {
    match call.this.as_obj().and_then(|r| vm.heap().as_range(r).copied()) {
        Some(range) => Ok(range),
        None => Err(vm.type_error("a range", call.this)),
    }
}

fn lower(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    Ok(Value::Number(this(vm, call)?.lower as f64))
}

fn upper(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    Ok(Value::Number(this(vm, call)?.upper as f64))
}

fn length(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    Ok(Value::Number(this(vm, call)?.len() as f64))
}

fn to_list(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let range = this(vm, call)?;
    let items = (0..range.len())
        .filter_map(|i| range.nth(i))
        .map(|n| Value::Number(n as f64))
        .collect();
    Ok(vm.new_array(items))
}

fn contains(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let range = this(vm, call)?;
    Ok(Value::Bool(
        call.arg(0).as_integer().is_some_and(|n| range.contains(n)),
    ))
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
    fn test_members() {
        assert_eq!(eval("return (2..5).length;"), "3");
        assert_eq!(eval("return (2..5).to_list();"), "[2, 3, 4]");
        assert_eq!(eval("return (5..2).to_list();"), "[5, 4, 3]");
        assert_eq!(eval("var r = 0..3; return r.lower + r.upper;"), "3");
    }

    #[test]
    fn test_contains() {
        assert_eq!(eval("return (0..3).contains(2);"), "true");
        assert_eq!(eval("return (0..3).contains(3);"), "false");
        assert_eq!(eval("return (0..3).contains(1.5);"), "false");
    }
}
