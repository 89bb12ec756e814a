// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Number methods.

use quill_macros::arity;

use super::expect_number;
use crate::runtime::format::format_number;
use crate::runtime::{NativeCall, Value};
use crate::vm::{Vm, VmResult};

pub(super) fn install(vm: &mut Vm) {
    let class = vm.classes.number;
    vm.define_method(class, "to_string", to_string);
    vm.define_method(class, "floor", |vm, call| unary(vm, call, f64::floor));
    vm.define_method(class, "ceil", |vm, call| unary(vm, call, f64::ceil));
    vm.define_method(class, "round", |vm, call| unary(vm, call, f64::round));
    vm.define_method(class, "abs", |vm, call| unary(vm, call, f64::abs));
}

fn unary(vm: &mut Vm, call: &NativeCall, op: fn(f64) -> f64) -> VmResult<Value> {
    arity!(vm, call, 0);
    let n = expect_number(vm, call.this)?;
    Ok(Value::Number(op(n)))
}

fn to_string(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let n = expect_number(vm, call.this)?;
    Ok(vm.string_value(&format_number(n)))
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
    fn test_rounding() {
        assert_eq!(eval("var x = 2.5; return x.floor();"), "2");
        assert_eq!(eval("var x = 2.5; return x.ceil();"), "3");
        assert_eq!(eval("var x = -2.5; return x.abs();"), "2.5");
        assert_eq!(eval("var x = 7; return x.to_string() + \"!\";"), "7!");
    }
}
