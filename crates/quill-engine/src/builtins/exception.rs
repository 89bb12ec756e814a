// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The `Exception` base class.

use std::rc::Rc;

use quill_macros::arity;

use crate::runtime::{NativeCall, Value};
use crate::vm::{Vm, VmResult};

pub(super) const CLASS_NAME: &str = "Exception";

pub(super) fn install(vm: &mut Vm) {
    let class = vm.classes.exception;
    let names = vm.names;

    let empty = vm.string_value("");
    if let Some(c) = vm.heap.as_class_mut(class) {
        c.fields.set_value(Value::Obj(names.message), empty);
        c.fields.set_value(Value::Obj(names.srcfile), Value::Null);
        c.fields.set_value(Value::Obj(names.srcline), Value::Null);
        c.fields.set_value(Value::Obj(names.stacktrace), Value::Null);
    }

    let constructor = vm.native_function("constructor", Rc::new(constructor));
    if let Some(c) = vm.heap.as_class_mut(class) {
        c.methods
            .set_value(Value::Obj(names.constructor), constructor);
        c.initializer = Some(constructor);
    }
    vm.define_global(CLASS_NAME, Value::Obj(class));
}

/// `Exception(message = "")`
fn constructor(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0..=1);
    let message = match call.arg(0) {
        Value::Null | Value::Empty => return Ok(Value::Null),
        value if vm.heap.value_str(value).is_some() => value,
        value => {
            let text = vm.to_display(value)?;
            vm.string_value(&text)
        }
    };
    let key = Value::Obj(vm.names.message);
    if let Some(instance) = call.this.as_obj().and_then(|r| vm.heap.as_instance_mut(r)) {
        instance.fields.set_value(key, message);
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use crate::config::VmConfig;
    use crate::vm::Vm;

    #[test]
    fn test_subclass_carries_message() {
        let mut vm = Vm::new(VmConfig::default());
        let main = vm.main_module();
        let source = "class MyError extends Exception {}\nvar e = MyError(\"bad\");\nreturn e.message;";
        let value = vm.interpret(source, main).unwrap();
        assert_eq!(vm.heap().value_str(value), Some("bad"));
    }
}
