// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Built-in functions and the methods of the built-in types.
//!
//! # Module Structure
//!
//! - `global`: top-level functions such as `print` and `typeof`
//! - `exception`: the `Exception` base class
//! - `array`, `string`, `dict`, `range`, `number`: methods by receiver type

mod array;
mod dict;
mod exception;
mod global;
mod number;
mod range;
mod string;

use std::rc::Rc;

use crate::gc::ObjRef;
use crate::runtime::{Array, Native, NativeCall, NativeFn, Obj, Property, Value};
use crate::vm::{Vm, VmResult};

/// Plain native function pointer, the shape of every built-in.
pub(crate) type Builtin = fn(&mut Vm, &NativeCall) -> VmResult<Value>;

/// Names of the globals every VM starts with.
pub fn global_names() -> impl Iterator<Item = &'static str> {
    global::FUNCTIONS
        .iter()
        .map(|&(name, _)| name)
        .chain([exception::CLASS_NAME])
}

pub(crate) fn install(vm: &mut Vm) {
    global::install(vm);
    exception::install(vm);
    array::install(vm);
    string::install(vm);
    dict::install(vm);
    range::install(vm);
    number::install(vm);
}

impl Vm {
    /// Wrap `func` in a native function object.
    pub fn native_function(&mut self, name: &str, func: NativeFn) -> Value {
        let native = self.alloc(Obj::Native(Native {
            name: Rc::from(name),
            func,
        }));
        Value::Obj(native)
    }

    /// Register a global native function.
    pub fn define_native(
        &mut self,
        name: &str,
        func: impl Fn(&mut Vm, &NativeCall) -> VmResult<Value> + 'static,
    ) {
        let native = self.native_function(name, Rc::new(func));
        self.define_global(name, native);
    }

    /// Register a method on a built-in class.
    pub(crate) fn define_method(&mut self, class: ObjRef, name: &str, func: Builtin) {
        self.define_class_member(class, name, func, Property::value);
    }

    /// Register a property computed by `func` on every read.
    pub(crate) fn define_computed(&mut self, class: ObjRef, name: &str, func: Builtin) {
        self.define_class_member(class, name, func, Property::function);
    }

    fn define_class_member(
        &mut self,
        class: ObjRef,
        name: &str,
        func: Builtin,
        kind: fn(Value) -> Property,
    ) {
        let mut scope = self.root_scope();
        let native = scope.native_function(name, Rc::new(func));
        scope.push_root(native);
        let key = scope.intern(name);
        if let Some(class) = scope.heap.as_class_mut(class) {
            class.methods.set(Value::Obj(key), kind(native));
        }
    }

    /// Allocate an array holding `items`, which must stay reachable from a
    /// root until this returns.
    pub fn new_array(&mut self, items: Vec<Value>) -> Value {
        let array = self.alloc(Obj::Array(Array::default()));
        if let Some(a) = self.heap.as_array_mut(array) {
            a.items = items;
        }
        Value::Obj(array)
    }
}

pub(crate) fn expect_number(vm: &mut Vm, value: Value) -> VmResult<f64> {
    match value {
        Value::Number(n) => Ok(n),
        other => Err(vm.type_error("a number", other)),
    }
}

pub(crate) fn expect_integer(vm: &mut Vm, value: Value) -> VmResult<i64> {
    match value.as_integer() {
        Some(n) => Ok(n),
        None => Err(vm.type_error("an integer", value)),
    }
}

/// Owned copy of a string argument.
pub(crate) fn expect_string(vm: &mut Vm, value: Value) -> VmResult<String> {
    match vm.heap().value_str(value) {
        Some(text) => Ok(text.to_string()),
        None => Err(vm.type_error("a string", value)),
    }
}

pub(crate) fn expect_array(vm: &mut Vm, value: Value) -> VmResult<ObjRef> {
    match value.as_obj().filter(|r| vm.heap().as_array(*r).is_some()) {
        Some(r) => Ok(r),
        None => Err(vm.type_error("an array", value)),
    }
}

pub(crate) fn expect_dict(vm: &mut Vm, value: Value) -> VmResult<ObjRef> {
    match value.as_obj().filter(|r| vm.heap().as_dict(*r).is_some()) {
        Some(r) => Ok(r),
        None => Err(vm.type_error("a dictionary", value)),
    }
}

/// Append to an array that is known to exist.
pub(crate) fn push_item(vm: &mut Vm, array: ObjRef, item: Value) {
    if let Some(a) = vm.heap.as_array_mut(array) {
        a.items.push(item);
    }
}
