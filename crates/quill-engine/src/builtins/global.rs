// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Global functions.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use quill_macros::{arity, bail};

use super::Builtin;
use crate::runtime::format::parse_number;
use crate::runtime::{NativeCall, Obj, Value};
use crate::vm::{Vm, VmResult};

pub(super) const FUNCTIONS: &[(&str, Builtin)] = &[
    ("print", print),
    ("println", println),
    ("typeof", type_of),
    ("len", len),
    ("to_string", to_string),
    ("to_number", to_number),
    ("time", time),
];

pub(super) fn install(vm: &mut Vm) {
    for &(name, func) in FUNCTIONS {
        vm.define_native(name, func);
    }
}

fn write_args(vm: &mut Vm, call: &NativeCall, newline: bool) -> VmResult<Value> {
    let mut parts = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        parts.push(vm.to_display(*arg)?);
    }
    let mut text = parts.join(" ");
    if newline {
        text.push('\n');
    }
    if let Err(e) = vm.out.write_all(text.as_bytes()).and_then(|()| vm.out.flush()) {
        bail!(vm, "Cannot write output: {}", e);
    }
    Ok(Value::Null)
}

fn print(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    write_args(vm, call, false)
}

fn println(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    write_args(vm, call, true)
}

fn type_of(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let name = vm.type_name(call.arg(0));
    Ok(vm.string_value(name))
}

pub(super) fn length_of(vm: &Vm, value: Value) -> Option<usize> {
    match vm.heap().get(value.as_obj()?) {
        Obj::String(s) => Some(s.char_len()),
        Obj::Array(a) => Some(a.items.len()),
        Obj::Dict(d) => Some(d.len()),
        Obj::Range(r) => Some(r.len()),
        _ => None,
    }
}

fn len(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    match length_of(vm, call.arg(0)) {
        Some(n) => Ok(Value::Number(n as f64)),
        None => Err(vm.type_error("a string, array, dict or range", call.arg(0))),
    }
}

fn to_string(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let text = vm.to_display(call.arg(0))?;
    Ok(vm.string_value(&text))
}

fn to_number(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let value = call.arg(0);
    match value {
        Value::Number(_) => Ok(value),
        Value::Bool(b) => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
        _ => {
            let Some(text) = vm.heap().value_str(value).map(str::to_string) else {
                return Err(vm.type_error("a string or number", value));
            };
            match parse_number(&text) {
                Some(n) => Ok(Value::Number(n)),
                None => bail!(vm, "Cannot convert '{}' to a number.", text),
            }
        }
    }
}

fn time(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64());
    Ok(Value::Number(seconds))
}
