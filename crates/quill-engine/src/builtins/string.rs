// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! String methods. Strings are immutable; every transformation interns a
//! new string.

use quill_macros::{arity, bail, ensure};

use super::{expect_integer, expect_string, push_item};
use crate::runtime::format::parse_number;
use crate::runtime::{NativeCall, Value};
use crate::vm::{Vm, VmResult};

pub(super) fn install(vm: &mut Vm) {
    let class = vm.classes.string;
    vm.define_computed(class, "length", length);
    vm.define_method(class, "upper", upper);
    vm.define_method(class, "lower", lower);
    vm.define_method(class, "trim", trim);
    vm.define_method(class, "split", split);
    vm.define_method(class, "contains", contains);
    vm.define_method(class, "index_of", index_of);
    vm.define_method(class, "starts_with", starts_with);
    vm.define_method(class, "ends_with", ends_with);
    vm.define_method(class, "replace", replace);
    vm.define_method(class, "repeat", repeat);
    vm.define_method(class, "chars", chars);
    vm.define_method(class, "to_number", to_number);
}

fn this(vm: &mut Vm, call: &NativeCall) -> VmResult<String> {
    expect_string(vm, call.this)
}

fn length(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    let text = this(vm, call)?;
    Ok(Value::Number(text.chars().count() as f64))
}

fn upper(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let text = this(vm, call)?.to_uppercase();
    Ok(vm.string_value(&text))
}

fn lower(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let text = this(vm, call)?.to_lowercase();
    Ok(vm.string_value(&text))
}

fn trim(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let text = this(vm, call)?;
    Ok(vm.string_value(text.trim()))
}

/// `split(separator)`; an empty separator splits into characters and no
/// separator splits on whitespace.
fn split(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0..=1);
    let text = this(vm, call)?;
    let parts: Vec<String> = match call.arg(0) {
        Value::Null | Value::Empty => text.split_whitespace().map(str::to_string).collect(),
        separator => {
            let separator = expect_string(vm, separator)?;
            if separator.is_empty() {
                text.chars().map(String::from).collect()
            } else {
                text.split(separator.as_str()).map(str::to_string).collect()
            }
        }
    };
    strings_to_array(vm, &parts)
}

fn strings_to_array(vm: &mut Vm, parts: &[String]) -> VmResult<Value> {
    let mut scope = vm.root_scope();
    let array = scope.new_array(Vec::with_capacity(parts.len()));
    scope.push_root(array);
    if let Some(r) = array.as_obj() {
        for part in parts {
            let value = scope.string_value(part);
            push_item(&mut scope, r, value);
        }
    }
    Ok(array)
}

fn contains(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let text = this(vm, call)?;
    let needle = expect_string(vm, call.arg(0))?;
    Ok(Value::Bool(text.contains(needle.as_str())))
}

/// Character position of the first match, or -1.
fn index_of(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let text = this(vm, call)?;
    let needle = expect_string(vm, call.arg(0))?;
    let index = text
        .find(needle.as_str())
        .map_or(-1.0, |byte| text[..byte].chars().count() as f64);
    Ok(Value::Number(index))
}

fn starts_with(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let text = this(vm, call)?;
    let prefix = expect_string(vm, call.arg(0))?;
    Ok(Value::Bool(text.starts_with(prefix.as_str())))
}

fn ends_with(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let text = this(vm, call)?;
    let suffix = expect_string(vm, call.arg(0))?;
    Ok(Value::Bool(text.ends_with(suffix.as_str())))
}

/// Replace every occurrence.
fn replace(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 2);
    let text = this(vm, call)?;
    let from = expect_string(vm, call.arg(0))?;
    let to = expect_string(vm, call.arg(1))?;
    ensure!(vm, !from.is_empty(), "Cannot replace an empty string.");
    let replaced = text.replace(from.as_str(), &to);
    Ok(vm.string_value(&replaced))
}

fn repeat(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 1);
    let text = this(vm, call)?;
    let count = expect_integer(vm, call.arg(0))?;
    ensure!(vm, count >= 0, "Repeat count must not be negative, got {}.", count);
    let count = vm.check_repeat(text.len(), count)?;
    Ok(vm.string_value(&text.repeat(count)))
}

fn chars(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let text = this(vm, call)?;
    let parts: Vec<String> = text.chars().map(String::from).collect();
    strings_to_array(vm, &parts)
}

fn to_number(vm: &mut Vm, call: &NativeCall) -> VmResult<Value> {
    arity!(vm, call, 0);
    let text = this(vm, call)?;
    match parse_number(&text) {
        Some(n) => Ok(Value::Number(n)),
        None => bail!(vm, "Cannot convert '{}' to a number.", text),
    }
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
    fn test_case_and_trim() {
        assert_eq!(eval("return \"Quill\".upper();"), "QUILL");
        assert_eq!(eval("return \"  pad \".trim().lower();"), "pad");
        assert_eq!(eval("return \"héllo\".length;"), "5");
    }

    #[test]
    fn test_split() {
        assert_eq!(eval("return \"a,b,c\".split(\",\");"), "['a', 'b', 'c']");
        assert_eq!(eval("return \"ab\".split(\"\");"), "['a', 'b']");
        assert_eq!(eval("return \" x  y \".split();"), "['x', 'y']");
    }

    #[test]
    fn test_search() {
        assert_eq!(eval("return \"héllo\".index_of(\"l\");"), "2");
        assert_eq!(eval("return \"abc\".index_of(\"z\");"), "-1");
        assert_eq!(eval("return \"abc\".starts_with(\"ab\") and \"abc\".ends_with(\"bc\");"), "true");
        assert_eq!(eval("return \"a-b-c\".replace(\"-\", \"+\");"), "a+b+c");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(eval("return \"0x10\".to_number();"), "16");
        assert_eq!(eval("return \"ab\".repeat(3);"), "ababab");
    }
}
