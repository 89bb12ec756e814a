// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Operators and value conversions.

use std::cmp::Ordering;

use super::{Vm, VmResult};
use crate::compiler::OpCode;
use crate::runtime::format::{format_number, quote};
use crate::runtime::{Array, Obj, Value};

/// Containers nested deeper than this render as `...`.
const MAX_RENDER_DEPTH: usize = 32;
/// Upper bound on the byte length of a repeated string.
const MAX_REPEAT_BYTES: usize = 1 << 28;

impl Vm {
    /// Script-visible type name of a value.
    pub fn type_name(&self, value: Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Empty => "empty",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Obj(r) => self.heap.get(r).type_name(),
        }
    }

    /// `null`, empty, `false`, `0`, `NaN` and `""` are falsey.
    pub fn is_falsey(&self, value: Value) -> bool {
        match value {
            Value::Null | Value::Empty => true,
            Value::Bool(b) => !b,
            Value::Number(n) => n == 0.0 || n.is_nan(),
            Value::Obj(r) => matches!(self.heap.get(r), Obj::String(s) if s.chars.is_empty()),
        }
    }

    /// Apply a binary operator to the top two stack values, replacing them
    /// with the result. Operands stay on the stack while the result is built.
    pub(crate) fn binary(&mut self, op: OpCode) -> VmResult<()> {
        let (a, b) = (self.peek(1), self.peek(0));
        let result = match op {
            OpCode::Equal => Value::Bool(a == b),
            OpCode::NotEqual => Value::Bool(a != b),
            OpCode::Greater => Value::Bool(self.compare(a, b)? == Some(Ordering::Greater)),
            OpCode::GreaterEqual => Value::Bool(matches!(
                self.compare(a, b)?,
                Some(Ordering::Greater | Ordering::Equal)
            )),
            OpCode::Less => Value::Bool(self.compare(a, b)? == Some(Ordering::Less)),
            OpCode::LessEqual => Value::Bool(matches!(
                self.compare(a, b)?,
                Some(Ordering::Less | Ordering::Equal)
            )),
            OpCode::Add => self.add(a, b)?,
            OpCode::Multiply => self.multiply(a, b)?,
            OpCode::InstanceOf => match b {
                Value::Obj(class) if self.heap.as_class(class).is_some() => {
                    Value::Bool(self.is_instance_of(a, class))
                }
                _ => return Err(self.error("Right operand of 'instanceof' must be a class.")),
            },
            _ => {
                let (x, y) = self.numbers(op, a, b)?;
                Value::Number(arithmetic(op, x, y))
            }
        };
        self.stack.truncate(self.stack.len() - 2);
        self.push(result);
        Ok(())
    }

    fn numbers(&mut self, op: OpCode, a: Value, b: Value) -> VmResult<(f64, f64)> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok((x, y)),
            _ => Err(self.operand_error(op, a, b)),
        }
    }

    fn operand_error(&mut self, op: OpCode, a: Value, b: Value) -> super::Throw {
        let (a, b) = (self.type_name(a), self.type_name(b));
        self.error(format!(
            "Unsupported operand types for {}: {a} and {b}.",
            symbol(op)
        ))
    }

    fn compare(&mut self, a: Value, b: Value) -> VmResult<Option<Ordering>> {
        if let (Value::Number(x), Value::Number(y)) = (a, b) {
            return Ok(x.partial_cmp(&y));
        }
        if let (Some(x), Some(y)) = (self.heap.value_str(a), self.heap.value_str(b)) {
            return Ok(Some(x.cmp(y)));
        }
        Err(self.operand_error(OpCode::Less, a, b))
    }

    fn add(&mut self, a: Value, b: Value) -> VmResult<Value> {
        if let (Value::Number(x), Value::Number(y)) = (a, b) {
            return Ok(Value::Number(x + y));
        }
        if self.heap.value_str(a).is_some() || self.heap.value_str(b).is_some() {
            let mut text = self.to_display(a)?;
            text.push_str(&self.to_display(b)?);
            return Ok(self.string_value(&text));
        }
        if let (Some(x), Some(y)) = (self.array_items(a), self.array_items(b)) {
            let items = [x, y].concat();
            return Ok(Value::Obj(self.alloc(Obj::Array(Array { items }))));
        }
        Err(self.operand_error(OpCode::Add, a, b))
    }

    fn multiply(&mut self, a: Value, b: Value) -> VmResult<Value> {
        if let (Value::Number(x), Value::Number(y)) = (a, b) {
            return Ok(Value::Number(x * y));
        }
        if let (Some(len), Some(count)) = (self.heap.value_str(a).map(str::len), b.as_integer()) {
            if count >= 0 {
                let count = self.check_repeat(len, count)?;
                let repeated = self.heap.value_str(a).unwrap_or_default().repeat(count);
                return Ok(self.string_value(&repeated));
            }
        }
        Err(self.operand_error(OpCode::Multiply, a, b))
    }

    /// Validate a repetition of a `len`-byte string and return the count.
    pub(crate) fn check_repeat(&mut self, len: usize, count: i64) -> VmResult<usize> {
        let count = usize::try_from(count).ok();
        match count.and_then(|c| len.checked_mul(c).map(|total| (c, total))) {
            Some((count, total)) if total <= MAX_REPEAT_BYTES => Ok(count),
            _ => Err(self.error("String repetition too large.")),
        }
    }

    pub(crate) fn array_items(&self, value: Value) -> Option<Vec<Value>> {
        let r = value.as_obj()?;
        self.heap.as_array(r).map(|array| array.items.clone())
    }

    pub(crate) fn negate(&mut self) -> VmResult<()> {
        match self.peek(0) {
            Value::Number(n) => {
                self.set_top(Value::Number(-n));
                Ok(())
            }
            other => Err(self.type_error("a number", other)),
        }
    }

    pub(crate) fn bit_not(&mut self) -> VmResult<()> {
        match self.peek(0) {
            Value::Number(n) => {
                self.set_top(Value::Number(!(n as i64) as f64));
                Ok(())
            }
            other => Err(self.type_error("a number", other)),
        }
    }

    /// Text of a value as `echo` prints it: strings unquoted, `@to_string`
    /// honoured.
    pub fn to_display(&mut self, value: Value) -> VmResult<String> {
        self.render(value, false, 0)
    }

    fn render(&mut self, value: Value, nested: bool, depth: usize) -> VmResult<String> {
        let Value::Obj(r) = value else {
            return Ok(self.describe(value));
        };
        match self.heap.get(r) {
            Obj::String(s) if nested => Ok(quote(s.as_str())),
            Obj::String(s) => Ok(s.as_str().to_string()),
            Obj::Array(array) => {
                if depth >= MAX_RENDER_DEPTH {
                    return Ok("[...]".to_string());
                }
                let items = array.items.clone();
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(self.render(item, true, depth + 1)?);
                }
                Ok(format!("[{}]", parts.join(", ")))
            }
            Obj::Dict(dict) => {
                if depth >= MAX_RENDER_DEPTH {
                    return Ok("{...}".to_string());
                }
                let entries: Vec<(Value, Value)> = dict
                    .keys
                    .iter()
                    .map(|key| (*key, dict.get(*key).unwrap_or_default()))
                    .collect();
                let mut parts = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    let key = self.render(key, true, depth + 1)?;
                    let item = self.render(item, true, depth + 1)?;
                    parts.push(format!("{key}: {item}"));
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            Obj::Instance(instance) => {
                let hook = self.find_method(instance.class, Value::Obj(self.names.to_string));
                match hook {
                    Some(method) => {
                        let result = self.call_method(value, method.value, &[])?;
                        match self.heap.value_str(result) {
                            Some(text) => Ok(text.to_string()),
                            None => Err(self.error("@to_string() must return a string.")),
                        }
                    }
                    None => Ok(self.describe(value)),
                }
            }
            _ => Ok(self.describe(value)),
        }
    }

    /// Text of a value without running any script code.
    pub fn describe(&self, value: Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Empty => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(n),
            Value::Obj(r) => match self.heap.get(r) {
                Obj::String(s) => s.as_str().to_string(),
                Obj::Function(f) => format!("<function {}>", self.function_name(f.name)),
                Obj::Closure(c) => self.describe(Value::Obj(c.function)),
                Obj::Native(n) => format!("<native function {}>", n.name),
                Obj::BoundMethod(b) => self.describe(b.method),
                Obj::Class(c) => format!("<class {}>", self.heap.str(c.name)),
                Obj::Instance(i) => {
                    let class = self.heap.as_class(i.class).map_or("?", |c| self.heap.str(c.name));
                    format!("<{class} instance>")
                }
                Obj::Array(a) => format!("<array({})>", a.items.len()),
                Obj::Dict(d) => format!("<dict({})>", d.len()),
                Obj::Range(range) => format!("<range {}..{}>", range.lower, range.upper),
                Obj::Module(m) => format!("<module {}>", self.heap.str(m.name)),
                Obj::Upvalue(_) => "<upvalue>".to_string(),
                Obj::Accessor(_) => "<accessor>".to_string(),
            },
        }
    }
}

fn arithmetic(op: OpCode, x: f64, y: f64) -> f64 {
    match op {
        OpCode::Subtract => x - y,
        OpCode::Divide => x / y,
        OpCode::Modulo => x % y,
        OpCode::Power => x.powf(y),
        OpCode::BitAnd => ((x as i64) & (y as i64)) as f64,
        OpCode::BitOr => ((x as i64) | (y as i64)) as f64,
        OpCode::BitXor => ((x as i64) ^ (y as i64)) as f64,
        OpCode::ShiftLeft => (x as i64).wrapping_shl(y as u32 & 63) as f64,
        OpCode::ShiftRight => (x as i64).wrapping_shr(y as u32 & 63) as f64,
        other => unreachable!("{} is not an arithmetic operator", other.mnemonic()),
    }
}

fn symbol(op: OpCode) -> &'static str {
    match op {
        OpCode::Add => "+",
        OpCode::Subtract => "-",
        OpCode::Multiply => "*",
        OpCode::Divide => "/",
        OpCode::Modulo => "%",
        OpCode::Power => "**",
        OpCode::BitAnd => "&",
        OpCode::BitOr => "|",
        OpCode::BitXor => "^",
        OpCode::ShiftLeft => "<<",
        OpCode::ShiftRight => ">>",
        _ => "comparison",
    }
}
