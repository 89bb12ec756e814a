// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Heap object types.

use std::mem::size_of;

use super::function::{BoundMethod, Closure, Function, Native, Upvalue};
use super::table::Table;
use super::value::Value;
use crate::gc::ObjRef;

/// Every kind of heap object.
pub enum Obj {
    String(StringObj),
    Function(Function),
    Closure(Closure),
    Upvalue(Upvalue),
    Native(Native),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
    Array(Array),
    Dict(Dict),
    Range(Range),
    Module(Module),
    Accessor(Accessor),
}

impl Obj {
    /// Script-visible type name, as returned by `typeof`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "string",
            Obj::Function(_) | Obj::Closure(_) | Obj::Native(_) | Obj::BoundMethod(_) => "function",
            Obj::Upvalue(_) => "upvalue",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::Array(_) => "array",
            Obj::Dict(_) => "dict",
            Obj::Range(_) => "range",
            Obj::Module(_) => "module",
            Obj::Accessor(_) => "accessor",
        }
    }

    /// Approximate footprint charged to the collector.
    pub fn byte_size(&self) -> usize {
        let extra = match self {
            Obj::String(s) => s.chars.len(),
            Obj::Function(f) => {
                f.blob.code.len() * 8 + f.blob.constants.len() * size_of::<Value>()
            }
            Obj::Closure(c) => c.upvalues.len() * size_of::<ObjRef>(),
            Obj::Class(c) => {
                c.methods.byte_size()
                    + c.static_methods.byte_size()
                    + c.static_props.byte_size()
                    + c.fields.byte_size()
            }
            Obj::Instance(i) => i.fields.byte_size(),
            Obj::Array(a) => a.items.capacity() * size_of::<Value>(),
            Obj::Dict(d) => d.keys.capacity() * size_of::<Value>() + d.table.byte_size(),
            Obj::Module(m) => m.values.byte_size(),
            Obj::Upvalue(_)
            | Obj::Native(_)
            | Obj::BoundMethod(_)
            | Obj::Range(_)
            | Obj::Accessor(_) => 0,
        };
        size_of::<Obj>() + extra
    }
}

/// An interned string.
pub struct StringObj {
    pub chars: Box<str>,
    pub hash: u32,
}

impl StringObj {
    pub fn as_str(&self) -> &str {
        &self.chars
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        if self.chars.is_ascii() {
            self.chars.len()
        } else {
            self.chars.chars().count()
        }
    }
}

pub struct Class {
    pub name: ObjRef,
    pub superclass: Option<ObjRef>,
    pub methods: Table,
    pub static_methods: Table,
    pub static_props: Table,
    /// Copied into every new instance.
    pub fields: Table,
    pub initializer: Option<Value>,
    pub destructor: Option<Value>,
}

impl Class {
    pub fn new(name: ObjRef) -> Self {
        Self {
            name,
            superclass: None,
            methods: Table::new(),
            static_methods: Table::new(),
            static_props: Table::new(),
            fields: Table::new(),
            initializer: None,
            destructor: None,
        }
    }
}

pub struct Instance {
    pub class: ObjRef,
    pub fields: Table,
}

#[derive(Default)]
pub struct Array {
    pub items: Vec<Value>,
}

/// Insertion-ordered dictionary.
#[derive(Default)]
pub struct Dict {
    pub keys: Vec<Value>,
    pub table: Table,
}

impl Dict {
    pub fn get(&self, key: Value) -> Option<Value> {
        self.table.get_value(key)
    }

    pub fn set(&mut self, key: Value, value: Value) {
        if self.table.set_value(key, value) {
            self.keys.push(key);
        }
    }

    pub fn remove(&mut self, key: Value) -> Option<Value> {
        let value = self.table.get_value(key)?;
        self.table.delete(key);
        self.keys.retain(|k| !k.same_key(&key));
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Half-open integer range `lower..upper`, counting down when `upper < lower`.
#[derive(Debug, Clone, Copy)]
pub struct Range {
    pub lower: i64,
    pub upper: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        self.upper.abs_diff(self.lower) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.lower == self.upper
    }

    pub fn nth(&self, n: usize) -> Option<i64> {
        if n >= self.len() {
            return None;
        }
        let n = n as i64;
        Some(if self.upper >= self.lower {
            self.lower + n
        } else {
            self.lower - n
        })
    }

    pub fn contains(&self, x: i64) -> bool {
        if self.upper >= self.lower {
            x >= self.lower && x < self.upper
        } else {
            x <= self.lower && x > self.upper
        }
    }
}

/// A named table of exported bindings.
pub struct Module {
    pub name: ObjRef,
    pub path: ObjRef,
    pub values: Table,
    /// False while the module body is still running.
    pub loaded: bool,
}

/// A getter/setter pair stored under one property name.
pub struct Accessor {
    pub getter: Option<Value>,
    pub setter: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_ascending() {
        let r = Range { lower: 1, upper: 4 };
        assert_eq!(r.len(), 3);
        assert_eq!(r.nth(0), Some(1));
        assert_eq!(r.nth(2), Some(3));
        assert_eq!(r.nth(3), None);
        assert!(r.contains(3));
        assert!(!r.contains(4));
    }

    #[test]
    fn test_range_descending() {
        let r = Range { lower: 3, upper: 0 };
        assert_eq!(r.len(), 3);
        assert_eq!(r.nth(1), Some(2));
        assert!(r.contains(1));
        assert!(!r.contains(0));
    }

    #[test]
    fn test_dict_keeps_insertion_order() {
        let mut dict = Dict::default();
        dict.set(Value::Number(3.0), Value::Null);
        dict.set(Value::Number(1.0), Value::Null);
        dict.set(Value::Number(3.0), Value::Bool(true));
        assert_eq!(dict.keys, vec![Value::Number(3.0), Value::Number(1.0)]);
        assert_eq!(dict.remove(Value::Number(3.0)), Some(Value::Bool(true)));
        assert_eq!(dict.keys, vec![Value::Number(1.0)]);
        assert_eq!(dict.remove(Value::Number(3.0)), None);
    }
}
