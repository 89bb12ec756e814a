// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Subscripts, slices and `for..in` iteration.
//!
//! Single-index reads outside the bounds give `null`, slices clamp to the
//! valid range, and writes outside the bounds raise. Negative indices count
//! from the end.

use super::{Vm, VmResult};
use crate::runtime::{Array, Obj, Value};

/// Resolve a possibly negative index against `len`.
fn normalize(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Clamp slice bounds to `0..=len`; an inverted range is empty.
fn clamp_bounds(lower: Option<i64>, upper: Option<i64>, len: usize) -> (usize, usize) {
    let clamp = |bound: i64| {
        let len = len as i64;
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(0, len) as usize
    };
    let lower = lower.map_or(0, clamp);
    let upper = upper.map_or(len, clamp);
    (lower, upper.max(lower))
}

fn char_at(text: &str, index: usize) -> Option<char> {
    if text.is_ascii() {
        text.as_bytes().get(index).map(|b| *b as char)
    } else {
        text.chars().nth(index)
    }
}

impl Vm {
    fn integer_index(&mut self, index: Value, what: &str) -> VmResult<i64> {
        match index.as_integer() {
            Some(i) => Ok(i),
            None => {
                let got = self.type_name(index);
                Err(self.error(format!("{what} index must be an integer, not {got}.")))
            }
        }
    }

    /// `target[index]`
    pub(crate) fn get_index(&mut self, target: Value, index: Value) -> VmResult<Value> {
        let Value::Obj(r) = target else {
            return Err(self.not_indexable(target));
        };
        match self.heap.get(r) {
            Obj::Array(array) => {
                let len = array.items.len();
                let i = self.integer_index(index, "Array")?;
                Ok(self.array_get(r, normalize(i, len)))
            }
            Obj::String(s) => {
                let len = s.char_len();
                let i = self.integer_index(index, "String")?;
                match normalize(i, len) {
                    Some(i) => {
                        let c = char_at(self.heap.str(r), i).unwrap_or_default();
                        Ok(self.string_value(c.encode_utf8(&mut [0; 4])))
                    }
                    None => Ok(Value::Null),
                }
            }
            Obj::Dict(dict) => Ok(dict.get(index).unwrap_or(Value::Null)),
            Obj::Range(range) => {
                let range = *range;
                let i = self.integer_index(index, "Range")?;
                Ok(normalize(i, range.len())
                    .and_then(|i| range.nth(i))
                    .map_or(Value::Null, |n| Value::Number(n as f64)))
            }
            Obj::Module(module) => Ok(module.values.get_value(index).unwrap_or(Value::Null)),
            _ => Err(self.not_indexable(target)),
        }
    }

    fn array_get(&self, array: crate::gc::ObjRef, index: Option<usize>) -> Value {
        index
            .and_then(|i| self.heap.as_array(array)?.items.get(i).copied())
            .unwrap_or(Value::Null)
    }

    /// `target[index] = value`
    pub(crate) fn set_index(&mut self, target: Value, index: Value, value: Value) -> VmResult<()> {
        let Value::Obj(r) = target else {
            return Err(self.not_indexable(target));
        };
        match self.heap.get(r) {
            Obj::Array(array) => {
                let len = array.items.len();
                let i = self.integer_index(index, "Array")?;
                match normalize(i, len) {
                    Some(slot) => {
                        if let Some(array) = self.heap.as_array_mut(r) {
                            array.items[slot] = value;
                        }
                        Ok(())
                    }
                    None => Err(self.error(format!("Array index {i} out of range."))),
                }
            }
            Obj::Dict(_) => {
                if index.is_empty() {
                    return Err(self.error("Dictionary key cannot be empty."));
                }
                if let Some(dict) = self.heap.as_dict_mut(r) {
                    dict.set(index, value);
                }
                Ok(())
            }
            Obj::String(_) => Err(self.error("Strings are immutable.")),
            _ => Err(self.not_indexable(target)),
        }
    }

    /// `target[lower:upper]`; an empty bound means the start or the end.
    pub(crate) fn get_ranged_index(&mut self, target: Value, lower: Value, upper: Value) -> VmResult<Value> {
        let bound = |vm: &mut Vm, value: Value| -> VmResult<Option<i64>> {
            match value {
                Value::Empty | Value::Null => Ok(None),
                other => vm.integer_index(other, "Slice").map(Some),
            }
        };
        let lower = bound(self, lower)?;
        let upper = bound(self, upper)?;
        let Value::Obj(r) = target else {
            return Err(self.not_indexable(target));
        };
        match self.heap.get(r) {
            Obj::Array(array) => {
                let (from, to) = clamp_bounds(lower, upper, array.items.len());
                let items = array.items[from..to].to_vec();
                Ok(Value::Obj(self.alloc(Obj::Array(Array { items }))))
            }
            Obj::String(s) => {
                let (from, to) = clamp_bounds(lower, upper, s.char_len());
                let slice: String = s.as_str().chars().skip(from).take(to - from).collect();
                Ok(self.string_value(&slice))
            }
            _ => Err(self.not_indexable(target)),
        }
    }

    fn not_indexable(&mut self, target: Value) -> super::Throw {
        let kind = self.type_name(target);
        self.error(format!("Cannot index a value of type {kind}."))
    }

    /// Number of positions `for..in` visits.
    fn iteration_len(&mut self, iterable: Value) -> VmResult<usize> {
        if let Value::Obj(r) = iterable {
            match self.heap.get(r) {
                Obj::Array(array) => return Ok(array.items.len()),
                Obj::String(s) => return Ok(s.char_len()),
                Obj::Dict(dict) => return Ok(dict.len()),
                Obj::Range(range) => return Ok(range.len()),
                _ => {}
            }
        }
        let kind = self.type_name(iterable);
        Err(self.error(format!("Cannot iterate over a value of type {kind}.")))
    }

    /// The cursor after `cursor`, or empty once iteration is done.
    pub(crate) fn iter_next(&mut self, iterable: Value, cursor: Value) -> VmResult<Value> {
        let len = self.iteration_len(iterable)?;
        let next = match cursor {
            Value::Number(n) => n as usize + 1,
            _ => 0,
        };
        Ok(if next < len {
            Value::Number(next as f64)
        } else {
            Value::Empty
        })
    }

    /// Key at `cursor`: the position, or the dict key.
    pub(crate) fn iter_key(&mut self, iterable: Value, cursor: Value) -> VmResult<Value> {
        let position = cursor.as_number().unwrap_or(0.0) as usize;
        if let Some(dict) = iterable.as_obj().and_then(|r| self.heap.as_dict(r)) {
            return Ok(dict.keys.get(position).copied().unwrap_or(Value::Null));
        }
        Ok(cursor)
    }

    /// Value at `cursor`. Dicts yield their keys.
    pub(crate) fn iter_value(&mut self, iterable: Value, cursor: Value) -> VmResult<Value> {
        let position = cursor.as_number().unwrap_or(0.0) as usize;
        let Value::Obj(r) = iterable else {
            return Ok(Value::Null);
        };
        match self.heap.get(r) {
            Obj::Dict(dict) => Ok(dict.keys.get(position).copied().unwrap_or(Value::Null)),
            Obj::Range(range) => Ok(range
                .nth(position)
                .map_or(Value::Null, |n| Value::Number(n as f64))),
            Obj::String(_) => self.get_index(iterable, cursor),
            _ => Ok(self.array_get(r, Some(position))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(0, 3), Some(0));
        assert_eq!(normalize(-1, 3), Some(2));
        assert_eq!(normalize(3, 3), None);
        assert_eq!(normalize(-4, 3), None);
        assert_eq!(normalize(0, 0), None);
    }

    #[test]
    fn test_clamp_bounds() {
        assert_eq!(clamp_bounds(None, None, 5), (0, 5));
        assert_eq!(clamp_bounds(Some(1), Some(99), 5), (1, 5));
        assert_eq!(clamp_bounds(Some(-2), None, 5), (3, 5));
        assert_eq!(clamp_bounds(Some(4), Some(2), 5), (4, 4));
        assert_eq!(clamp_bounds(Some(-99), Some(2), 5), (0, 2));
    }

    #[test]
    fn test_char_at() {
        assert_eq!(char_at("abc", 1), Some('b'));
        assert_eq!(char_at("héllo", 1), Some('é'));
        assert_eq!(char_at("abc", 5), None);
    }
}
