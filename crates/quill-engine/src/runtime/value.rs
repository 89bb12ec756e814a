// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script value representation.

use crate::gc::ObjRef;

/// A script value.
///
/// Values are plain tagged scalars. Heap data is reached through
/// [`ObjRef`] handles which never own the object: the heap does.
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    /// null
    #[default]
    Null,
    /// The "no value" sentinel for unset slots and absent results.
    Empty,
    /// Boolean value
    Bool(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// Reference to a heap object
    Obj(ObjRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Empty, Value::Empty) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            // Strings are interned, so identity is content equality.
            (Value::Obj(a), Value::Obj(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Returns true for null or empty.
    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Null | Value::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }

    /// Number that is an exact integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    /// Key identity used by hash tables: numbers compare by bit pattern
    /// (with `-0` folded into `0`) so that `NaN` keys remain reachable.
    pub fn same_key(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => fold_zero(*a).to_bits() == fold_zero(*b).to_bits(),
            _ => self == other,
        }
    }
}

pub(crate) fn fold_zero(n: f64) -> f64 {
    if n == 0.0 { 0.0 } else { n }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_equality() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert!(Value::Number(f64::NAN).same_key(&Value::Number(f64::NAN)));
        assert!(Value::Number(-0.0).same_key(&Value::Number(0.0)));
    }

    #[test]
    fn test_sentinels_are_distinct() {
        assert_ne!(Value::Null, Value::Empty);
        assert!(Value::Null.is_nothing());
        assert!(Value::Empty.is_nothing());
        assert!(!Value::Bool(false).is_nothing());
    }

    #[test]
    fn test_as_integer() {
        assert_eq!(Value::Number(3.0).as_integer(), Some(3));
        assert_eq!(Value::Number(-2.0).as_integer(), Some(-2));
        assert_eq!(Value::Number(2.5).as_integer(), None);
        assert_eq!(Value::Null.as_integer(), None);
    }
}
