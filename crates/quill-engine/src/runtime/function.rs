// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Function, closure and call-frame representation.

use std::fmt;
use std::rc::Rc;

use super::value::Value;
use crate::compiler::Blob;
use crate::gc::ObjRef;
use crate::vm::{Vm, VmResult};

/// What a compiled function was declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Top-level code of a module
    Script,
    Function,
    Method,
    /// A class constructor; implicitly returns `this`
    Initializer,
    /// A method whose name starts with `_`
    Private,
}

impl FunctionKind {
    /// Whether slot 0 holds `this`.
    pub fn has_receiver(self) -> bool {
        matches!(
            self,
            FunctionKind::Method | FunctionKind::Initializer | FunctionKind::Private
        )
    }
}

/// Where a closure finds one captured variable when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Slot (if `is_local`) or upvalue index in the enclosing function
    pub index: u16,
    /// Whether this is a local in the immediately enclosing function
    pub is_local: bool,
}

/// A compiled function.
pub struct Function {
    pub name: Option<ObjRef>,
    pub kind: FunctionKind,
    /// Declared parameters, excluding a rest parameter.
    pub arity: usize,
    /// Leading parameters without a default value.
    pub required: usize,
    /// Whether the last parameter collects surplus arguments.
    pub variadic: bool,
    pub upvalues: Vec<UpvalueDesc>,
    pub blob: Rc<Blob>,
    /// Module whose bindings serve as this function's globals
    pub module: ObjRef,
}

impl Function {
    /// Number of stack slots the parameters take, including a rest array.
    pub fn param_slots(&self) -> usize {
        self.arity + self.variadic as usize
    }
}

/// A function paired with its captured variables.
pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

#[derive(Debug, Clone, Copy)]
pub enum UpvalueState {
    /// Aliases an absolute operand-stack slot.
    Open(usize),
    Closed(Value),
}

/// A captured variable shared by every closure that captured it.
pub struct Upvalue {
    pub state: UpvalueState,
}

impl Upvalue {
    pub fn slot(&self) -> Option<usize> {
        match self.state {
            UpvalueState::Open(slot) => Some(slot),
            UpvalueState::Closed(_) => None,
        }
    }
}

/// Everything a native function sees of its invocation.
pub struct NativeCall {
    pub this: Value,
    pub args: Vec<Value>,
    pub name: Rc<str>,
}

impl NativeCall {
    /// Argument `i`, or null when absent.
    pub fn arg(&self, i: usize) -> Value {
        self.args.get(i).copied().unwrap_or(Value::Null)
    }
}

/// A native (Rust) function.
///
/// Closures may capture host state; this replaces an untyped user pointer.
pub type NativeFn = Rc<dyn Fn(&mut Vm, &NativeCall) -> VmResult<Value>>;

pub struct Native {
    pub name: Rc<str>,
    pub func: NativeFn,
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A method pulled off its receiver without being called.
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Value,
}

/// Progress through one try region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TryState {
    /// Executing the protected body
    Running,
    /// Executing the catch block
    Catching,
    /// Executing the finally block; `resume` is rethrown when it completes
    Finalizing { resume: Option<Value> },
}

/// An active try region inside one frame.
#[derive(Debug, Clone, Copy)]
pub struct Handler {
    /// Exception class to match, or `None` for a wildcard catch.
    pub class: Option<ObjRef>,
    pub catch_ip: Option<usize>,
    pub finally_ip: Option<usize>,
    /// Operand-stack height when the region was entered.
    pub stack_height: usize,
    pub state: TryState,
}

/// A call frame for function execution.
pub struct CallFrame {
    pub closure: ObjRef,
    /// Shared with the function object, so reading code never touches the heap.
    pub blob: Rc<Blob>,
    pub module: ObjRef,
    /// Instruction pointer within this function
    pub ip: usize,
    /// Absolute stack index of slot 0
    pub base: usize,
    pub handlers: Vec<Handler>,
}

impl CallFrame {
    pub fn new(closure: ObjRef, blob: Rc<Blob>, module: ObjRef, base: usize) -> Self {
        Self {
            closure,
            blob,
            module,
            ip: 0,
            base,
            handlers: Vec::new(),
        }
    }

    /// Source line of the instruction that was executing.
    pub fn current_line(&self) -> u32 {
        self.blob.line_at(self.ip.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_kind_receiver() {
        assert!(FunctionKind::Method.has_receiver());
        assert!(FunctionKind::Initializer.has_receiver());
        assert!(FunctionKind::Private.has_receiver());
        assert!(!FunctionKind::Function.has_receiver());
        assert!(!FunctionKind::Script.has_receiver());
    }

    #[test]
    fn test_native_call_arg() {
        let call = NativeCall {
            this: Value::Null,
            args: vec![Value::Number(1.0)],
            name: Rc::from("f"),
        };
        assert_eq!(call.arg(0), Value::Number(1.0));
        assert_eq!(call.arg(3), Value::Null);
    }

    #[test]
    fn test_upvalue_slot() {
        let open = Upvalue {
            state: UpvalueState::Open(4),
        };
        let closed = Upvalue {
            state: UpvalueState::Closed(Value::Bool(true)),
        };
        assert_eq!(open.slot(), Some(4));
        assert_eq!(closed.slot(), None);
    }
}
