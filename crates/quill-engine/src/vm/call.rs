// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Calling convention.
//!
//! The caller pushes the callee followed by its arguments. A script call
//! pushes a frame whose slot 0 is the callee's stack position; a native call
//! completes immediately. Either way the single result ends up where the
//! callee was.

use super::{Throw, Vm, VmResult};
use crate::gc::ObjRef;
use crate::runtime::{
    Array, CallFrame, Instance, NativeCall, Obj, Property, Upvalue, UpvalueState, Value,
};

/// A static property or method found on a class.
#[derive(Debug, Clone, Copy)]
pub(crate) enum StaticMember {
    Field(Value),
    Method(Value),
}

impl Vm {
    /// Call `callee` with `args` and run it to completion.
    pub fn call_value(&mut self, callee: Value, args: &[Value]) -> VmResult<Value> {
        let base = self.stack.len();
        self.stack.push(callee);
        self.stack.extend_from_slice(args);
        let depth = self.frames.len();
        if let Err(thrown) = self.call(callee, args.len()) {
            self.stack.truncate(base);
            return Err(thrown);
        }
        self.complete_call(base, depth)
    }

    /// Call `method` with `receiver` as `this`.
    pub fn call_method(&mut self, receiver: Value, method: Value, args: &[Value]) -> VmResult<Value> {
        let base = self.stack.len();
        self.stack.push(receiver);
        self.stack.extend_from_slice(args);
        let depth = self.frames.len();
        if let Err(thrown) = self.call_bound(method, receiver, args.len()) {
            self.stack.truncate(base);
            return Err(thrown);
        }
        self.complete_call(base, depth)
    }

    fn complete_call(&mut self, base: usize, depth: usize) -> VmResult<Value> {
        if self.frames.len() > depth {
            // A script frame was pushed: run it until it returns here.
            return self.run(depth);
        }
        let result = self.stack.get(base).copied().unwrap_or_default();
        self.stack.truncate(base);
        Ok(result)
    }

    /// Call the value sitting `argc` slots below the top of the stack.
    pub(crate) fn call(&mut self, callee: Value, argc: usize) -> VmResult<()> {
        let Value::Obj(r) = callee else {
            return Err(self.not_callable(callee));
        };
        match self.heap.get(r) {
            Obj::Closure(_) => self.call_closure(r, argc),
            Obj::Native(_) => self.call_native(r, Value::Null, argc),
            Obj::Class(_) => self.instantiate(r, argc),
            Obj::BoundMethod(bound) => {
                let (receiver, method) = (bound.receiver, bound.method);
                self.call_bound(method, receiver, argc)
            }
            _ => Err(self.not_callable(callee)),
        }
    }

    /// Call `method` with `receiver` in slot 0.
    pub(crate) fn call_bound(&mut self, method: Value, receiver: Value, argc: usize) -> VmResult<()> {
        let slot = self.stack.len() - argc - 1;
        self.stack[slot] = receiver;
        match method {
            Value::Obj(r) => match self.heap.get(r) {
                Obj::Closure(_) => self.call_closure(r, argc),
                Obj::Native(_) => self.call_native(r, receiver, argc),
                _ => {
                    self.stack[slot] = method;
                    self.call(method, argc)
                }
            },
            _ => Err(self.not_callable(method)),
        }
    }

    fn not_callable(&mut self, value: Value) -> Throw {
        let kind = self.type_name(value);
        self.error(format!("Can only call functions and classes, not {kind}."))
    }

    fn call_closure(&mut self, closure: ObjRef, argc: usize) -> VmResult<()> {
        let function = match self.heap.as_closure(closure) {
            Some(c) => c.function,
            None => unreachable!("closure expected"),
        };
        let Some(f) = self.heap.as_function(function) else {
            unreachable!("closure over a non-function");
        };
        let (arity, required, variadic) = (f.arity, f.required, f.variadic);
        let (blob, module, name) = (f.blob.clone(), f.module, f.name);
        let base = self.stack.len() - argc - 1;

        if argc > arity && !variadic {
            let name = self.function_name(name);
            return Err(self.arity_error(&name, required, arity, argc));
        }
        if self.frames.len() >= self.config.max_frames {
            return Err(self.error("Stack overflow."));
        }

        for i in argc..arity {
            // Unset optional parameters read as empty so their default runs.
            let filler = if i < required { Value::Null } else { Value::Empty };
            self.stack.push(filler);
        }
        if variadic {
            let rest = self.alloc(Obj::Array(Array::default()));
            if argc > arity {
                let items = self.stack.split_off(self.stack.len() - (argc - arity));
                if let Some(array) = self.heap.as_array_mut(rest) {
                    array.items = items;
                }
            }
            self.stack.push(Value::Obj(rest));
        }

        self.frames.push(CallFrame::new(closure, blob, module, base));
        Ok(())
    }

    fn call_native(&mut self, native: ObjRef, this: Value, argc: usize) -> VmResult<()> {
        let Obj::Native(n) = self.heap.get(native) else {
            unreachable!("native expected");
        };
        let func = n.func.clone();
        let start = self.stack.len() - argc;
        let call = NativeCall {
            this,
            args: self.stack[start..].to_vec(),
            name: n.name.clone(),
        };
        let result = func(self, &call)?;
        self.stack.truncate(start - 1);
        self.stack.push(result);
        Ok(())
    }

    /// Create an instance and run the nearest constructor on it.
    fn instantiate(&mut self, class: ObjRef, argc: usize) -> VmResult<()> {
        let fields = match self.heap.as_class(class) {
            Some(c) => c.fields.clone(),
            None => unreachable!("class expected"),
        };
        let instance = Value::Obj(self.alloc(Obj::Instance(Instance { class, fields })));
        let slot = self.stack.len() - argc - 1;
        self.stack[slot] = instance;

        match self.find_initializer(class) {
            Some(init) => {
                let is_native = matches!(init, Value::Obj(r) if matches!(self.heap.get(r), Obj::Native(_)));
                self.call_bound(init, instance, argc)?;
                if is_native {
                    // Native constructors return nothing useful.
                    self.set_top(instance);
                }
                Ok(())
            }
            None if argc > 0 => {
                let name = self.heap.as_class(class).map(|c| c.name);
                let name = self.function_name(name);
                Err(self.arity_error(&name, 0, 0, argc))
            }
            None => Ok(()),
        }
    }

    fn find_initializer(&self, mut class: ObjRef) -> Option<Value> {
        loop {
            let c = self.heap.as_class(class)?;
            if c.initializer.is_some() {
                return c.initializer;
            }
            class = c.superclass?;
        }
    }

    /// Look a method up along the superclass chain.
    pub(crate) fn find_method(&self, mut class: ObjRef, name: Value) -> Option<Property> {
        loop {
            let c = self.heap.as_class(class)?;
            if let Some(prop) = c.methods.get(name) {
                return Some(prop);
            }
            class = c.superclass?;
        }
    }

    /// Look a static member up along the superclass chain.
    pub(crate) fn find_static(&self, mut class: ObjRef, name: Value) -> Option<StaticMember> {
        loop {
            let c = self.heap.as_class(class)?;
            if let Some(value) = c.static_props.get_value(name) {
                return Some(StaticMember::Field(value));
            }
            if let Some(method) = c.static_methods.get_value(name) {
                return Some(StaticMember::Method(method));
            }
            class = c.superclass?;
        }
    }

    pub(crate) fn is_subclass(&self, mut class: ObjRef, ancestor: ObjRef) -> bool {
        loop {
            if class == ancestor {
                return true;
            }
            match self.heap.as_class(class).and_then(|c| c.superclass) {
                Some(superclass) => class = superclass,
                None => return false,
            }
        }
    }

    pub(crate) fn is_instance_of(&self, value: Value, class: ObjRef) -> bool {
        match value {
            Value::Obj(r) => match self.heap.as_instance(r) {
                Some(instance) => self.is_subclass(instance.class, class),
                None => false,
            },
            _ => false,
        }
    }

    pub(crate) fn function_name(&self, name: Option<ObjRef>) -> String {
        match name {
            Some(name) => self.heap.str(name).to_string(),
            None => "<script>".to_string(),
        }
    }

    /// Find or create the upvalue aliasing stack `slot`.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let position = self.open_upvalues.partition_point(|u| self.upvalue_slot(*u) < slot);
        if let Some(existing) = self.open_upvalues.get(position) {
            if self.upvalue_slot(*existing) == slot {
                return *existing;
            }
        }
        let upvalue = self.alloc(Obj::Upvalue(Upvalue {
            state: UpvalueState::Open(slot),
        }));
        self.open_upvalues.insert(position, upvalue);
        upvalue
    }

    fn upvalue_slot(&self, upvalue: ObjRef) -> usize {
        match self.heap.get(upvalue) {
            Obj::Upvalue(u) => u.slot().unwrap_or(usize::MAX),
            _ => usize::MAX,
        }
    }

    /// Close every open upvalue at or above `from`.
    pub(crate) fn close_upvalues(&mut self, from: usize) {
        while let Some(&upvalue) = self.open_upvalues.last() {
            let slot = self.upvalue_slot(upvalue);
            if slot < from {
                break;
            }
            let value = self.stack[slot];
            if let Obj::Upvalue(u) = self.heap.get_mut(upvalue) {
                u.state = UpvalueState::Closed(value);
            }
            self.open_upvalues.pop();
        }
    }

    pub(crate) fn read_upvalue(&self, upvalue: ObjRef) -> Value {
        match self.heap.get(upvalue) {
            Obj::Upvalue(u) => match u.state {
                UpvalueState::Open(slot) => self.stack[slot],
                UpvalueState::Closed(value) => value,
            },
            _ => unreachable!("upvalue expected"),
        }
    }

    pub(crate) fn write_upvalue(&mut self, upvalue: ObjRef, value: Value) {
        let open = match self.heap.get_mut(upvalue) {
            Obj::Upvalue(u) => match &mut u.state {
                UpvalueState::Open(slot) => Some(*slot),
                UpvalueState::Closed(closed) => {
                    *closed = value;
                    None
                }
            },
            _ => unreachable!("upvalue expected"),
        };
        if let Some(slot) = open {
            self.stack[slot] = value;
        }
    }
}
