// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The dispatch loop.

use std::io::Write;

#[cfg(debug_assertions)]
use tracing::trace;

use super::{Throw, Vm, VmResult};
use crate::compiler::{ANY_EXCEPTION, OpCode, UNPATCHED};
use crate::gc::ObjRef;
use crate::runtime::{
    Accessor, Array, Class, Closure, Dict, FunctionKind, Handler, Obj, PropKind, Property, Range,
    TryState, Value,
};

impl Vm {
    /// Execute until the frame count drops back to `exit_depth`, returning
    /// the value of that last return. Exceptions not handled above
    /// `exit_depth` are handed back to the caller.
    pub(crate) fn run(&mut self, exit_depth: usize) -> VmResult<Value> {
        loop {
            match self.dispatch(exit_depth) {
                Ok(value) => return Ok(value),
                Err(thrown) => self.unwind(thrown, exit_depth)?,
            }
        }
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.blob.code[frame.ip].byte;
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let frame = self.frame_mut();
        let value = frame.blob.read_u16(frame.ip);
        frame.ip += 2;
        value
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_u16() as usize;
        self.frame().blob.constants[index]
    }

    fn read_name(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            other => unreachable!("name operand is not a string: {other:?}"),
        }
    }

    fn upvalue_at(&self, index: usize) -> ObjRef {
        match self.heap.as_closure(self.frame().closure) {
            Some(closure) => closure.upvalues[index],
            None => unreachable!("frame without a closure"),
        }
    }

    fn dispatch(&mut self, exit_depth: usize) -> VmResult<Value> {
        loop {
            // Instruction boundaries are the safe points for destructors.
            if !self.pending_finalizers.is_empty() {
                self.drain_finalizers();
            }

            let byte = self.read_byte();
            let Ok(op) = OpCode::try_from(byte) else {
                unreachable!("invalid opcode {byte}");
            };
            #[cfg(debug_assertions)]
            trace!(
                op = op.mnemonic(),
                ip = self.frame().ip - 1,
                depth = self.frames.len(),
                stack = self.stack.len(),
                "dispatch"
            );

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::Null => self.push(Value::Null),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Empty => self.push(Value::Empty),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::Dup => self.push(self.peek(0)),
                OpCode::DupTwo => {
                    self.push(self.peek(1));
                    self.push(self.peek(1));
                }

                OpCode::GetLocal => {
                    let offset = self.read_u16() as usize;
                    let slot = self.frame().base + offset;
                    self.push(self.stack[slot]);
                }
                OpCode::SetLocal => {
                    let offset = self.read_u16() as usize;
                    let slot = self.frame().base + offset;
                    self.stack[slot] = self.peek(0);
                }
                OpCode::GetUpvalue => {
                    let index = self.read_u16() as usize;
                    let upvalue = self.upvalue_at(index);
                    self.push(self.read_upvalue(upvalue));
                }
                OpCode::SetUpvalue => {
                    let index = self.read_u16() as usize;
                    let upvalue = self.upvalue_at(index);
                    self.write_upvalue(upvalue, self.peek(0));
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                OpCode::GetGlobal => {
                    let name = self.read_name();
                    let value = self.get_global_binding(name)?;
                    self.push(value);
                }
                OpCode::SetGlobal => {
                    let name = self.read_name();
                    self.set_global_binding(name, self.peek(0))?;
                }
                OpCode::DefineGlobal => {
                    let name = self.read_name();
                    let value = self.peek(0);
                    let module = self.frame().module;
                    if let Some(module) = self.heap.as_module_mut(module) {
                        module.values.set_value(Value::Obj(name), value);
                    }
                    self.pop();
                }

                OpCode::GetProperty | OpCode::GetSelfProperty => {
                    let name = self.read_name();
                    let value = self.get_property(self.peek(0), name, op == OpCode::GetSelfProperty)?;
                    self.set_top(value);
                }
                OpCode::SetProperty | OpCode::SetSelfProperty => {
                    let name = self.read_name();
                    let (receiver, value) = (self.peek(1), self.peek(0));
                    self.set_property(receiver, name, value, op == OpCode::SetSelfProperty)?;
                    self.stack.truncate(self.stack.len() - 2);
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_name();
                    self.get_super(name)?;
                }
                OpCode::GetIndex => {
                    let value = self.get_index(self.peek(1), self.peek(0))?;
                    self.stack.truncate(self.stack.len() - 2);
                    self.push(value);
                }
                OpCode::SetIndex => {
                    let value = self.peek(0);
                    self.set_index(self.peek(2), self.peek(1), value)?;
                    self.stack.truncate(self.stack.len() - 3);
                    self.push(value);
                }
                OpCode::GetRangedIndex => {
                    let value = self.get_ranged_index(self.peek(2), self.peek(1), self.peek(0))?;
                    self.stack.truncate(self.stack.len() - 3);
                    self.push(value);
                }

                OpCode::Equal
                | OpCode::NotEqual
                | OpCode::Greater
                | OpCode::GreaterEqual
                | OpCode::Less
                | OpCode::LessEqual
                | OpCode::Add
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide
                | OpCode::Modulo
                | OpCode::Power
                | OpCode::BitAnd
                | OpCode::BitOr
                | OpCode::BitXor
                | OpCode::ShiftLeft
                | OpCode::ShiftRight
                | OpCode::InstanceOf => self.binary(op)?,
                OpCode::Negate => self.negate()?,
                OpCode::Not => self.set_top(Value::Bool(self.is_falsey(self.peek(0)))),
                OpCode::BitNot => self.bit_not()?,
                OpCode::Stringify => {
                    let value = self.peek(0);
                    if self.heap.value_str(value).is_none() {
                        let text = self.to_display(value)?;
                        let text = self.string_value(&text);
                        self.set_top(text);
                    }
                }
                OpCode::Range => {
                    let (lower, upper) = match (self.peek(1).as_integer(), self.peek(0).as_integer()) {
                        (Some(lower), Some(upper)) => (lower, upper),
                        _ => return Err(self.error("Range bounds must be integers.")),
                    };
                    let range = self.alloc(Obj::Range(Range { lower, upper }));
                    self.stack.truncate(self.stack.len() - 2);
                    self.push(Value::Obj(range));
                }

                OpCode::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.is_falsey(self.peek(0)) {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::JumpIfEmpty => {
                    let offset = self.read_u16() as usize;
                    if self.peek(0).is_empty() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }
                OpCode::BreakPlaceholder => unreachable!("unpatched break"),
                OpCode::ArgDefault => {
                    let slot = self.read_u16() as usize;
                    let slot = self.frame().base + slot;
                    let offset = self.read_u16() as usize;
                    if !self.stack[slot].is_empty() {
                        self.frame_mut().ip += offset;
                    }
                }

                OpCode::Call => {
                    let argc = self.read_byte() as usize;
                    self.call(self.peek(argc), argc)?;
                }
                OpCode::Invoke | OpCode::InvokeSelf => {
                    let name = self.read_name();
                    let argc = self.read_byte() as usize;
                    self.invoke(name, argc, op == OpCode::InvokeSelf)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_name();
                    let argc = self.read_byte() as usize;
                    self.super_invoke(name, argc)?;
                }
                OpCode::Closure => self.make_closure(),
                OpCode::Return => {
                    let result = self.pop();
                    let Some(frame) = self.frames.pop() else {
                        unreachable!("return without a frame");
                    };
                    self.close_upvalues(frame.base);
                    self.stack.truncate(frame.base);
                    if self.frames.len() == exit_depth {
                        return Ok(result);
                    }
                    self.push(result);
                }

                OpCode::Class => {
                    let name = self.read_name();
                    let class = self.alloc(Obj::Class(Class::new(name)));
                    self.push(Value::Obj(class));
                }
                OpCode::Inherit => self.inherit()?,
                OpCode::Method
                | OpCode::StaticMethod
                | OpCode::Field
                | OpCode::StaticField
                | OpCode::Getter
                | OpCode::Setter => {
                    let name = self.read_name();
                    self.define_member(op, name);
                }

                OpCode::Array => {
                    let count = self.read_u16() as usize;
                    let array = self.alloc(Obj::Array(Array::default()));
                    let items = self.stack.split_off(self.stack.len() - count);
                    if let Some(a) = self.heap.as_array_mut(array) {
                        a.items = items;
                    }
                    self.push(Value::Obj(array));
                }
                OpCode::Dict => {
                    let count = self.read_u16() as usize;
                    let dict = self.alloc(Obj::Dict(Dict::default()));
                    let pairs = self.stack.split_off(self.stack.len() - count * 2);
                    if let Some(d) = self.heap.as_dict_mut(dict) {
                        for pair in pairs.chunks_exact(2) {
                            d.set(pair[0], pair[1]);
                        }
                    }
                    self.push(Value::Obj(dict));
                }

                OpCode::IterNext | OpCode::IterKey | OpCode::IterValue => {
                    let (iterable, cursor) = (self.peek(1), self.peek(0));
                    let value = match op {
                        OpCode::IterNext => self.iter_next(iterable, cursor)?,
                        OpCode::IterKey => self.iter_key(iterable, cursor)?,
                        _ => self.iter_value(iterable, cursor)?,
                    };
                    self.stack.truncate(self.stack.len() - 2);
                    self.push(value);
                }

                OpCode::Try => self.enter_try()?,
                OpCode::EndTry => self.end_try(),
                OpCode::PopTry => {
                    self.frame_mut().handlers.pop();
                }
                OpCode::EndFinally => self.end_finally()?,
                OpCode::Throw => {
                    let value = self.peek(0);
                    if !self.is_instance_of(value, self.classes.exception) {
                        let kind = self.type_name(value);
                        return Err(self.error(format!(
                            "Can only throw instances of Exception, not {kind}."
                        )));
                    }
                    self.pop();
                    return Err(Throw(value));
                }
                OpCode::Assert => {
                    let (condition, message) = (self.peek(1), self.peek(0));
                    if self.is_falsey(condition) {
                        let text = if message.is_nothing() {
                            "Assertion failed.".to_string()
                        } else {
                            self.to_display(message)?
                        };
                        return Err(self.error(text));
                    }
                    self.stack.truncate(self.stack.len() - 2);
                }

                OpCode::Echo => {
                    let text = self.to_display(self.peek(0))?;
                    if let Err(e) = writeln!(self.out, "{text}") {
                        return Err(self.error(format!("Cannot write output: {e}")));
                    }
                    self.pop();
                }
                OpCode::Import => {
                    let name = self.read_name();
                    let module = self.import(name)?;
                    self.push(module);
                }
            }
        }
    }

    /// Module binding of the running frame, falling back to the built-ins.
    fn get_global_binding(&mut self, name: ObjRef) -> VmResult<Value> {
        let key = Value::Obj(name);
        let found = self
            .heap
            .as_module(self.frame().module)
            .and_then(|module| module.values.get_value(key))
            .or_else(|| self.globals.get_value(key));
        match found {
            Some(value) => Ok(value),
            None => {
                let message = format!("Undefined variable '{}'.", self.heap.str(name));
                Err(self.error(message))
            }
        }
    }

    fn set_global_binding(&mut self, name: ObjRef, value: Value) -> VmResult<()> {
        let key = Value::Obj(name);
        let module = self.frame().module;
        let defined = self
            .heap
            .as_module(module)
            .is_some_and(|m| m.values.contains(key));
        if !defined {
            let message = format!("Undefined variable '{}'.", self.heap.str(name));
            return Err(self.error(message));
        }
        if let Some(m) = self.heap.as_module_mut(module) {
            m.values.set_value(key, value);
        }
        Ok(())
    }

    fn make_closure(&mut self) {
        let function = match self.read_constant() {
            Value::Obj(r) => r,
            other => unreachable!("closure operand is not a function: {other:?}"),
        };
        let descs = match self.heap.as_function(function) {
            Some(f) => f.upvalues.clone(),
            None => unreachable!("closure operand is not a function"),
        };
        let closure = self.alloc(Obj::Closure(Closure {
            function,
            upvalues: Vec::with_capacity(descs.len()),
        }));
        self.push(Value::Obj(closure));

        let base = self.frame().base;
        for desc in descs {
            let upvalue = if desc.is_local {
                self.capture_upvalue(base + desc.index as usize)
            } else {
                self.upvalue_at(desc.index as usize)
            };
            if let Some(c) = self.heap.as_closure_mut(closure) {
                c.upvalues.push(upvalue);
            }
        }
    }

    /// Stack: superclass, class. Links the class and seeds its field template.
    fn inherit(&mut self) -> VmResult<()> {
        let class = self.pop();
        let superclass = self.peek(0);
        let fields = match superclass.as_obj().and_then(|r| self.heap.as_class(r)) {
            Some(s) => s.fields.clone(),
            None => {
                let kind = self.type_name(superclass);
                return Err(self.error(format!("Superclass must be a class, not {kind}.")));
            }
        };
        if let Some(c) = class.as_obj().and_then(|r| self.heap.as_class_mut(r)) {
            c.superclass = superclass.as_obj();
            fields.copy_into(&mut c.fields);
        }
        Ok(())
    }

    /// Stack: class, member value. Pops the value.
    fn define_member(&mut self, op: OpCode, name: ObjRef) {
        let value = self.peek(0);
        let Some(class) = self.peek(1).as_obj() else {
            unreachable!("class member outside a class");
        };
        let key = Value::Obj(name);

        let is_initializer = value
            .as_obj()
            .and_then(|r| self.heap.as_closure(r))
            .and_then(|c| self.heap.as_function(c.function))
            .is_some_and(|f| f.kind == FunctionKind::Initializer);
        let is_destructor = name == self.names.destructor;

        let accessor = match op {
            OpCode::Getter | OpCode::Setter => {
                let existing = self
                    .heap
                    .as_class(class)
                    .and_then(|c| c.methods.get(key))
                    .filter(|prop| prop.kind == PropKind::GetterSetter)
                    .and_then(|prop| prop.value.as_obj());
                Some(match existing {
                    Some(accessor) => accessor,
                    None => self.alloc(Obj::Accessor(Accessor {
                        getter: None,
                        setter: None,
                    })),
                })
            }
            _ => None,
        };
        if let Some(accessor) = accessor {
            if let Obj::Accessor(a) = self.heap.get_mut(accessor) {
                if op == OpCode::Getter {
                    a.getter = Some(value);
                } else {
                    a.setter = Some(value);
                }
            }
        }

        let Some(c) = self.heap.as_class_mut(class) else {
            unreachable!("class member outside a class");
        };
        match op {
            OpCode::Method => {
                c.methods.set(key, Property::value(value));
                if is_initializer {
                    c.initializer = Some(value);
                }
                if is_destructor {
                    c.destructor = Some(value);
                }
            }
            OpCode::StaticMethod => {
                c.static_methods.set_value(key, value);
            }
            OpCode::Field => {
                c.fields.set_value(key, value);
            }
            OpCode::StaticField => {
                c.static_props.set_value(key, value);
            }
            _ => {
                if let Some(accessor) = accessor {
                    c.methods.set(key, Property::accessor(Value::Obj(accessor)));
                }
            }
        }
        self.pop();
    }

    fn enter_try(&mut self) -> VmResult<()> {
        let class_operand = self.read_u16();
        let catch = self.read_u16();
        let finally = self.read_u16();

        let class = if class_operand == ANY_EXCEPTION {
            None
        } else {
            let name = match self.frame().blob.constants[class_operand as usize] {
                Value::Obj(r) => r,
                other => unreachable!("catch class operand is not a name: {other:?}"),
            };
            let value = self.get_global_binding(name)?;
            match value.as_obj().filter(|r| self.heap.as_class(*r).is_some()) {
                Some(class) => Some(class),
                None => {
                    let message = format!("'{}' is not a class.", self.heap.str(name));
                    return Err(self.error(message));
                }
            }
        };
        let address = |operand: u16| (operand != UNPATCHED).then_some(operand as usize);
        let handler = Handler {
            class,
            catch_ip: address(catch),
            finally_ip: address(finally),
            stack_height: self.stack.len(),
            state: TryState::Running,
        };
        self.push_handler(handler);
        Ok(())
    }
}
