// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Property access and method dispatch.
//!
//! Instances look in their own fields, then along the class chain. Classes
//! expose static members, modules their bindings. Every other value
//! dispatches to the built-in class of its type.

use super::call::StaticMember;
use super::{Throw, Vm, VmResult};
use crate::gc::ObjRef;
use crate::runtime::{BoundMethod, Obj, PropKind, Property, Value};

impl Vm {
    /// Built-in class backing a non-instance value.
    pub(crate) fn core_class(&self, value: Value) -> Option<ObjRef> {
        match value {
            Value::Number(_) => Some(self.classes.number),
            Value::Obj(r) => match self.heap.get(r) {
                Obj::String(_) => Some(self.classes.string),
                Obj::Array(_) => Some(self.classes.array),
                Obj::Dict(_) => Some(self.classes.dict),
                Obj::Range(_) => Some(self.classes.range),
                _ => None,
            },
            _ => None,
        }
    }

    fn check_private(&mut self, name: ObjRef, allow_private: bool) -> VmResult<()> {
        if !allow_private && self.heap.str(name).starts_with('_') {
            let name = self.heap.str(name).to_string();
            return Err(self.error(format!(
                "Cannot access private property '{name}' from outside its class."
            )));
        }
        Ok(())
    }

    fn label(&self, value: Value) -> String {
        match value.as_obj().and_then(|r| self.heap.as_instance(r)) {
            Some(instance) => match self.heap.as_class(instance.class) {
                Some(class) => format!("{} instance", self.heap.str(class.name)),
                None => "instance".to_string(),
            },
            None => self.type_name(value).to_string(),
        }
    }

    fn undefined_property(&mut self, receiver: Value, name: ObjRef) -> Throw {
        let message = format!(
            "Undefined property '{}' on {}.",
            self.heap.str(name),
            self.label(receiver)
        );
        self.error(message)
    }

    /// `receiver.name`
    pub(crate) fn get_property(&mut self, receiver: Value, name: ObjRef, allow_private: bool) -> VmResult<Value> {
        self.check_private(name, allow_private)?;
        let key = Value::Obj(name);
        let Value::Obj(r) = receiver else {
            return self.builtin_property(receiver, name);
        };
        match self.heap.get(r) {
            Obj::Instance(instance) => {
                if let Some(value) = instance.fields.get_value(key) {
                    return Ok(value);
                }
                match self.find_method(instance.class, key) {
                    Some(prop) => self.read_member(receiver, name, prop),
                    None => Err(self.undefined_property(receiver, name)),
                }
            }
            Obj::Class(_) => match self.find_static(r, key) {
                Some(StaticMember::Field(value)) => Ok(value),
                Some(StaticMember::Method(method)) => self.bind(receiver, method),
                None => Err(self.undefined_property(receiver, name)),
            },
            Obj::Module(module) => match module.values.get_value(key) {
                Some(value) => Ok(value),
                None => {
                    let message = format!(
                        "Module '{}' has no binding '{}'.",
                        self.heap.str(module.name),
                        self.heap.str(name)
                    );
                    Err(self.error(message))
                }
            },
            Obj::Dict(dict) => {
                let entry = dict.get(key);
                match self.find_method(self.classes.dict, key) {
                    Some(prop) => self.read_member(receiver, name, prop),
                    None => Ok(entry.unwrap_or(Value::Null)),
                }
            }
            _ => self.builtin_property(receiver, name),
        }
    }

    fn builtin_property(&mut self, receiver: Value, name: ObjRef) -> VmResult<Value> {
        let prop = self
            .core_class(receiver)
            .and_then(|class| self.find_method(class, Value::Obj(name)));
        match prop {
            Some(prop) => self.read_member(receiver, name, prop),
            None => Err(self.undefined_property(receiver, name)),
        }
    }

    /// Produce the value of a class member read through `receiver`.
    fn read_member(&mut self, receiver: Value, name: ObjRef, prop: Property) -> VmResult<Value> {
        match prop.kind {
            PropKind::Value => self.bind(receiver, prop.value),
            PropKind::Function => self.call_method(receiver, prop.value, &[]),
            PropKind::GetterSetter => match self.accessor(prop.value).0 {
                Some(getter) => self.call_method(receiver, getter, &[]),
                None => {
                    let message = format!("Property '{}' has no getter.", self.heap.str(name));
                    Err(self.error(message))
                }
            },
        }
    }

    fn accessor(&self, value: Value) -> (Option<Value>, Option<Value>) {
        match value.as_obj().map(|r| self.heap.get(r)) {
            Some(Obj::Accessor(accessor)) => (accessor.getter, accessor.setter),
            _ => (None, None),
        }
    }

    fn bind(&mut self, receiver: Value, method: Value) -> VmResult<Value> {
        let bound = self.alloc(Obj::BoundMethod(BoundMethod { receiver, method }));
        Ok(Value::Obj(bound))
    }

    /// `receiver.name = value`
    pub(crate) fn set_property(
        &mut self,
        receiver: Value,
        name: ObjRef,
        value: Value,
        allow_private: bool,
    ) -> VmResult<()> {
        self.check_private(name, allow_private)?;
        let key = Value::Obj(name);
        let Value::Obj(r) = receiver else {
            return Err(self.read_only(receiver, name));
        };
        match self.heap.get(r) {
            Obj::Instance(instance) => {
                let setter = match self.find_method(instance.class, key) {
                    Some(prop) if prop.kind == PropKind::GetterSetter => Some(self.accessor(prop.value).1),
                    _ => None,
                };
                match setter {
                    Some(Some(setter)) => {
                        self.call_method(receiver, setter, &[value])?;
                    }
                    Some(None) => {
                        let message = format!("Property '{}' has no setter.", self.heap.str(name));
                        return Err(self.error(message));
                    }
                    None => {
                        if let Some(instance) = self.heap.as_instance_mut(r) {
                            instance.fields.set_value(key, value);
                        }
                    }
                }
                Ok(())
            }
            Obj::Class(_) => {
                if let Some(class) = self.heap.as_class_mut(r) {
                    class.static_props.set_value(key, value);
                }
                Ok(())
            }
            Obj::Dict(_) => {
                if let Some(dict) = self.heap.as_dict_mut(r) {
                    dict.set(key, value);
                }
                Ok(())
            }
            _ => Err(self.read_only(receiver, name)),
        }
    }

    fn read_only(&mut self, receiver: Value, name: ObjRef) -> Throw {
        let message = format!(
            "Cannot set property '{}' on {}.",
            self.heap.str(name),
            self.label(receiver)
        );
        self.error(message)
    }

    /// `receiver.name(args)` with the receiver `argc` slots below the top.
    pub(crate) fn invoke(&mut self, name: ObjRef, argc: usize, allow_private: bool) -> VmResult<()> {
        self.check_private(name, allow_private)?;
        let key = Value::Obj(name);
        let receiver = self.peek(argc);
        let Value::Obj(r) = receiver else {
            return self.invoke_builtin(receiver, name, argc);
        };
        match self.heap.get(r) {
            Obj::Instance(instance) => {
                if let Some(field) = instance.fields.get_value(key) {
                    return self.call_in_place(field, argc);
                }
                match self.find_method(instance.class, key) {
                    Some(prop) => self.invoke_member(receiver, name, prop, argc),
                    None => Err(self.undefined_property(receiver, name)),
                }
            }
            Obj::Class(_) => match self.find_static(r, key) {
                Some(StaticMember::Method(method)) => self.call_bound(method, receiver, argc),
                Some(StaticMember::Field(value)) => self.call_in_place(value, argc),
                None => Err(self.undefined_property(receiver, name)),
            },
            Obj::Module(_) => {
                let value = self.get_property(receiver, name, allow_private)?;
                self.call_in_place(value, argc)
            }
            Obj::Dict(dict) => {
                let entry = dict.get(key);
                match (self.find_method(self.classes.dict, key), entry) {
                    (Some(prop), _) => self.invoke_member(receiver, name, prop, argc),
                    (None, Some(value)) => self.call_in_place(value, argc),
                    (None, None) => Err(self.undefined_property(receiver, name)),
                }
            }
            _ => self.invoke_builtin(receiver, name, argc),
        }
    }

    fn invoke_builtin(&mut self, receiver: Value, name: ObjRef, argc: usize) -> VmResult<()> {
        let prop = self
            .core_class(receiver)
            .and_then(|class| self.find_method(class, Value::Obj(name)));
        match prop {
            Some(prop) => self.invoke_member(receiver, name, prop, argc),
            None => Err(self.undefined_property(receiver, name)),
        }
    }

    fn invoke_member(&mut self, receiver: Value, name: ObjRef, prop: Property, argc: usize) -> VmResult<()> {
        match prop.kind {
            PropKind::Value => self.call_bound(prop.value, receiver, argc),
            _ => {
                let value = self.read_member(receiver, name, prop)?;
                self.call_in_place(value, argc)
            }
        }
    }

    /// Call a plain value found as a property: it replaces the receiver.
    fn call_in_place(&mut self, callee: Value, argc: usize) -> VmResult<()> {
        let slot = self.stack.len() - argc - 1;
        self.stack[slot] = callee;
        self.call(callee, argc)
    }

    /// `super.name`: stack holds `this`, superclass.
    pub(crate) fn get_super(&mut self, name: ObjRef) -> VmResult<()> {
        let superclass = self.pop();
        let receiver = self.peek(0);
        let prop = self.superclass_member(superclass, name)?;
        let value = self.read_member(receiver, name, prop)?;
        self.set_top(value);
        Ok(())
    }

    /// `super.name(args)` and `super(args)`: stack holds `this`, args, superclass.
    pub(crate) fn super_invoke(&mut self, name: ObjRef, argc: usize) -> VmResult<()> {
        let superclass = self.pop();
        let receiver = self.peek(argc);
        if name == self.names.constructor {
            let has_constructor = superclass
                .as_obj()
                .is_some_and(|class| self.find_method(class, Value::Obj(name)).is_some());
            if !has_constructor {
                // Nothing to chain to: `super()` evaluates to `this`.
                if argc > 0 {
                    return Err(self.arity_error("constructor", 0, 0, argc));
                }
                return Ok(());
            }
        }
        let prop = self.superclass_member(superclass, name)?;
        self.invoke_member(receiver, name, prop, argc)
    }

    fn superclass_member(&mut self, superclass: Value, name: ObjRef) -> VmResult<Property> {
        let found = superclass
            .as_obj()
            .and_then(|class| self.find_method(class, Value::Obj(name)));
        match found {
            Some(prop) => Ok(prop),
            None => {
                let message = format!("Undefined superclass method '{}'.", self.heap.str(name));
                Err(self.error(message))
            }
        }
    }
}
