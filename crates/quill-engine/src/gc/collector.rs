// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mark-sweep collection over the VM's roots.
//!
//! Idle -> mark roots -> trace the gray worklist -> schedule destructors ->
//! sweep the weak tables -> sweep the object list -> idle.

use tracing::debug;

use super::heap::ObjRef;
use crate::runtime::{Obj, Table, UpvalueState, Value};
use crate::vm::Vm;

/// Push every value directly referenced by `obj`.
pub(crate) fn references(obj: &Obj, out: &mut Vec<Value>) {
    fn table(t: &Table, out: &mut Vec<Value>) {
        for (key, prop) in t.iter() {
            out.push(key);
            out.push(prop.value);
        }
    }

    fn opt(r: Option<ObjRef>, out: &mut Vec<Value>) {
        if let Some(r) = r {
            out.push(Value::Obj(r));
        }
    }

    match obj {
        Obj::String(_) | Obj::Native(_) | Obj::Range(_) => {}
        Obj::Function(f) => {
            opt(f.name, out);
            out.push(Value::Obj(f.module));
            out.extend_from_slice(&f.blob.constants);
        }
        Obj::Closure(c) => {
            out.push(Value::Obj(c.function));
            out.extend(c.upvalues.iter().map(|u| Value::Obj(*u)));
        }
        Obj::Upvalue(u) => {
            // Open upvalues point at stack slots, which are roots already.
            if let UpvalueState::Closed(value) = u.state {
                out.push(value);
            }
        }
        Obj::Class(c) => {
            out.push(Value::Obj(c.name));
            opt(c.superclass, out);
            table(&c.methods, out);
            table(&c.static_methods, out);
            table(&c.static_props, out);
            table(&c.fields, out);
            out.extend(c.initializer);
            out.extend(c.destructor);
        }
        Obj::Instance(i) => {
            out.push(Value::Obj(i.class));
            table(&i.fields, out);
        }
        Obj::BoundMethod(b) => {
            out.push(b.receiver);
            out.push(b.method);
        }
        Obj::Array(a) => out.extend_from_slice(&a.items),
        Obj::Dict(d) => {
            out.extend_from_slice(&d.keys);
            table(&d.table, out);
        }
        Obj::Module(m) => {
            out.push(Value::Obj(m.name));
            out.push(Value::Obj(m.path));
            table(&m.values, out);
        }
        Obj::Accessor(a) => {
            out.extend(a.getter);
            out.extend(a.setter);
        }
    }
}

impl Vm {
    /// Run one full collection cycle.
    pub fn collect_garbage(&mut self) {
        let before = self.heap.stats().bytes_allocated;
        self.heap.begin_cycle();
        self.mark_roots();
        self.heap.trace();

        let queued = self.heap.queue_finalizers();
        self.pending_finalizers.extend(queued);

        let dropped_strings = self.heap.sweep_strings();
        let freed = self.heap.sweep();

        let stats = self.heap.stats();
        debug!(
            before,
            after = stats.bytes_allocated,
            freed,
            dropped_strings,
            next_gc = stats.next_gc,
            "gc cycle complete"
        );
    }

    fn mark_roots(&mut self) {
        for value in self.stack.iter().copied() {
            self.heap.mark_value(value);
        }
        for frame in &self.frames {
            self.heap.mark(frame.closure);
            self.heap.mark(frame.module);
            for handler in &frame.handlers {
                if let Some(class) = handler.class {
                    self.heap.mark(class);
                }
                if let crate::runtime::TryState::Finalizing { resume: Some(value) } = handler.state {
                    self.heap.mark_value(value);
                }
            }
        }
        for upvalue in self.open_upvalues.iter().copied() {
            self.heap.mark(upvalue);
        }
        self.heap.mark_table(&self.globals);
        self.heap.mark(self.main_module);
        // Loaded modules stay cached for the life of the VM.
        self.heap.mark_table(&self.modules);
        for value in self.temp_roots.iter().copied() {
            self.heap.mark_value(value);
        }
        for (instance, destructor) in self.pending_finalizers.iter().copied() {
            self.heap.mark(instance);
            self.heap.mark_value(destructor);
        }
        for r in self.classes.all().into_iter().chain(self.names.all()) {
            self.heap.mark(r);
        }
    }

    /// Run destructors scheduled by earlier cycles. Exceptions they raise are
    /// logged and dropped.
    pub(crate) fn run_finalizers(&mut self) {
        while let Some((instance, destructor)) = self.pending_finalizers.pop() {
            if let Err(thrown) = self.call_method(Value::Obj(instance), destructor, &[]) {
                let message = self.exception_message(thrown.0);
                tracing::warn!(%message, "exception raised in destructor was ignored");
            }
        }
    }
}
