// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode virtual machine.
//!
//! One operand stack is shared by every active call; each frame addresses its
//! slots from a base index. Native code re-enters the dispatch loop through
//! [`Vm::call_value`] and [`Vm::call_method`].
//!
//! # Module Structure
//!
//! - `interpreter`: the dispatch loop
//! - `call`: calling convention, frames and upvalues
//! - `property`: property and method lookup
//! - `index`: subscripts, slices and iteration
//! - `exception`: raising, unwinding and uncaught reports
//! - `ops`: operators, truthiness and value formatting
//! - `module`: module loading

mod call;
mod exception;
mod index;
mod interpreter;
pub mod module;
mod ops;
mod property;

use std::io::Write;

pub use exception::render_report;
pub use module::{FileLoader, ModuleLoader, ModuleSource};

use crate::config::VmConfig;
use crate::error::Result;
use crate::gc::{Heap, ObjRef};
use crate::runtime::{CallFrame, Class, Closure, Module, Obj, Table, Value};

/// A script exception in flight.
#[derive(Debug, Clone, Copy)]
pub struct Throw(pub Value);

/// Result type of every operation that can raise a script exception
pub type VmResult<T> = std::result::Result<T, Throw>;

/// Classes that back the built-in value types.
#[derive(Debug, Clone, Copy)]
pub struct CoreClasses {
    pub exception: ObjRef,
    pub string: ObjRef,
    pub array: ObjRef,
    pub dict: ObjRef,
    pub range: ObjRef,
    pub number: ObjRef,
}

impl CoreClasses {
    fn new(heap: &mut Heap) -> Self {
        let mut class = |name: &str| {
            let name = heap.intern(name);
            heap.insert(Obj::Class(Class::new(name)))
        };
        Self {
            exception: class("Exception"),
            string: class("string"),
            array: class("array"),
            dict: class("dict"),
            range: class("range"),
            number: class("number"),
        }
    }

    pub fn all(&self) -> [ObjRef; 6] {
        [
            self.exception,
            self.string,
            self.array,
            self.dict,
            self.range,
            self.number,
        ]
    }
}

/// Interned names the VM looks up by identity.
#[derive(Debug, Clone, Copy)]
pub struct Names {
    pub constructor: ObjRef,
    pub destructor: ObjRef,
    pub to_string: ObjRef,
    pub message: ObjRef,
    pub srcfile: ObjRef,
    pub srcline: ObjRef,
    pub stacktrace: ObjRef,
    pub main: ObjRef,
}

impl Names {
    fn new(heap: &mut Heap) -> Self {
        Self {
            constructor: heap.intern("constructor"),
            destructor: heap.intern("destructor"),
            to_string: heap.intern("@to_string"),
            message: heap.intern("message"),
            srcfile: heap.intern("srcfile"),
            srcline: heap.intern("srcline"),
            stacktrace: heap.intern("stacktrace"),
            main: heap.intern("<main>"),
        }
    }

    pub fn all(&self) -> [ObjRef; 8] {
        [
            self.constructor,
            self.destructor,
            self.to_string,
            self.message,
            self.srcfile,
            self.srcline,
            self.stacktrace,
            self.main,
        ]
    }
}

/// The virtual machine: heap, stacks and global state of one interpreter.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    /// Open upvalues ordered by stack slot, lowest first
    pub(crate) open_upvalues: Vec<ObjRef>,
    /// Built-in bindings visible from every module
    pub(crate) globals: Table,
    /// Loaded modules keyed by resolved path
    pub(crate) modules: Table,
    pub(crate) classes: CoreClasses,
    pub(crate) names: Names,
    pub(crate) temp_roots: Vec<Value>,
    /// Instances awaiting their destructor
    pub(crate) pending_finalizers: Vec<(ObjRef, Value)>,
    running_finalizers: bool,
    pub(crate) loader: Box<dyn ModuleLoader>,
    pub(crate) config: VmConfig,
    pub(crate) out: Box<dyn Write>,
    pub(crate) main_module: ObjRef,
}

impl Vm {
    /// Creates a new VM writing script output to stdout.
    pub fn new(config: VmConfig) -> Self {
        let mut heap = Heap::new(&config);
        heap.pause();
        let classes = CoreClasses::new(&mut heap);
        let names = Names::new(&mut heap);
        let main_module = heap.insert(Obj::Module(Module {
            name: names.main,
            path: names.main,
            values: Table::new(),
            loaded: true,
        }));
        let loader = Box::new(FileLoader::new(
            config.module_paths.clone(),
            config.file_extension.clone(),
        ));

        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            open_upvalues: Vec::new(),
            globals: Table::new(),
            modules: Table::new(),
            classes,
            names,
            temp_roots: Vec::new(),
            pending_finalizers: Vec::new(),
            running_finalizers: false,
            loader,
            config,
            out: Box::new(std::io::stdout()),
            main_module,
        };
        crate::builtins::install(&mut vm);
        vm.heap.resume();
        vm
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    pub fn set_loader(&mut self, loader: Box<dyn ModuleLoader>) {
        self.loader = loader;
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn main_module(&self) -> ObjRef {
        self.main_module
    }

    /// Record the file the main module's source came from, so its imports
    /// resolve next to it.
    pub fn set_main_path(&mut self, path: &str) {
        let path = self.intern(path);
        if let Some(module) = self.heap.as_module_mut(self.main_module) {
            module.path = path;
        }
    }

    /// Compile and run `source` with `module` as its global scope.
    ///
    /// Returns the value of a top-level `return`, or empty.
    pub fn interpret(&mut self, source: &str, module: ObjRef) -> Result<Value> {
        let function = crate::compiler::compile(&mut self.heap, source, module)?;
        match self.run_function(function) {
            Ok(value) => {
                self.drain_finalizers();
                Ok(value)
            }
            Err(thrown) => Err(self.uncaught(thrown).into()),
        }
    }

    /// Wrap a compiled script function in a closure and run it to completion.
    pub(crate) fn run_function(&mut self, function: ObjRef) -> VmResult<Value> {
        let closure = {
            let mut scope = self.root_scope();
            scope.push_root(Value::Obj(function));
            scope.alloc(Obj::Closure(Closure {
                function,
                upvalues: Vec::new(),
            }))
        };
        self.call_value(Value::Obj(closure), &[])
    }

    /// Drop all execution state after an uncaught exception.
    pub(crate) fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        self.temp_roots.clear();
    }

    /// Run destructors queued by collections, unless already doing so.
    pub(crate) fn drain_finalizers(&mut self) {
        if self.running_finalizers || self.pending_finalizers.is_empty() {
            return;
        }
        self.running_finalizers = true;
        self.run_finalizers();
        self.running_finalizers = false;
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => unreachable!("operand stack underflow"),
        }
    }

    pub(crate) fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    /// Replace the top of the stack.
    pub(crate) fn set_top(&mut self, value: Value) {
        let top = self.stack.len() - 1;
        self.stack[top] = value;
    }

    pub(crate) fn frame(&self) -> &CallFrame {
        match self.frames.last() {
            Some(frame) => frame,
            None => unreachable!("no active frame"),
        }
    }

    pub(crate) fn frame_mut(&mut self) -> &mut CallFrame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => unreachable!("no active frame"),
        }
    }

    /// Define a built-in global.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.temp_roots.push(value);
        let key = self.intern(name);
        self.globals.set_value(Value::Obj(key), value);
        self.temp_roots.pop();
    }

    /// A binding of the main module, as left by earlier evaluations.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        let module = self.heap.as_module(self.main_module)?;
        module
            .values
            .iter()
            .find(|(key, _)| self.heap.value_str(*key) == Some(name))
            .map(|(_, prop)| prop.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_classes_are_distinct() {
        let vm = Vm::new(VmConfig::default());
        let all = vm.classes.all();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(!vm.heap.is_paused());
    }

    #[test]
    fn test_interpret_returns_top_level_value() {
        let mut vm = Vm::new(VmConfig::default());
        let main = vm.main_module();
        let value = vm.interpret("return 1 + 2;", main).unwrap();
        assert_eq!(value, Value::Number(3.0));
        let value = vm.interpret("var x = 1;", main).unwrap();
        assert!(value.is_empty());
        assert_eq!(vm.get_global("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_stack_is_clean_after_run() {
        let mut vm = Vm::new(VmConfig::default());
        let main = vm.main_module();
        vm.interpret("var a = [1, 2]; for (x in a) { echo x; }", main).unwrap();
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
        assert!(vm.open_upvalues.is_empty());
    }
}
