// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # quill-engine
//!
//! An embeddable scripting runtime for the Quill language.
//!
//! ## Overview
//!
//! - Single-pass Pratt compiler straight to bytecode, without an AST
//! - Stack VM with closures, classes, exceptions and modules
//! - Mark-sweep garbage collector with interned strings
//!
//! ## Quick Start
//!
//! ```rust
//! use quill_engine::Engine;
//!
//! let mut engine = Engine::new();
//! assert_eq!(engine.eval("return 1 + 2;").unwrap(), "3");
//! ```

#![warn(clippy::all)]

pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod gc;
pub mod lexer;
pub mod runtime;
pub mod vm;

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

pub use config::VmConfig;
pub use error::{CompileError, CompileErrors, Error, Result, RuntimeError};
pub use gc::GcStats;
pub use runtime::{NativeCall, Value};
pub use vm::{FileLoader, ModuleLoader, ModuleSource, Throw, Vm, VmResult, render_report};

/// A Quill interpreter instance.
///
/// Top-level bindings persist between [`Engine::eval`] calls, so one engine
/// backs a whole REPL session.
pub struct Engine {
    vm: Vm,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self { vm: Vm::new(config) }
    }

    /// Send `echo` and `print` output to `out` instead of stdout.
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.vm.set_output(Box::new(out));
        self
    }

    /// Resolve imports through `loader`.
    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.vm.set_loader(loader);
        self
    }

    /// Evaluates source code in the main module.
    ///
    /// # Returns
    ///
    /// The value of a top-level `return` rendered as text, or an empty
    /// string when the script returns nothing.
    pub fn eval(&mut self, source: &str) -> Result<String> {
        let main = self.vm.main_module();
        let value = self.vm.interpret(source, main)?;
        if value.is_empty() {
            return Ok(String::new());
        }
        let rendered = {
            let mut scope = self.vm.root_scope();
            scope.push_root(value);
            scope.to_display(value)
        };
        rendered.map_err(|thrown| self.vm.uncaught(thrown).into())
    }

    /// Evaluates a script file. Imports resolve relative to its directory.
    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let location = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.vm.set_main_path(&location.to_string_lossy());
        self.eval(&source)
    }

    /// Registers a global function implemented by the host.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use quill_engine::{Engine, Value};
    ///
    /// let mut engine = Engine::new();
    /// engine.register_native("double", |_vm, call| {
    ///     Ok(Value::Number(call.arg(0).as_number().unwrap_or(0.0) * 2.0))
    /// });
    /// assert_eq!(engine.eval("return double(21);").unwrap(), "42");
    /// ```
    pub fn register_native(
        &mut self,
        name: &str,
        func: impl Fn(&mut Vm, &NativeCall) -> VmResult<Value> + 'static,
    ) {
        self.vm.define_native(name, func);
    }

    /// Runs a full collection cycle and any destructors it schedules.
    pub fn collect_garbage(&mut self) {
        self.vm.collect_garbage();
        self.vm.drain_finalizers();
    }

    pub fn gc_stats(&self) -> GcStats {
        self.vm.heap().stats()
    }

    /// Compiles `source` without running it and returns its bytecode listing.
    pub fn disassemble(&mut self, source: &str) -> Result<String> {
        let main = self.vm.main_module();
        let function = compiler::compile(&mut self.vm.heap, source, main)?;
        Ok(compiler::disassemble(self.vm.heap(), function))
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory output sink that stays readable after being handed to an engine.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_renders_return_value() {
        let mut engine = Engine::new();
        assert_eq!(engine.eval("return 1 + 2;").unwrap(), "3");
        assert_eq!(engine.eval("var x = 1;").unwrap(), "");
        assert_eq!(engine.eval("return x + 1;").unwrap(), "2");
    }

    #[test]
    fn test_output_is_captured() {
        let out = SharedBuffer::new();
        let mut engine = Engine::new().with_output(out.clone());
        engine.eval("echo \"hi\"; print(1, 2); println(\"!\");").unwrap();
        assert_eq!(out.contents(), "hi\n1 2!\n");
    }

    #[test]
    fn test_disassemble_lists_opcodes() {
        let mut engine = Engine::new();
        let listing = engine.disassemble("echo 1 + 2;").unwrap();
        assert!(listing.contains("Add"), "{listing}");
        assert!(listing.contains("Echo"), "{listing}");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut engine = Engine::new();
        let error = engine.eval_file("/definitely/not/here.quill").unwrap_err();
        assert!(matches!(error, Error::Io { .. }));
    }
}
