// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Raising and unwinding.
//!
//! Each frame keeps a stack of [`Handler`]s, one per active try region. A
//! thrown value is offered to the innermost handler of the innermost frame
//! first; a handler that cannot take it is dropped, and a frame without
//! handlers is popped.
//!
//! [`Handler`]: crate::runtime::Handler

use super::{Throw, Vm, VmResult};
use crate::error::RuntimeError;
use crate::gc::ObjRef;
use crate::runtime::{Array, Handler, Instance, Obj, TryState, Value};

impl Vm {
    /// A new `Exception` carrying `message`.
    pub fn error(&mut self, message: impl Into<String>) -> Throw {
        let class = self.classes.exception;
        self.exception(class, &message.into())
    }

    /// An exception for a value of the wrong type.
    pub fn type_error(&mut self, expected: &str, got: Value) -> Throw {
        let got = self.type_name(got);
        self.error(format!("Expected {expected} but got {got}."))
    }

    pub fn arity_error(&mut self, name: &str, min: usize, max: usize, got: usize) -> Throw {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        let plural = if max == 1 { "" } else { "s" };
        self.error(format!(
            "{name}() expects {expected} argument{plural} but got {got}."
        ))
    }

    /// Instantiate `class` with its field template and `message`.
    pub(crate) fn exception(&mut self, class: ObjRef, message: &str) -> Throw {
        let mut scope = self.root_scope();
        let message = scope.string_value(message);
        scope.push_root(message);
        let mut fields = match scope.heap.as_class(class) {
            Some(c) => c.fields.clone(),
            None => unreachable!("exception class expected"),
        };
        fields.set_value(Value::Obj(scope.names.message), message);
        let instance = scope.alloc(Obj::Instance(Instance { class, fields }));
        Throw(Value::Obj(instance))
    }

    /// Text of an exception's `message`, or the thrown value itself.
    pub fn exception_message(&self, exception: Value) -> String {
        if let Some(message) = self.exception_field(exception, self.names.message) {
            if let Some(text) = self.heap.value_str(message) {
                return text.to_string();
            }
            if !message.is_nothing() {
                return self.describe(message);
            }
            return String::new();
        }
        self.describe(exception)
    }

    fn exception_field(&self, exception: Value, name: ObjRef) -> Option<Value> {
        let instance = self.heap.as_instance(exception.as_obj()?)?;
        instance.fields.get_value(Value::Obj(name))
    }

    fn set_exception_field(&mut self, exception: ObjRef, name: ObjRef, value: Value) {
        if let Some(instance) = self.heap.as_instance_mut(exception) {
            instance.fields.set_value(Value::Obj(name), value);
        }
    }

    /// File, line and function name of frame `index`.
    fn frame_location(&self, index: usize) -> (String, u32, String) {
        let frame = &self.frames[index];
        let file = match self.heap.as_module(frame.module) {
            Some(module) => self.heap.str(module.path).to_string(),
            None => String::new(),
        };
        let name = self
            .heap
            .as_closure(frame.closure)
            .and_then(|c| self.heap.as_function(c.function))
            .and_then(|f| f.name);
        (file, frame.current_line(), self.function_name(name))
    }

    /// Fill in location and stack trace the first time an exception is thrown.
    fn attach_trace(&mut self, exception: Value) {
        let Value::Obj(r) = exception else {
            return;
        };
        if self.frames.is_empty() || self.heap.as_instance(r).is_none() {
            return;
        }
        let names = self.names;
        if self
            .exception_field(exception, names.stacktrace)
            .is_some_and(|trace| !trace.is_nothing())
        {
            return;
        }

        let entries: Vec<String> = (0..self.frames.len())
            .rev()
            .take(self.config.stack_trace_limit)
            .map(|i| {
                let (file, line, name) = self.frame_location(i);
                format!("{file}:{line} -> {name}()")
            })
            .collect();
        let (file, line, _) = self.frame_location(self.frames.len() - 1);

        let mut scope = self.root_scope();
        scope.push_root(exception);
        let trace = scope.alloc(Obj::Array(Array::default()));
        scope.push_root(Value::Obj(trace));
        for entry in &entries {
            let entry = scope.string_value(entry);
            if let Some(array) = scope.heap.as_array_mut(trace) {
                array.items.push(entry);
            }
        }
        let file = scope.string_value(&file);
        scope.set_exception_field(r, names.srcfile, file);
        scope.set_exception_field(r, names.srcline, Value::Number(line as f64));
        scope.set_exception_field(r, names.stacktrace, Value::Obj(trace));
    }

    /// Transfer control to the nearest handler above `exit_depth`, or hand
    /// the exception back once every frame down to it has been discarded.
    pub(crate) fn unwind(&mut self, thrown: Throw, exit_depth: usize) -> VmResult<()> {
        let exception = thrown.0;
        self.attach_trace(exception);
        while self.frames.len() > exit_depth {
            if self.enter_handler(exception) {
                return Ok(());
            }
            if let Some(frame) = self.frames.pop() {
                self.close_upvalues(frame.base);
                self.stack.truncate(frame.base);
            }
        }
        Err(thrown)
    }

    fn enter_handler(&mut self, exception: Value) -> bool {
        loop {
            let Some(handler) = self.frame().handlers.last().copied() else {
                return false;
            };
            let pending = TryState::Finalizing {
                resume: Some(exception),
            };
            let target = match handler.state {
                TryState::Running => {
                    let matched = handler
                        .class
                        .is_none_or(|class| self.is_instance_of(exception, class));
                    match handler.catch_ip {
                        Some(ip) if matched => Some((ip, TryState::Catching)),
                        _ => handler.finally_ip.map(|ip| (ip, pending)),
                    }
                }
                // Thrown from the catch body: the finally block still runs.
                TryState::Catching => handler.finally_ip.map(|ip| (ip, pending)),
                TryState::Finalizing { .. } => None,
            };

            let Some((ip, state)) = target else {
                self.frame_mut().handlers.pop();
                continue;
            };
            self.close_upvalues(handler.stack_height);
            self.stack.truncate(handler.stack_height);
            if state == TryState::Catching {
                self.stack.push(exception);
            }
            let frame = self.frame_mut();
            frame.ip = ip;
            if let Some(active) = frame.handlers.last_mut() {
                active.state = state;
            }
            return true;
        }
    }

    pub(crate) fn push_handler(&mut self, handler: Handler) {
        self.frame_mut().handlers.push(handler);
    }

    /// Normal completion of a try or catch body.
    pub(crate) fn end_try(&mut self) {
        let frame = self.frame_mut();
        let Some(handler) = frame.handlers.last_mut() else {
            unreachable!("end of try without a handler");
        };
        if handler.finally_ip.is_some() {
            handler.state = TryState::Finalizing { resume: None };
        } else {
            frame.handlers.pop();
        }
    }

    /// End of a finally block: resume propagation if an exception is pending.
    pub(crate) fn end_finally(&mut self) -> VmResult<()> {
        match self.frame_mut().handlers.pop() {
            Some(Handler {
                state: TryState::Finalizing {
                    resume: Some(exception),
                },
                ..
            }) => Err(Throw(exception)),
            _ => Ok(()),
        }
    }

    /// Build the host report for an exception nothing caught, print it if
    /// configured to, and return the VM to idle.
    pub(crate) fn uncaught(&mut self, thrown: Throw) -> RuntimeError {
        let exception = thrown.0;
        let names = self.names;
        let class = match exception
            .as_obj()
            .and_then(|r| self.heap.as_instance(r))
            .and_then(|i| self.heap.as_class(i.class))
        {
            Some(class) => self.heap.str(class.name).to_string(),
            None => "Exception".to_string(),
        };
        let file = self
            .exception_field(exception, names.srcfile)
            .and_then(|v| self.heap.value_str(v))
            .unwrap_or_default()
            .to_string();
        let line = self
            .exception_field(exception, names.srcline)
            .and_then(|v| v.as_number())
            .unwrap_or(0.0) as u32;
        let trace = self
            .exception_field(exception, names.stacktrace)
            .and_then(|v| v.as_obj())
            .and_then(|r| self.heap.as_array(r))
            .map(|array| {
                array
                    .items
                    .iter()
                    .filter_map(|item| self.heap.value_str(*item))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let error = RuntimeError {
            class,
            message: self.exception_message(exception),
            file,
            line,
            trace,
        };
        if self.config.report_uncaught {
            eprintln!("{}", render_report(&error));
        }
        self.reset();
        error
    }
}

/// The multi-line uncaught-exception report.
pub fn render_report(error: &RuntimeError) -> String {
    let mut out = format!("{error}\n  at {}:{}", error.file, error.line);
    if !error.trace.is_empty() {
        out.push_str("\n  StackTrace:");
        for entry in &error.trace {
            out.push_str("\n    ");
            out.push_str(entry);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn quiet_vm() -> Vm {
        Vm::new(VmConfig {
            report_uncaught: false,
            ..VmConfig::default()
        })
    }

    #[test]
    fn test_error_builds_exception_instance() {
        let mut vm = quiet_vm();
        let thrown = vm.error("boom");
        assert!(vm.is_instance_of(thrown.0, vm.classes.exception));
        assert_eq!(vm.exception_message(thrown.0), "boom");
    }

    #[test]
    fn test_arity_error_message() {
        let mut vm = quiet_vm();
        let thrown = vm.arity_error("f", 1, 2, 3);
        assert_eq!(vm.exception_message(thrown.0), "f() expects 1 to 2 arguments but got 3.");
        let thrown = vm.arity_error("g", 1, 1, 0);
        assert_eq!(vm.exception_message(thrown.0), "g() expects 1 argument but got 0.");
    }

    #[test]
    fn test_uncaught_report() {
        let mut vm = quiet_vm();
        let main = vm.main_module();
        let source = "function inner() { throw Exception(\"deep\"); }\nfunction outer() { inner(); }\nouter();";
        let error = match vm.interpret(source, main) {
            Err(crate::error::Error::Runtime(error)) => error,
            other => panic!("expected runtime error, got {other:?}"),
        };
        assert_eq!(error.class, "Exception");
        assert_eq!(error.message, "deep");
        assert_eq!(error.file, "<main>");
        assert_eq!(error.line, 1);
        assert_eq!(
            error.trace,
            vec![
                "<main>:1 -> inner()".to_string(),
                "<main>:2 -> outer()".to_string(),
                "<main>:3 -> <script>()".to_string(),
            ]
        );
        let report = render_report(&error);
        assert!(report.starts_with("Unhandled Exception: deep\n  at <main>:1"));
        assert!(report.contains("StackTrace:\n    <main>:1 -> inner()"));
        // The VM is idle again and keeps its bindings.
        assert!(vm.stack.is_empty());
        assert!(vm.interpret("return 1;", main).is_ok());
    }

    #[test]
    fn test_trace_is_capped() {
        let mut vm = Vm::new(VmConfig {
            report_uncaught: false,
            stack_trace_limit: 2,
            ..VmConfig::default()
        });
        let main = vm.main_module();
        let source = "function f(n) { if (n == 0) throw Exception(\"x\"); f(n - 1); }\nf(5);";
        match vm.interpret(source, main) {
            Err(crate::error::Error::Runtime(error)) => assert_eq!(error.trace.len(), 2),
            other => panic!("expected runtime error, got {other:?}"),
        }
    }
}
