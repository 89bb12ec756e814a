// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Single-pass code generation.
//!
//! The `Compiler` pulls tokens from the scanner on demand and writes
//! bytecode as it recognizes each construct; no syntax tree is built.
//! Expressions go through a precedence-climbing loop driven by the rule
//! table in [`rules`], statements through recursive descent.
//!
//! # Module Structure
//!
//! - `scope`: per-function locals, upvalues, scopes and loops
//! - `rules`: precedence levels and the prefix/infix rule table
//! - `expressions`: expression handlers
//! - `statements`: declarations and statements
//! - `classes`: class bodies

mod classes;
mod expressions;
mod rules;
mod scope;
mod statements;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use tracing::debug;

use self::classes::ClassState;
use self::scope::{FunctionState, ScopeError};
use crate::compiler::bytecode::{Blob, OpCode};
use crate::error::{CompileError, CompileErrors};
use crate::gc::{Heap, ObjRef};
use crate::lexer::{Scanner, Span, Token, TokenKind};
use crate::runtime::{Function, FunctionKind, Obj, Value};

/// Largest constant index; `0xffff` is reserved as the wildcard class operand.
const MAX_CONSTANTS: usize = 0xffff;

/// Compiles source code to a script function.
pub struct Compiler<'src, 'h> {
    heap: &'h mut Heap,
    source: &'src str,
    scanner: Scanner<'src>,
    current: Token,
    previous: Token,
    errors: Vec<CompileError>,
    panic_mode: bool,
    /// Innermost function last
    functions: Vec<FunctionState>,
    classes: Vec<ClassState>,
    module: ObjRef,
}

impl<'src, 'h> Compiler<'src, 'h> {
    /// Creates a compiler emitting into functions owned by `module`.
    ///
    /// Allocates through `heap` without collecting; callers keep the heap
    /// paused for the compiler's lifetime.
    pub fn new(heap: &'h mut Heap, source: &'src str, module: ObjRef) -> Self {
        let eof = Token::new(TokenKind::Eof, Span::default(), 1);
        Self {
            heap,
            source,
            scanner: Scanner::new(source),
            current: eof.clone(),
            previous: eof,
            errors: Vec::new(),
            panic_mode: false,
            functions: vec![FunctionState::new(FunctionKind::Script, None)],
            classes: Vec::new(),
            module,
        }
    }

    /// Compiles the whole source into the script function.
    pub fn compile(mut self) -> Result<ObjRef, CompileErrors> {
        self.advance();
        while !self.matches(&TokenKind::Eof) {
            self.declaration();
        }
        let function = self.finish_function();
        if self.errors.is_empty() {
            Ok(function)
        } else {
            debug!(errors = self.errors.len(), "compilation failed");
            Err(CompileErrors(self.errors))
        }
    }

    // ========================================================================
    // Token stream
    // ========================================================================

    fn advance(&mut self) {
        let next = self.scanner.next_token();
        self.previous = std::mem::replace(&mut self.current, next);
        while let TokenKind::Error(message) = &self.current.kind {
            let message = message.clone();
            self.error_at_current(&message);
            self.current = self.scanner.next_token();
        }
    }

    /// The token after `current`, without consuming anything.
    fn peek_token(&self) -> TokenKind {
        self.scanner.clone().next_token().kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn consume_identifier(&mut self, message: &str) -> String {
        if let TokenKind::Identifier(name) = &self.current.kind {
            let name = name.clone();
            self.advance();
            name
        } else {
            self.error_at_current(message);
            String::new()
        }
    }

    // ========================================================================
    // Errors
    // ========================================================================

    fn error_at(&mut self, token: Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let location = match &token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error(_) => String::new(),
            _ => format!(" at '{}'", token.lexeme(self.source)),
        };
        self.errors.push(CompileError {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous.clone(), message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current.clone(), message);
    }

    fn scope_error(&mut self, error: ScopeError) {
        self.error(error.message());
    }

    /// Skip to a likely statement boundary after an error.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.check(&TokenKind::Eof) {
            if self.previous.kind == TokenKind::Semicolon || self.current.kind.starts_statement() {
                return;
            }
            self.advance();
        }
    }

    // ========================================================================
    // Emission
    // ========================================================================

    fn state(&self) -> &FunctionState {
        let last = self.functions.len() - 1;
        &self.functions[last]
    }

    fn state_mut(&mut self) -> &mut FunctionState {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    fn blob(&mut self) -> &mut Blob {
        &mut self.state_mut().blob
    }

    fn code_len(&self) -> usize {
        self.state().blob.len()
    }

    fn emit_op(&mut self, op: OpCode) -> usize {
        let line = self.previous.line;
        self.blob().write_op(op, line)
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.blob().write_byte(byte, line);
    }

    fn emit_u16(&mut self, value: u16) {
        let line = self.previous.line;
        self.blob().write_u16(value, line);
    }

    fn emit_op_u16(&mut self, op: OpCode, operand: u16) {
        self.emit_op(op);
        self.emit_u16(operand);
    }

    /// Emit a forward jump and return the offset of its operand.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_u16(crate::compiler::bytecode::UNPATCHED);
        self.code_len() - 2
    }

    /// Point the jump whose operand is at `operand` to the current offset.
    fn patch_jump(&mut self, operand: usize) {
        let distance = self.code_len() - operand - 2;
        match u16::try_from(distance) {
            Ok(distance) => self.blob().patch_u16(operand, distance),
            Err(_) => self.error("Too much code to jump over."),
        }
    }

    fn emit_loop(&mut self, start: usize) {
        self.emit_op(OpCode::Loop);
        let distance = self.code_len() - start + 2;
        match u16::try_from(distance) {
            Ok(distance) => self.emit_u16(distance),
            Err(_) => {
                self.error("Loop body too large.");
                self.emit_u16(0);
            }
        }
    }

    /// Absolute code offset usable as a handler address.
    fn code_address(&mut self) -> u16 {
        match u16::try_from(self.code_len()) {
            Ok(address) if address != crate::compiler::bytecode::UNPATCHED => address,
            _ => {
                self.error("Too much code in function.");
                0
            }
        }
    }

    fn make_constant(&mut self, value: Value) -> u16 {
        let index = self.blob().add_constant(value);
        if index >= MAX_CONSTANTS {
            self.error("Too many constants in one function.");
            return 0;
        }
        index as u16
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_u16(OpCode::Constant, index);
    }

    fn string_constant(&mut self, s: &str) -> u16 {
        let string = self.heap.intern(s);
        self.make_constant(Value::Obj(string))
    }

    /// Implicit return value: `this` for constructors, empty for scripts.
    fn emit_return(&mut self) {
        match self.state().kind {
            FunctionKind::Initializer => self.emit_op_u16(OpCode::GetLocal, 0),
            FunctionKind::Script => {
                self.emit_op(OpCode::Empty);
            }
            _ => {
                self.emit_op(OpCode::Null);
            }
        }
        self.emit_op(OpCode::Return);
    }

    // ========================================================================
    // Functions and scopes
    // ========================================================================

    fn begin_function(&mut self, kind: FunctionKind, name: Option<String>) {
        self.functions.push(FunctionState::new(kind, name));
    }

    /// Close the innermost function and allocate its function object.
    fn finish_function(&mut self) -> ObjRef {
        self.emit_return();
        let Some(state) = self.functions.pop() else {
            unreachable!("function stack underflow");
        };
        let name = state.name.as_deref().map(|name| self.heap.intern(name));
        self.heap.insert(Obj::Function(Function {
            name,
            kind: state.kind,
            arity: state.arity,
            required: state.required,
            variadic: state.variadic,
            upvalues: state.upvalues,
            blob: Rc::new(state.blob),
            module: self.module,
        }))
    }

    fn begin_scope(&mut self) {
        self.state_mut().begin_scope();
    }

    fn end_scope(&mut self) {
        let dropped = self.state_mut().end_scope();
        for local in dropped {
            self.emit_op(if local.captured {
                OpCode::CloseUpvalue
            } else {
                OpCode::Pop
            });
        }
    }

    /// Emit pops for locals deeper than `depth` while keeping them declared;
    /// used by jumps that leave scopes early.
    fn discard_locals(&mut self, depth: usize) {
        let ops: Vec<OpCode> = self
            .state()
            .locals_above(depth)
            .map(|local| {
                if local.captured {
                    OpCode::CloseUpvalue
                } else {
                    OpCode::Pop
                }
            })
            .collect();
        for op in ops {
            self.emit_op(op);
        }
    }

    /// Declare `name` in the current scope. Module scope needs no declaration.
    fn declare_variable(&mut self, name: &str) {
        if self.state().is_global_scope() {
            return;
        }
        if let Err(error) = self.state_mut().declare_local(name) {
            self.scope_error(error);
        }
    }

    /// Parse a variable name and declare it; returns the name constant for
    /// module bindings.
    fn parse_variable(&mut self, message: &str) -> (String, u16) {
        let name = self.consume_identifier(message);
        (name.clone(), self.bind_name(&name))
    }

    fn bind_name(&mut self, name: &str) -> u16 {
        self.declare_variable(name);
        if self.state().is_global_scope() {
            self.string_constant(name)
        } else {
            0
        }
    }

    fn mark_initialized(&mut self) {
        if !self.state().is_global_scope() {
            self.state_mut().mark_initialized();
        }
    }

    /// Bind the value on top of the stack to the variable just declared.
    fn define_variable(&mut self, global: u16) {
        if self.state().is_global_scope() {
            self.emit_op_u16(OpCode::DefineGlobal, global);
        } else {
            self.mark_initialized();
        }
    }

    /// Introduce a compiler-only local for the value on top of the stack.
    fn hidden_local(&mut self, name: &str) -> u16 {
        match self.state_mut().add_local(name) {
            Ok(slot) => {
                self.state_mut().mark_initialized();
                slot
            }
            Err(error) => {
                self.scope_error(error);
                0
            }
        }
    }

    fn resolve_local(&mut self, level: usize, name: &str) -> Option<u16> {
        match self.functions[level].resolve_local(name) {
            Ok(slot) => slot,
            Err(error) => {
                self.scope_error(error);
                None
            }
        }
    }

    /// Find `name` in an enclosing function, threading an upvalue through
    /// every function in between.
    fn resolve_upvalue(&mut self, level: usize, name: &str) -> Option<u16> {
        if level == 0 {
            return None;
        }
        let enclosing = level - 1;
        let (index, is_local) = match self.resolve_local(enclosing, name) {
            Some(slot) => {
                self.functions[enclosing].locals[slot as usize].captured = true;
                (slot, true)
            }
            None => (self.resolve_upvalue(enclosing, name)?, false),
        };
        match self.functions[level].add_upvalue(index, is_local) {
            Ok(index) => Some(index),
            Err(error) => {
                self.scope_error(error);
                None
            }
        }
    }
}
