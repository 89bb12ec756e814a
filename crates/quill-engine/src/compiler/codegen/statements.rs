// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Declarations and statements.

use super::Compiler;
use super::scope::LoopState;
use crate::compiler::bytecode::{ANY_EXCEPTION, OpCode, UNPATCHED};
use crate::lexer::TokenKind;
use crate::runtime::{FunctionKind, Value};

impl<'src, 'h> Compiler<'src, 'h> {
    pub(super) fn declaration(&mut self) {
        if self.matches(&TokenKind::Class) {
            self.class_declaration();
        } else if self.matches(&TokenKind::Function) {
            self.function_declaration();
        } else if self.matches(&TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self) {
        match self.current.kind {
            TokenKind::Echo => {
                self.advance();
                self.echo_statement();
            }
            TokenKind::If => {
                self.advance();
                self.if_statement();
            }
            TokenKind::While => {
                self.advance();
                self.while_statement();
            }
            TokenKind::Do => {
                self.advance();
                self.do_while_statement();
            }
            TokenKind::For => {
                self.advance();
                self.for_statement();
            }
            TokenKind::Break => {
                self.advance();
                self.break_statement();
            }
            TokenKind::Continue => {
                self.advance();
                self.continue_statement();
            }
            TokenKind::Return => {
                self.advance();
                self.return_statement();
            }
            TokenKind::Throw => {
                self.advance();
                self.expression();
                self.consume(&TokenKind::Semicolon, "Expect ';' after thrown value.");
                self.emit_op(OpCode::Throw);
            }
            TokenKind::Try => {
                self.advance();
                self.try_statement();
            }
            TokenKind::Assert => {
                self.advance();
                self.assert_statement();
            }
            TokenKind::Import => {
                self.advance();
                self.import_statement();
            }
            TokenKind::LeftBrace => {
                self.advance();
                self.begin_scope();
                self.block();
                self.end_scope();
            }
            TokenKind::Semicolon => self.advance(),
            _ => self.expression_statement(),
        }
    }

    pub(super) fn block(&mut self) {
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            self.declaration();
        }
        self.consume(&TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(&TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn var_declaration(&mut self) {
        loop {
            let (_, global) = self.parse_variable("Expect variable name.");
            if self.matches(&TokenKind::Equal) {
                self.expression();
            } else {
                self.emit_op(OpCode::Null);
            }
            self.define_variable(global);
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::Semicolon, "Expect ';' after variable declaration.");
    }

    fn function_declaration(&mut self) {
        let (name, global) = self.parse_variable("Expect function name.");
        // Usable inside its own body for recursion.
        self.mark_initialized();
        self.function(FunctionKind::Function, Some(name));
        self.define_variable(global);
    }

    /// Compile a parameter list and body, leaving a closure on the stack.
    pub(super) fn function(&mut self, kind: FunctionKind, name: Option<String>) {
        self.begin_function(kind, name);
        self.begin_scope();

        self.consume(&TokenKind::LeftParen, "Expect '(' after function name.");
        let mut defaulted = false;
        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.matches(&TokenKind::Ellipsis) {
                    let rest = self.consume_identifier("Expect rest parameter name.");
                    self.declare_variable(&rest);
                    self.mark_initialized();
                    self.state_mut().variadic = true;
                    if self.check(&TokenKind::Comma) {
                        self.error_at_current("Rest parameter must be last.");
                    }
                    break;
                }

                let param = self.consume_identifier("Expect parameter name.");
                self.declare_variable(&param);
                self.mark_initialized();
                let slot = self.state().locals.len() as u16 - 1;
                self.state_mut().arity += 1;

                if self.matches(&TokenKind::Equal) {
                    defaulted = true;
                    self.default_argument(slot, true);
                } else if defaulted {
                    self.default_argument(slot, false);
                } else {
                    self.state_mut().required += 1;
                }

                if self.state().arity > u8::MAX as usize {
                    self.error("Can't have more than 255 parameters.");
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(&TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let function = self.finish_function();
        let index = self.make_constant(Value::Obj(function));
        self.emit_op_u16(OpCode::Closure, index);
    }

    /// Prologue that fills parameter `slot` when the caller left it out:
    /// with the expression that follows, or with null.
    fn default_argument(&mut self, slot: u16, has_value: bool) {
        self.emit_op(OpCode::ArgDefault);
        self.emit_u16(slot);
        self.emit_u16(UNPATCHED);
        let skip = self.code_len() - 2;
        if has_value {
            self.expression();
        } else {
            self.emit_op(OpCode::Null);
        }
        self.emit_op_u16(OpCode::SetLocal, slot);
        self.emit_op(OpCode::Pop);
        self.patch_jump(skip);
    }

    // ========================================================================
    // Simple statements
    // ========================================================================

    fn echo_statement(&mut self) {
        self.expression();
        self.consume(&TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Echo);
    }

    fn assert_statement(&mut self) {
        self.expression();
        if self.matches(&TokenKind::Comma) {
            self.expression();
        } else {
            self.emit_op(OpCode::Null);
        }
        self.consume(&TokenKind::Semicolon, "Expect ';' after assertion.");
        self.emit_op(OpCode::Assert);
    }

    fn return_statement(&mut self) {
        if self.matches(&TokenKind::Semicolon) {
            self.emit_return();
            return;
        }
        if self.state().kind == FunctionKind::Initializer {
            self.error("Cannot return a value from a constructor.");
        }
        self.expression();
        self.consume(&TokenKind::Semicolon, "Expect ';' after return value.");
        self.emit_op(OpCode::Return);
    }

    /// `import name;` or `import "path" as name;`
    fn import_statement(&mut self) {
        let (path, default_binding) = match &self.current.kind {
            TokenKind::String(path) => (path.clone(), None),
            TokenKind::Identifier(name) => (name.clone(), Some(name.clone())),
            _ => {
                self.error_at_current("Expect module name or path after 'import'.");
                return;
            }
        };
        self.advance();

        let binding = if self.matches(&TokenKind::As) {
            self.consume_identifier("Expect binding name after 'as'.")
        } else if let Some(name) = default_binding {
            name
        } else {
            self.error_at_current("Expect 'as' after import path.");
            return;
        };

        let index = self.string_constant(&path);
        self.emit_op_u16(OpCode::Import, index);
        let global = self.bind_name(&binding);
        self.define_variable(global);
        self.consume(&TokenKind::Semicolon, "Expect ';' after import.");
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn if_statement(&mut self) {
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(&TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.matches(&TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn begin_loop(&mut self, start: Option<usize>) {
        let depth = self.state().scope_depth;
        self.begin_loop_at(start, depth);
    }

    /// Like `begin_loop`, but `break` also drops the locals between
    /// `break_depth` and the current depth.
    fn begin_loop_at(&mut self, start: Option<usize>, break_depth: usize) {
        let body_start = self.code_len();
        let state = self.state_mut();
        let loop_state = LoopState {
            start,
            body_start,
            continue_jumps: Vec::new(),
            scope_depth: state.scope_depth,
            break_depth,
            try_depth: state.try_depth,
        };
        state.loops.push(loop_state);
    }

    /// Close the innermost loop: every break placeholder in its body becomes
    /// a jump to the current offset.
    fn end_loop(&mut self) {
        let Some(loop_state) = self.state_mut().loops.pop() else {
            return;
        };
        let exit = self.code_len();
        let mut offset = loop_state.body_start;
        while offset < exit {
            let Some(op) = self.state().blob.op_at(offset) else {
                unreachable!("instruction boundary expected at {offset}");
            };
            if op == OpCode::BreakPlaceholder {
                let distance = exit - offset - 3;
                match u16::try_from(distance) {
                    Ok(distance) => {
                        let blob = self.blob();
                        blob.code[offset].byte = OpCode::Jump as u8;
                        blob.patch_u16(offset + 1, distance);
                    }
                    Err(_) => self.error("Too much code to jump over."),
                }
            }
            offset += 1 + op.operand_len();
        }
    }

    /// Unwind the try regions and locals a jump out of the loop body leaves.
    /// Returns the loop's `continue` target, `Some(None)` when it is not
    /// emitted yet.
    fn exit_loop_body(&mut self, keyword: &str) -> Option<Option<usize>> {
        let Some((start, scope_depth, try_depth)) = self.state().loops.last().map(|l| {
            let depth = if keyword == "break" { l.break_depth } else { l.scope_depth };
            (l.start, depth, l.try_depth)
        }) else {
            self.error(&format!("Cannot use '{keyword}' outside of a loop."));
            return None;
        };
        for _ in try_depth..self.state().try_depth {
            self.emit_op(OpCode::PopTry);
        }
        self.discard_locals(scope_depth);
        Some(start)
    }

    fn break_statement(&mut self) {
        self.consume(&TokenKind::Semicolon, "Expect ';' after 'break'.");
        if self.exit_loop_body("break").is_some() {
            self.emit_op(OpCode::BreakPlaceholder);
            self.emit_u16(UNPATCHED);
        }
    }

    fn continue_statement(&mut self) {
        self.consume(&TokenKind::Semicolon, "Expect ';' after 'continue'.");
        match self.exit_loop_body("continue") {
            Some(Some(start)) => self.emit_loop(start),
            Some(None) => {
                let jump = self.emit_jump(OpCode::Jump);
                if let Some(loop_state) = self.state_mut().loops.last_mut() {
                    loop_state.continue_jumps.push(jump);
                }
            }
            None => {}
        }
    }

    fn while_statement(&mut self) {
        let start = self.code_len();
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(&TokenKind::RightParen, "Expect ')' after condition.");

        let exit = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.begin_loop(Some(start));
        self.statement();
        self.emit_loop(start);

        self.patch_jump(exit);
        self.emit_op(OpCode::Pop);
        self.end_loop();
    }

    /// The condition follows the body, so `continue` jumps forward to it.
    fn do_while_statement(&mut self) {
        let body = self.code_len();
        self.begin_loop(None);
        self.statement();

        let continues = self
            .state_mut()
            .loops
            .last_mut()
            .map(|l| std::mem::take(&mut l.continue_jumps))
            .unwrap_or_default();
        for jump in continues {
            self.patch_jump(jump);
        }

        self.consume(&TokenKind::While, "Expect 'while' after do body.");
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(&TokenKind::RightParen, "Expect ')' after condition.");
        self.consume(&TokenKind::Semicolon, "Expect ';' after do-while condition.");

        let exit = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.emit_loop(body);
        self.patch_jump(exit);
        self.emit_op(OpCode::Pop);
        self.end_loop();
    }

    /// C-style `for`. Variables declared by the initializer are copied into
    /// fresh locals for every pass through the body and written back before
    /// the step runs, so closures keep the value of their own iteration.
    fn for_statement(&mut self) {
        self.consume(&TokenKind::LeftParen, "Expect '(' after 'for'.");
        let has_var = self.matches(&TokenKind::Var);
        if matches!(self.current.kind, TokenKind::Identifier(_))
            && matches!(self.peek_token(), TokenKind::In | TokenKind::Comma)
        {
            self.for_in_statement();
            return;
        }

        self.begin_scope();
        let loop_depth = self.state().scope_depth;
        if has_var {
            self.var_declaration();
        } else if !self.matches(&TokenKind::Semicolon) {
            self.expression_statement();
        }
        let loop_vars: Vec<(String, u16)> = self
            .state()
            .locals
            .iter()
            .enumerate()
            .filter(|(_, local)| local.depth == Some(loop_depth))
            .map(|(slot, local)| (local.name.clone(), slot as u16))
            .collect();

        let mut start = self.code_len();
        let mut exit = None;
        if !self.matches(&TokenKind::Semicolon) {
            self.expression();
            self.consume(&TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.matches(&TokenKind::RightParen) {
            let body = self.emit_jump(OpCode::Jump);
            let step = self.code_len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(&TokenKind::RightParen, "Expect ')' after for clauses.");
            self.emit_loop(start);
            start = step;
            self.patch_jump(body);
        }

        self.begin_scope();
        let mut copies = Vec::with_capacity(loop_vars.len());
        for (name, slot) in &loop_vars {
            self.emit_op_u16(OpCode::GetLocal, *slot);
            self.declare_variable(name);
            self.mark_initialized();
            copies.push(self.state().locals.len() as u16 - 1);
        }

        // `continue` lands on the write-back below, with the copies still live.
        self.begin_loop_at(None, loop_depth);
        self.statement();
        let continues = self
            .state_mut()
            .loops
            .last_mut()
            .map(|l| std::mem::take(&mut l.continue_jumps))
            .unwrap_or_default();
        for jump in continues {
            self.patch_jump(jump);
        }

        for ((_, slot), copy) in loop_vars.iter().zip(&copies) {
            self.emit_op_u16(OpCode::GetLocal, *copy);
            self.emit_op_u16(OpCode::SetLocal, *slot);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
        self.emit_loop(start);

        if let Some(exit) = exit {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }
        self.end_loop();
        self.end_scope();
    }

    /// `for (v in xs)` or `for (k, v in xs)`. The iterable and a cursor live
    /// in hidden locals; every iteration binds fresh variables.
    fn for_in_statement(&mut self) {
        self.begin_scope();
        let first = self.consume_identifier("Expect loop variable name.");
        let (key, value) = if self.matches(&TokenKind::Comma) {
            let value = self.consume_identifier("Expect value variable name.");
            (Some(first), value)
        } else {
            (None, first)
        };
        self.consume(&TokenKind::In, "Expect 'in' after loop variable.");
        self.expression();
        self.consume(&TokenKind::RightParen, "Expect ')' after iterable.");

        let iterable = self.hidden_local("$iterable");
        self.emit_op(OpCode::Empty);
        let cursor = self.hidden_local("$cursor");

        let start = self.code_len();
        self.emit_op_u16(OpCode::GetLocal, iterable);
        self.emit_op_u16(OpCode::GetLocal, cursor);
        self.emit_op(OpCode::IterNext);
        self.emit_op_u16(OpCode::SetLocal, cursor);
        let exit = self.emit_jump(OpCode::JumpIfEmpty);
        self.emit_op(OpCode::Pop);

        self.begin_loop(Some(start));
        self.begin_scope();
        match key {
            Some(key) => {
                self.emit_op_u16(OpCode::GetLocal, iterable);
                self.emit_op_u16(OpCode::GetLocal, cursor);
                self.emit_op(OpCode::IterKey);
                self.declare_variable(&key);
                self.mark_initialized();
                let key_slot = self.state().locals.len() as u16 - 1;
                self.emit_op_u16(OpCode::GetLocal, iterable);
                self.emit_op_u16(OpCode::GetLocal, key_slot);
                self.emit_op(OpCode::GetIndex);
            }
            None => {
                self.emit_op_u16(OpCode::GetLocal, iterable);
                self.emit_op_u16(OpCode::GetLocal, cursor);
                self.emit_op(OpCode::IterValue);
            }
        }
        self.declare_variable(&value);
        self.mark_initialized();

        self.statement();
        self.end_scope();
        self.emit_loop(start);

        self.patch_jump(exit);
        self.emit_op(OpCode::Pop);
        self.end_loop();
        self.end_scope();
    }

    /// try/catch/finally. At run time the region is a handler moving through
    /// running, catching and finalizing; the `Try` instruction carries the
    /// catch class and both block addresses.
    fn try_statement(&mut self) {
        self.emit_op(OpCode::Try);
        let operands = self.code_len();
        for _ in 0..3 {
            self.emit_u16(UNPATCHED);
        }
        self.state_mut().try_depth += 1;

        self.consume(&TokenKind::LeftBrace, "Expect '{' after 'try'.");
        self.begin_scope();
        self.block();
        self.end_scope();
        self.emit_op(OpCode::EndTry);
        let skip_catch = self.emit_jump(OpCode::Jump);

        let mut class = ANY_EXCEPTION;
        let mut catch_address = UNPATCHED;
        let has_catch = self.matches(&TokenKind::Catch);
        if has_catch {
            catch_address = self.code_address();
            self.consume(&TokenKind::LeftParen, "Expect '(' after 'catch'.");
            let first = self.consume_identifier("Expect exception variable name.");
            let name = if matches!(self.current.kind, TokenKind::Identifier(_)) {
                class = self.string_constant(&first);
                self.consume_identifier("Expect exception variable name.")
            } else {
                first
            };
            self.consume(&TokenKind::RightParen, "Expect ')' after catch clause.");

            self.begin_scope();
            // The VM pushes the exception where this local lives.
            self.declare_variable(&name);
            self.mark_initialized();
            self.consume(&TokenKind::LeftBrace, "Expect '{' after catch clause.");
            self.block();
            self.end_scope();
            self.emit_op(OpCode::EndTry);
        }

        self.patch_jump(skip_catch);
        let mut finally_address = UNPATCHED;
        if self.matches(&TokenKind::Finally) {
            finally_address = self.code_address();
            self.consume(&TokenKind::LeftBrace, "Expect '{' after 'finally'.");
            self.begin_scope();
            self.block();
            self.end_scope();
            self.emit_op(OpCode::EndFinally);
        } else if !has_catch {
            self.error_at_current("Expect 'catch' or 'finally' after try block.");
        }

        let blob = self.blob();
        blob.patch_u16(operands, class);
        blob.patch_u16(operands + 2, catch_address);
        blob.patch_u16(operands + 4, finally_address);
        self.state_mut().try_depth -= 1;
    }
}
