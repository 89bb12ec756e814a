// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression handlers.

use super::Compiler;
use super::rules::{Precedence, assignment_op, binary_op};
use crate::compiler::bytecode::OpCode;
use crate::lexer::TokenKind;
use crate::runtime::{FunctionKind, Value};

impl<'src, 'h> Compiler<'src, 'h> {
    pub(super) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    pub(super) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = Self::rule(&self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= Self::rule(&self.current.kind).precedence {
            self.advance();
            if let Some(infix) = Self::rule(&self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && assignment_op(&self.current.kind).is_some() {
            self.advance();
            self.error("Invalid assignment target.");
        }
    }

    /// Consume an assignment operator if one follows and assignment is allowed.
    fn take_assignment(&mut self, can_assign: bool) -> Option<Option<OpCode>> {
        if !can_assign {
            return None;
        }
        let op = assignment_op(&self.current.kind)?;
        self.advance();
        Some(op)
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: usize = 0;
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.expression();
                if count == u8::MAX as usize {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "Expect ')' after arguments.");
        count.min(u8::MAX as usize) as u8
    }

    // ========================================================================
    // Prefix handlers
    // ========================================================================

    pub(super) fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(&TokenKind::RightParen, "Expect ')' after expression.");
    }

    pub(super) fn number(&mut self, _can_assign: bool) {
        if let TokenKind::Number(n) = self.previous.kind {
            self.emit_constant(Value::Number(n));
        }
    }

    pub(super) fn string(&mut self, _can_assign: bool) {
        if let TokenKind::String(s) = &self.previous.kind {
            let s = s.clone();
            let index = self.string_constant(&s);
            self.emit_op_u16(OpCode::Constant, index);
        }
    }

    /// `"a ${x} b"`: each embedded expression is stringified and added onto
    /// the text before it.
    pub(super) fn interpolation(&mut self, _can_assign: bool) {
        let TokenKind::Interpolation(first) = &self.previous.kind else {
            return;
        };
        let first = first.clone();
        let mut have_base = !first.is_empty();
        if have_base {
            let index = self.string_constant(&first);
            self.emit_op_u16(OpCode::Constant, index);
        }

        loop {
            self.expression();
            self.emit_op(OpCode::Stringify);
            if have_base {
                self.emit_op(OpCode::Add);
            }
            have_base = true;

            let (part, done) = match &self.current.kind {
                TokenKind::Interpolation(part) => (part.clone(), false),
                TokenKind::String(part) => (part.clone(), true),
                _ => {
                    self.error_at_current("Expect '}' after interpolated expression.");
                    return;
                }
            };
            self.advance();
            if !part.is_empty() {
                let index = self.string_constant(&part);
                self.emit_op_u16(OpCode::Constant, index);
                self.emit_op(OpCode::Add);
            }
            if done {
                return;
            }
        }
    }

    pub(super) fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::False => self.emit_op(OpCode::False),
            _ => self.emit_op(OpCode::Null),
        };
    }

    pub(super) fn variable(&mut self, can_assign: bool) {
        if let TokenKind::Identifier(name) = &self.previous.kind {
            let name = name.clone();
            self.named_variable(&name, can_assign);
        }
    }

    /// Load or assign a variable, resolving it as a local, then an upvalue,
    /// then a module binding.
    pub(super) fn named_variable(&mut self, name: &str, can_assign: bool) {
        let level = self.functions.len() - 1;
        let (get, set, operand) = if let Some(slot) = self.resolve_local(level, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(index) = self.resolve_upvalue(level, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, index)
        } else {
            let index = self.string_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, index)
        };

        match self.take_assignment(can_assign) {
            Some(None) => {
                self.expression();
                self.emit_op_u16(set, operand);
            }
            Some(Some(op)) => {
                self.emit_op_u16(get, operand);
                self.expression();
                self.emit_op(op);
                self.emit_op_u16(set, operand);
            }
            None => self.emit_op_u16(get, operand),
        }
    }

    pub(super) fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind.clone();
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Tilde => self.emit_op(OpCode::BitNot),
            _ => self.emit_op(OpCode::Not),
        };
    }

    pub(super) fn array(&mut self, _can_assign: bool) {
        let mut count: usize = 0;
        while !self.check(&TokenKind::RightBracket) && !self.check(&TokenKind::Eof) {
            self.expression();
            count += 1;
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RightBracket, "Expect ']' after array elements.");
        match u16::try_from(count) {
            Ok(count) => self.emit_op_u16(OpCode::Array, count),
            Err(_) => self.error("Too many elements in array literal."),
        }
    }

    /// `{key: value, ...}`; a bare identifier key is a string.
    pub(super) fn dict(&mut self, _can_assign: bool) {
        let mut count: usize = 0;
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            if let TokenKind::Identifier(name) = &self.current.kind {
                let name = name.clone();
                self.advance();
                let index = self.string_constant(&name);
                self.emit_op_u16(OpCode::Constant, index);
            } else {
                self.expression();
            }
            self.consume(&TokenKind::Colon, "Expect ':' after dictionary key.");
            self.expression();
            count += 1;
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RightBrace, "Expect '}' after dictionary entries.");
        match u16::try_from(count) {
            Ok(count) => self.emit_op_u16(OpCode::Dict, count),
            Err(_) => self.error("Too many entries in dictionary literal."),
        }
    }

    pub(super) fn this(&mut self, can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Cannot use 'this' outside of a class.");
            return;
        }
        self.named_variable("this", false);
        if self.matches(&TokenKind::Dot) {
            self.member(can_assign, true);
        }
    }

    pub(super) fn super_(&mut self, _can_assign: bool) {
        match self.classes.last().map(|class| class.has_superclass) {
            None => {
                self.error("Cannot use 'super' outside of a class.");
                return;
            }
            Some(false) => {
                self.error("Cannot use 'super' in a class with no superclass.");
                return;
            }
            Some(true) => {}
        }

        // super(args) runs the superclass constructor on this instance.
        if self.matches(&TokenKind::LeftParen) {
            let name = self.string_constant("constructor");
            self.named_variable("this", false);
            let argc = self.argument_list();
            self.named_variable("super", false);
            self.emit_op_u16(OpCode::SuperInvoke, name);
            self.emit_byte(argc);
            return;
        }

        self.consume(&TokenKind::Dot, "Expect '.' or '(' after 'super'.");
        let method = self.consume_identifier("Expect superclass method name.");
        let name = self.string_constant(&method);
        self.named_variable("this", false);
        if self.matches(&TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.named_variable("super", false);
            self.emit_op_u16(OpCode::SuperInvoke, name);
            self.emit_byte(argc);
        } else {
            self.named_variable("super", false);
            self.emit_op_u16(OpCode::GetSuper, name);
        }
    }

    pub(super) fn anonymous_function(&mut self, _can_assign: bool) {
        self.function(FunctionKind::Function, None);
    }

    // ========================================================================
    // Infix handlers
    // ========================================================================

    pub(super) fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind.clone();
        let precedence = Self::rule(&operator).precedence;
        self.parse_precedence(precedence.next());
        if let Some(op) = binary_op(&operator) {
            self.emit_op(op);
        }
    }

    /// Right associative: `2 ** 3 ** 2` is `2 ** 9`.
    pub(super) fn power(&mut self, _can_assign: bool) {
        self.parse_precedence(Precedence::Power);
        self.emit_op(OpCode::Power);
    }

    pub(super) fn and(&mut self, _can_assign: bool) {
        let end = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end);
    }

    pub(super) fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end);
    }

    pub(super) fn ternary(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Ternary);
        let end = self.emit_jump(OpCode::Jump);
        self.consume(&TokenKind::Colon, "Expect ':' in conditional expression.");
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Ternary);
        self.patch_jump(end);
    }

    pub(super) fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_op(OpCode::Call);
        self.emit_byte(argc);
    }

    pub(super) fn dot(&mut self, can_assign: bool) {
        self.member(can_assign, false);
    }

    /// Property read, write or method call after a `.`; `on_self` selects the
    /// opcodes that may touch private names.
    fn member(&mut self, can_assign: bool, on_self: bool) {
        let name = self.consume_identifier("Expect property name after '.'.");
        let index = self.string_constant(&name);
        let (get, set, invoke) = if on_self {
            (OpCode::GetSelfProperty, OpCode::SetSelfProperty, OpCode::InvokeSelf)
        } else {
            (OpCode::GetProperty, OpCode::SetProperty, OpCode::Invoke)
        };

        match self.take_assignment(can_assign) {
            Some(None) => {
                self.expression();
                self.emit_op_u16(set, index);
            }
            Some(Some(op)) => {
                self.emit_op(OpCode::Dup);
                self.emit_op_u16(get, index);
                self.expression();
                self.emit_op(op);
                self.emit_op_u16(set, index);
            }
            None => {
                if self.matches(&TokenKind::LeftParen) {
                    let argc = self.argument_list();
                    self.emit_op_u16(invoke, index);
                    self.emit_byte(argc);
                } else {
                    self.emit_op_u16(get, index);
                }
            }
        }
    }

    /// `target[i]`, `target[i] = v` and the slice forms `target[i:j]`.
    pub(super) fn index(&mut self, can_assign: bool) {
        if self.matches(&TokenKind::Colon) {
            self.emit_op(OpCode::Empty);
            self.slice_upper();
            return;
        }
        self.expression();
        if self.matches(&TokenKind::Colon) {
            self.slice_upper();
            return;
        }
        self.consume(&TokenKind::RightBracket, "Expect ']' after index.");

        match self.take_assignment(can_assign) {
            Some(None) => {
                self.expression();
                self.emit_op(OpCode::SetIndex);
            }
            Some(Some(op)) => {
                self.emit_op(OpCode::DupTwo);
                self.emit_op(OpCode::GetIndex);
                self.expression();
                self.emit_op(op);
                self.emit_op(OpCode::SetIndex);
            }
            None => {
                self.emit_op(OpCode::GetIndex);
            }
        }
    }

    fn slice_upper(&mut self) {
        if self.check(&TokenKind::RightBracket) {
            self.emit_op(OpCode::Empty);
        } else {
            self.expression();
        }
        self.consume(&TokenKind::RightBracket, "Expect ']' after slice.");
        self.emit_op(OpCode::GetRangedIndex);
    }
}
