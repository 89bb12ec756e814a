// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Class declarations.
//!
//! While the body compiles the class sits on the stack; each member
//! instruction pops its value into the class and leaves the class in place.

use super::Compiler;
use crate::compiler::bytecode::OpCode;
use crate::lexer::TokenKind;
use crate::runtime::FunctionKind;

/// A class whose body is being compiled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassState {
    pub has_superclass: bool,
}

/// Kind of method for a member name.
fn method_kind(name: &str) -> FunctionKind {
    if name == "constructor" {
        FunctionKind::Initializer
    } else if name.starts_with('_') {
        FunctionKind::Private
    } else {
        FunctionKind::Method
    }
}

impl<'src, 'h> Compiler<'src, 'h> {
    pub(super) fn class_declaration(&mut self) {
        let name = self.consume_identifier("Expect class name.");
        let name_constant = self.string_constant(&name);
        let global = self.bind_name(&name);

        self.emit_op_u16(OpCode::Class, name_constant);
        self.define_variable(global);
        self.classes.push(ClassState::default());

        if self.matches(&TokenKind::Extends) {
            let superclass = self.consume_identifier("Expect superclass name.");
            if superclass == name {
                self.error("A class cannot inherit from itself.");
            }
            self.named_variable(&superclass, false);
            while self.matches(&TokenKind::Dot) {
                let member = self.consume_identifier("Expect name after '.'.");
                let index = self.string_constant(&member);
                self.emit_op_u16(OpCode::GetProperty, index);
            }

            // Methods reach the superclass through this local.
            self.begin_scope();
            self.hidden_local("super");
            self.named_variable(&name, false);
            self.emit_op(OpCode::Inherit);
            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }
        }

        self.named_variable(&name, false);
        self.consume(&TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            self.class_member();
            if self.panic_mode {
                // Resynchronize at the statement level.
                break;
            }
        }
        self.consume(&TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        if self.classes.pop().is_some_and(|class| class.has_superclass) {
            self.end_scope();
        }
    }

    fn class_member(&mut self) {
        if self.matches(&TokenKind::Static) {
            if self.matches(&TokenKind::Var) {
                self.field(OpCode::StaticField);
            } else {
                let name = self.consume_identifier("Expect static method name.");
                self.method(name, FunctionKind::Method, OpCode::StaticMethod);
            }
            return;
        }

        if self.matches(&TokenKind::Var) {
            self.field(OpCode::Field);
            return;
        }

        if let TokenKind::Decorator(name) = &self.current.kind {
            let name = format!("@{name}");
            self.advance();
            self.method(name, FunctionKind::Method, OpCode::Method);
            return;
        }

        let name = self.consume_identifier("Expect method name.");
        // `get name()` / `set name(v)` are accessors; a method called `get`
        // is followed by `(` instead.
        if (name == "get" || name == "set") && matches!(self.current.kind, TokenKind::Identifier(_)) {
            let op = if name == "get" {
                OpCode::Getter
            } else {
                OpCode::Setter
            };
            let property = self.consume_identifier("Expect property name.");
            self.method(property, FunctionKind::Method, op);
            return;
        }

        let kind = method_kind(&name);
        self.method(name, kind, OpCode::Method);
    }

    fn method(&mut self, name: String, kind: FunctionKind, op: OpCode) {
        let index = self.string_constant(&name);
        self.function(kind, Some(name));
        self.emit_op_u16(op, index);
    }

    /// `var a = 1, b;` inside a class body.
    fn field(&mut self, op: OpCode) {
        loop {
            let name = self.consume_identifier("Expect field name.");
            let index = self.string_constant(&name);
            if self.matches(&TokenKind::Equal) {
                self.expression();
            } else {
                self.emit_op(OpCode::Null);
            }
            self.emit_op_u16(op, index);
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::Semicolon, "Expect ';' after field declaration.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_kind() {
        assert_eq!(method_kind("constructor"), FunctionKind::Initializer);
        assert_eq!(method_kind("_secret"), FunctionKind::Private);
        assert_eq!(method_kind("area"), FunctionKind::Method);
    }
}
