// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Operator precedence and the parse-rule table.

use super::Compiler;
use crate::compiler::bytecode::OpCode;
use crate::lexer::TokenKind;

/// Binding power, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment,
    Ternary,
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equality,
    Comparison,
    Range,
    Shift,
    Term,
    Factor,
    Power,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter, for left-associative operands.
    pub fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Ternary,
            Precedence::Ternary => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::BitOr,
            Precedence::BitOr => Precedence::BitXor,
            Precedence::BitXor => Precedence::BitAnd,
            Precedence::BitAnd => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Range,
            Precedence::Range => Precedence::Shift,
            Precedence::Shift => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Power,
            Precedence::Power => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

/// A prefix or infix handler; the flag says whether assignment is allowed.
pub type ParseFn<'src, 'h> = fn(&mut Compiler<'src, 'h>, bool);

pub struct ParseRule<'src, 'h> {
    pub prefix: Option<ParseFn<'src, 'h>>,
    pub infix: Option<ParseFn<'src, 'h>>,
    pub precedence: Precedence,
}

impl<'src, 'h> ParseRule<'src, 'h> {
    fn new(
        prefix: Option<ParseFn<'src, 'h>>,
        infix: Option<ParseFn<'src, 'h>>,
        precedence: Precedence,
    ) -> Self {
        Self {
            prefix,
            infix,
            precedence,
        }
    }
}

impl<'src, 'h> Compiler<'src, 'h> {
    pub(super) fn rule(kind: &TokenKind) -> ParseRule<'src, 'h> {
        use Precedence as P;
        use TokenKind as T;

        match kind {
            T::LeftParen => ParseRule::new(Some(Self::grouping), Some(Self::call), P::Call),
            T::LeftBracket => ParseRule::new(Some(Self::array), Some(Self::index), P::Call),
            T::LeftBrace => ParseRule::new(Some(Self::dict), None, P::None),
            T::Dot => ParseRule::new(None, Some(Self::dot), P::Call),
            T::Minus => ParseRule::new(Some(Self::unary), Some(Self::binary), P::Term),
            T::Plus => ParseRule::new(None, Some(Self::binary), P::Term),
            T::Star | T::Slash | T::Percent => ParseRule::new(None, Some(Self::binary), P::Factor),
            T::StarStar => ParseRule::new(None, Some(Self::power), P::Power),
            T::Bang | T::Tilde => ParseRule::new(Some(Self::unary), None, P::None),
            T::EqualEqual | T::BangEqual => ParseRule::new(None, Some(Self::binary), P::Equality),
            T::Less | T::LessEqual | T::Greater | T::GreaterEqual | T::InstanceOf => {
                ParseRule::new(None, Some(Self::binary), P::Comparison)
            }
            T::DotDot => ParseRule::new(None, Some(Self::binary), P::Range),
            T::LessLess | T::GreaterGreater => ParseRule::new(None, Some(Self::binary), P::Shift),
            T::Ampersand => ParseRule::new(None, Some(Self::binary), P::BitAnd),
            T::Caret => ParseRule::new(None, Some(Self::binary), P::BitXor),
            T::Pipe => ParseRule::new(None, Some(Self::binary), P::BitOr),
            T::AmpAmp | T::And => ParseRule::new(None, Some(Self::and), P::And),
            T::PipePipe | T::Or => ParseRule::new(None, Some(Self::or), P::Or),
            T::Question => ParseRule::new(None, Some(Self::ternary), P::Ternary),
            T::Identifier(_) => ParseRule::new(Some(Self::variable), None, P::None),
            T::String(_) => ParseRule::new(Some(Self::string), None, P::None),
            T::Interpolation(_) => ParseRule::new(Some(Self::interpolation), None, P::None),
            T::Number(_) => ParseRule::new(Some(Self::number), None, P::None),
            T::True | T::False | T::Null => ParseRule::new(Some(Self::literal), None, P::None),
            T::This => ParseRule::new(Some(Self::this), None, P::None),
            T::Super => ParseRule::new(Some(Self::super_), None, P::None),
            T::Function => ParseRule::new(Some(Self::anonymous_function), None, P::None),
            _ => ParseRule::new(None, None, P::None),
        }
    }
}

/// Opcode of a binary operator token.
pub fn binary_op(kind: &TokenKind) -> Option<OpCode> {
    let op = match kind {
        TokenKind::Plus => OpCode::Add,
        TokenKind::Minus => OpCode::Subtract,
        TokenKind::Star => OpCode::Multiply,
        TokenKind::Slash => OpCode::Divide,
        TokenKind::Percent => OpCode::Modulo,
        TokenKind::StarStar => OpCode::Power,
        TokenKind::EqualEqual => OpCode::Equal,
        TokenKind::BangEqual => OpCode::NotEqual,
        TokenKind::Less => OpCode::Less,
        TokenKind::LessEqual => OpCode::LessEqual,
        TokenKind::Greater => OpCode::Greater,
        TokenKind::GreaterEqual => OpCode::GreaterEqual,
        TokenKind::InstanceOf => OpCode::InstanceOf,
        TokenKind::DotDot => OpCode::Range,
        TokenKind::LessLess => OpCode::ShiftLeft,
        TokenKind::GreaterGreater => OpCode::ShiftRight,
        TokenKind::Ampersand => OpCode::BitAnd,
        TokenKind::Pipe => OpCode::BitOr,
        TokenKind::Caret => OpCode::BitXor,
        _ => return None,
    };
    Some(op)
}

/// Assignment kind of a token: `Some(None)` for `=`, `Some(Some(op))` for
/// compound forms, `None` for anything else.
pub fn assignment_op(kind: &TokenKind) -> Option<Option<OpCode>> {
    let op = match kind {
        TokenKind::Equal => return Some(None),
        TokenKind::PlusEqual => OpCode::Add,
        TokenKind::MinusEqual => OpCode::Subtract,
        TokenKind::StarEqual => OpCode::Multiply,
        TokenKind::SlashEqual => OpCode::Divide,
        TokenKind::PercentEqual => OpCode::Modulo,
        TokenKind::StarStarEqual => OpCode::Power,
        TokenKind::AmpersandEqual => OpCode::BitAnd,
        TokenKind::PipeEqual => OpCode::BitOr,
        TokenKind::CaretEqual => OpCode::BitXor,
        TokenKind::LessLessEqual => OpCode::ShiftLeft,
        TokenKind::GreaterGreaterEqual => OpCode::ShiftRight,
        _ => return None,
    };
    Some(Some(op))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_order() {
        assert!(Precedence::Assignment < Precedence::Ternary);
        assert!(Precedence::Comparison < Precedence::Range);
        assert!(Precedence::Range < Precedence::Shift);
        assert!(Precedence::Power < Precedence::Unary);
        assert_eq!(Precedence::Term.next(), Precedence::Factor);
        assert_eq!(Precedence::Primary.next(), Precedence::Primary);
    }

    #[test]
    fn test_assignment_ops() {
        assert_eq!(assignment_op(&TokenKind::Equal), Some(None));
        assert_eq!(assignment_op(&TokenKind::StarStarEqual), Some(Some(OpCode::Power)));
        assert_eq!(assignment_op(&TokenKind::EqualEqual), None);
    }
}
