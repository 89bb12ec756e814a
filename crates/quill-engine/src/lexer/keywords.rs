// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Keyword lookup: dispatch on the identifier's length, then compare bytes
//! against the few candidates of exactly that length.

use super::TokenKind;

/// Every keyword, for completion and highlighting.
pub const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "break", "catch", "class", "continue", "do", "echo", "else",
    "extends", "false", "finally", "for", "function", "if", "import", "in", "instanceof", "null",
    "or", "return", "static", "super", "this", "throw", "true", "try", "var", "while",
];

/// Keyword token for `ident`, if it is one.
pub fn lookup(ident: &str) -> Option<TokenKind> {
    let kind = match ident.len() {
        2 => match ident {
            "as" => TokenKind::As,
            "do" => TokenKind::Do,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "or" => TokenKind::Or,
            _ => return None,
        },
        3 => match ident {
            "and" => TokenKind::And,
            "for" => TokenKind::For,
            "try" => TokenKind::Try,
            "var" => TokenKind::Var,
            _ => return None,
        },
        4 => match ident {
            "echo" => TokenKind::Echo,
            "else" => TokenKind::Else,
            "null" => TokenKind::Null,
            "this" => TokenKind::This,
            "true" => TokenKind::True,
            _ => return None,
        },
        5 => match ident {
            "break" => TokenKind::Break,
            "catch" => TokenKind::Catch,
            "class" => TokenKind::Class,
            "false" => TokenKind::False,
            "super" => TokenKind::Super,
            "throw" => TokenKind::Throw,
            "while" => TokenKind::While,
            _ => return None,
        },
        6 => match ident {
            "assert" => TokenKind::Assert,
            "import" => TokenKind::Import,
            "return" => TokenKind::Return,
            "static" => TokenKind::Static,
            _ => return None,
        },
        7 => match ident {
            "extends" => TokenKind::Extends,
            "finally" => TokenKind::Finally,
            _ => return None,
        },
        8 => match ident {
            "continue" => TokenKind::Continue,
            "function" => TokenKind::Function,
            _ => return None,
        },
        10 if ident == "instanceof" => TokenKind::InstanceOf,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("while"), Some(TokenKind::While));
        assert_eq!(lookup("instanceof"), Some(TokenKind::InstanceOf));
        assert_eq!(lookup("whilst"), None);
        assert_eq!(lookup(""), None);
        assert_eq!(lookup("constructor"), None);
    }

    #[test]
    fn test_every_keyword_resolves() {
        for word in KEYWORDS {
            assert!(lookup(word).is_some(), "{word} is not recognised");
        }
        assert_eq!(KEYWORDS.len(), 30);
    }
}
