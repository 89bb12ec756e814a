// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The scanner that produces tokens from source text, one per call.

use super::{Span, Token, TokenKind, keywords};

/// Maximum number of simultaneously open interpolated strings.
pub const MAX_INTERPOLATION_DEPTH: usize = 8;

/// An interpolated string waiting for its `${ ... }` to close.
#[derive(Debug, Clone, Copy)]
struct OpenString {
    quote: char,
    /// Unmatched `{` seen inside the current interpolation
    braces: usize,
}

/// A scanner that tokenizes source code on demand.
#[derive(Clone)]
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: u32,
    interpolations: Vec<OpenString>,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            interpolations: Vec::new(),
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        if let Err(message) = self.skip_whitespace_and_comments() {
            return Token::new(
                TokenKind::Error(message),
                Span::new(self.current_pos, self.current_pos),
                self.line,
            );
        }

        let start = self.current_pos;
        let line = self.line;

        let Some((_pos, ch)) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::new(start, start), line);
        };

        let kind = match ch {
            // Single-character tokens
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '~' => TokenKind::Tilde,
            '{' => {
                if let Some(open) = self.interpolations.last_mut() {
                    open.braces += 1;
                }
                TokenKind::LeftBrace
            }
            '}' => match self.interpolations.last_mut() {
                Some(open) if open.braces == 0 => {
                    let quote = open.quote;
                    self.interpolations.pop();
                    self.scan_string_body(quote)
                }
                Some(open) => {
                    open.braces -= 1;
                    TokenKind::RightBrace
                }
                None => TokenKind::RightBrace,
            },

            // Multi-character tokens
            '.' => self.scan_dot(),
            '+' => self.either('=', TokenKind::PlusEqual, TokenKind::Plus),
            '-' => self.either('=', TokenKind::MinusEqual, TokenKind::Minus),
            '*' => self.scan_star(),
            '/' => self.either('=', TokenKind::SlashEqual, TokenKind::Slash),
            '%' => self.either('=', TokenKind::PercentEqual, TokenKind::Percent),
            '^' => self.either('=', TokenKind::CaretEqual, TokenKind::Caret),
            '!' => self.either('=', TokenKind::BangEqual, TokenKind::Bang),
            '=' => self.either('=', TokenKind::EqualEqual, TokenKind::Equal),
            '<' => self.scan_angle('<', TokenKind::Less, TokenKind::LessEqual),
            '>' => self.scan_angle('>', TokenKind::Greater, TokenKind::GreaterEqual),
            '&' => self.scan_logical('&'),
            '|' => self.scan_logical('|'),

            // String literals
            '"' | '\'' => self.scan_string_body(ch),

            // Numbers
            '0'..='9' => self.scan_number(ch),

            '@' => self.scan_decorator(),

            // Identifiers and keywords
            _ if is_id_start(ch) => self.scan_identifier(start),

            _ => TokenKind::Error(format!("Unexpected character '{ch}'.")),
        };

        Token::new(kind, Span::new(start, self.current_pos), line)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
            }
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn either(&mut self, next: char, long: TokenKind, short: TokenKind) -> TokenKind {
        if self.matches(next) { long } else { short }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), String> {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\n' | '\r') => {
                    self.advance();
                }
                Some('/') => match self.peek_next() {
                    Some('/') => {
                        while let Some(ch) = self.peek() {
                            if ch == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => self.skip_block_comment()?,
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    /// Block comments nest: `/* a /* b */ c */` is one comment.
    fn skip_block_comment(&mut self) -> Result<(), String> {
        self.advance();
        self.advance();
        let mut depth = 1;
        while depth > 0 {
            match self.advance() {
                Some((_, '*')) if self.peek() == Some('/') => {
                    self.advance();
                    depth -= 1;
                }
                Some((_, '/')) if self.peek() == Some('*') => {
                    self.advance();
                    depth += 1;
                }
                Some(_) => {}
                None => return Err("Unterminated block comment.".to_string()),
            }
        }
        Ok(())
    }

    fn scan_dot(&mut self) -> TokenKind {
        if self.matches('.') {
            if self.matches('.') {
                TokenKind::Ellipsis
            } else {
                TokenKind::DotDot
            }
        } else {
            TokenKind::Dot
        }
    }

    fn scan_star(&mut self) -> TokenKind {
        if self.matches('*') {
            self.either('=', TokenKind::StarStarEqual, TokenKind::StarStar)
        } else {
            self.either('=', TokenKind::StarEqual, TokenKind::Star)
        }
    }

    fn scan_angle(&mut self, ch: char, single: TokenKind, or_equal: TokenKind) -> TokenKind {
        if self.matches(ch) {
            let (shift, shift_equal) = if ch == '<' {
                (TokenKind::LessLess, TokenKind::LessLessEqual)
            } else {
                (TokenKind::GreaterGreater, TokenKind::GreaterGreaterEqual)
            };
            self.either('=', shift_equal, shift)
        } else {
            self.either('=', or_equal, single)
        }
    }

    fn scan_logical(&mut self, ch: char) -> TokenKind {
        let (double, assign, single) = if ch == '&' {
            (TokenKind::AmpAmp, TokenKind::AmpersandEqual, TokenKind::Ampersand)
        } else {
            (TokenKind::PipePipe, TokenKind::PipeEqual, TokenKind::Pipe)
        };
        if self.matches(ch) {
            double
        } else {
            self.either('=', assign, single)
        }
    }

    /// Scan string contents up to the closing quote or, for double quotes, an
    /// interpolation opener. Also used to resume a string after its `}`.
    fn scan_string_body(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();
        loop {
            let Some((_, ch)) = self.advance() else {
                return TokenKind::Error("Unterminated string.".to_string());
            };
            match ch {
                c if c == quote => break,
                '\\' => match self.scan_escape() {
                    Ok(c) => value.push(c),
                    Err(message) => return TokenKind::Error(message),
                },
                '$' if quote == '"' && self.peek() == Some('{') => {
                    self.advance();
                    if self.interpolations.len() >= MAX_INTERPOLATION_DEPTH {
                        return TokenKind::Error("Interpolation nested too deeply.".to_string());
                    }
                    self.interpolations.push(OpenString { quote, braces: 0 });
                    return TokenKind::Interpolation(value);
                }
                c => value.push(c),
            }
        }
        TokenKind::String(value)
    }

    fn scan_escape(&mut self) -> Result<char, String> {
        let Some((_, ch)) = self.advance() else {
            return Err("Unterminated string.".to_string());
        };
        let c = match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '$' => '$',
            'u' => return self.scan_unicode_escape(),
            other => return Err(format!("Invalid escape sequence '\\{other}'.")),
        };
        Ok(c)
    }

    /// `\uXXXX` or `\u{X..}`.
    fn scan_unicode_escape(&mut self) -> Result<char, String> {
        let braced = self.matches('{');
        let mut digits = String::new();
        while let Some(ch) = self.peek() {
            if !ch.is_ascii_hexdigit() || (!braced && digits.len() == 4) {
                break;
            }
            digits.push(ch);
            self.advance();
        }
        if braced && !self.matches('}') {
            return Err("Unterminated unicode escape.".to_string());
        }
        if digits.is_empty() || (!braced && digits.len() != 4) {
            return Err("Invalid unicode escape.".to_string());
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| "Invalid unicode code point.".to_string())
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        if first == '0' {
            let radix = match self.peek() {
                Some('x' | 'X') => Some(16),
                Some('b' | 'B') => Some(2),
                Some('o' | 'O') => Some(8),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                return self.scan_radix_digits(radix);
            }
        }

        let mut text = String::from(first);
        self.take_digits(&mut text);

        // A `.` followed by a digit is a fraction; `1..2` is a range.
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            text.push('.');
            self.take_digits(&mut text);
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            let mut sign = lookahead.peek().map(|(_, c)| *c);
            if matches!(sign, Some('+' | '-')) {
                lookahead.next();
                sign = lookahead.peek().map(|(_, c)| *c);
            }
            if sign.is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
                text.push('e');
                if let Some(c @ ('+' | '-')) = self.peek() {
                    self.advance();
                    text.push(c);
                }
                self.take_digits(&mut text);
            }
        }

        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Error(format!("Invalid number literal '{text}'.")),
        }
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
            } else if ch != '_' {
                break;
            }
            self.advance();
        }
    }

    fn scan_radix_digits(&mut self, radix: u32) -> TokenKind {
        let mut value = 0f64;
        let mut count = 0;
        while let Some(ch) = self.peek() {
            if ch == '_' {
                self.advance();
                continue;
            }
            let Some(digit) = ch.to_digit(radix) else {
                break;
            };
            value = value * radix as f64 + digit as f64;
            count += 1;
            self.advance();
        }
        if count == 0 || self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            let name = match radix {
                2 => "binary",
                8 => "octal",
                _ => "hexadecimal",
            };
            return TokenKind::Error(format!("Invalid {name} literal."));
        }
        TokenKind::Number(value)
    }

    fn scan_identifier(&mut self, start: usize) -> TokenKind {
        while let Some(ch) = self.peek() {
            if !is_id_continue(ch) {
                break;
            }
            self.advance();
        }
        let ident = &self.source[start..self.current_pos];
        keywords::lookup(ident).unwrap_or_else(|| TokenKind::Identifier(ident.to_string()))
    }

    fn scan_decorator(&mut self) -> TokenKind {
        let start = self.current_pos;
        match self.peek() {
            Some(ch) if is_id_start(ch) => {
                self.advance();
                match self.scan_identifier(start) {
                    TokenKind::Identifier(name) => TokenKind::Decorator(name),
                    _ => TokenKind::Error("Decorator name cannot be a keyword.".to_string()),
                }
            }
            _ => TokenKind::Error("Expected decorator name after '@'.".to_string()),
        }
    }
}

fn is_id_start(ch: char) -> bool {
    ch == '_' || unicode_xid::UnicodeXID::is_xid_start(ch)
}

fn is_id_continue(ch: char) -> bool {
    unicode_xid::UnicodeXID::is_xid_continue(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let token = scanner.next_token();
            if token.kind == TokenKind::Eof {
                return out;
            }
            out.push(token.kind);
        }
    }

    #[test]
    fn test_numbers() {
        let mut scanner = Scanner::new("42 1.5 1e3 0x1F 0b101 0o17 1_000");
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 42.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 1.5));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 1000.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 31.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 5.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 15.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 1000.0));
    }

    #[test]
    fn test_malformed_radix_is_error_token() {
        assert!(matches!(kinds("0x")[0], TokenKind::Error(_)));
        assert!(matches!(kinds("0b12")[0], TokenKind::Error(_)));
    }

    #[test]
    fn test_range_is_not_a_fraction() {
        assert_eq!(
            kinds("1..5"),
            vec![TokenKind::Number(1.0), TokenKind::DotDot, TokenKind::Number(5.0)]
        );
    }

    #[test]
    fn test_longest_match_operators() {
        assert_eq!(
            kinds("** **= <<= >> && |= ... == ="),
            vec![
                TokenKind::StarStar,
                TokenKind::StarStarEqual,
                TokenKind::LessLessEqual,
                TokenKind::GreaterGreater,
                TokenKind::AmpAmp,
                TokenKind::PipeEqual,
                TokenKind::Ellipsis,
                TokenKind::EqualEqual,
                TokenKind::Equal,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("var classy class _x"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier("classy".into()),
                TokenKind::Class,
                TokenKind::Identifier("_x".into()),
            ]
        );
    }

    #[test]
    fn test_plain_string_does_not_interpolate() {
        assert_eq!(kinds("'a ${b}'"), vec![TokenKind::String("a ${b}".into())]);
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(
            kinds(r#""a ${x} b ${y}""#),
            vec![
                TokenKind::Interpolation("a ".into()),
                TokenKind::Identifier("x".into()),
                TokenKind::Interpolation(" b ".into()),
                TokenKind::Identifier("y".into()),
                TokenKind::String("".into()),
            ]
        );
    }

    #[test]
    fn test_nested_interpolation_resumes_outer_string() {
        assert_eq!(
            kinds(r#""x${ "in${1}" }y""#),
            vec![
                TokenKind::Interpolation("x".into()),
                TokenKind::Interpolation("in".into()),
                TokenKind::Number(1.0),
                TokenKind::String("".into()),
                TokenKind::String("y".into()),
            ]
        );
    }

    #[test]
    fn test_braces_inside_interpolation() {
        assert_eq!(
            kinds(r#""${ {} }!""#),
            vec![
                TokenKind::Interpolation("".into()),
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::String("!".into()),
            ]
        );
    }

    #[test]
    fn test_interpolation_depth_limit() {
        let mut source = String::new();
        for _ in 0..=MAX_INTERPOLATION_DEPTH {
            source.push_str("\"${");
        }
        assert!(kinds(&source).iter().any(|k| matches!(k, TokenKind::Error(_))));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(
            kinds(r#""\n\tA\u{1F600}\$""#),
            vec![TokenKind::String("\n\tA\u{1F600}$".into())]
        );
        assert!(matches!(kinds(r#""\q""#)[0], TokenKind::Error(_)));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(kinds("\"abc")[0], TokenKind::Error(_)));
    }

    #[test]
    fn test_nested_block_comments_and_lines() {
        let mut scanner = Scanner::new("/* a /* b */\n c */ x // tail\n y");
        let x = scanner.next_token();
        assert_eq!(x.kind, TokenKind::Identifier("x".into()));
        assert_eq!(x.line, 2);
        let y = scanner.next_token();
        assert_eq!(y.line, 3);
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert!(matches!(kinds("/* /* */")[0], TokenKind::Error(_)));
    }

    #[test]
    fn test_decorator() {
        assert_eq!(kinds("@to_string"), vec![TokenKind::Decorator("to_string".into())]);
        assert!(matches!(kinds("@ x")[0], TokenKind::Error(_)));
    }

    #[test]
    fn test_lexeme() {
        let source = "foo + bar";
        let mut scanner = Scanner::new(source);
        scanner.next_token();
        let plus = scanner.next_token();
        assert_eq!(plus.lexeme(source), "+");
    }
}
