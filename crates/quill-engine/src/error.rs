// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types reported to the host.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while loading or running a script
#[derive(Debug, Error)]
pub enum Error {
    /// The source did not compile
    #[error("{0}")]
    Compile(#[from] CompileErrors),

    /// A script exception nothing caught
    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    /// Reading a script or configuration file failed
    #[error("Cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// One diagnostic from the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct CompileError {
    pub line: u32,
    /// ` at 'token'`, ` at end`, or empty for lexical errors
    pub location: String,
    pub message: String,
}

/// Every diagnostic of a failed compilation, in source order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

/// An uncaught script exception, as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unhandled {class}: {message}")]
pub struct RuntimeError {
    /// Class name of the thrown instance
    pub class: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    /// `file:line -> function()` entries, innermost first
    pub trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        let error = CompileError {
            line: 3,
            location: " at ';'".to_string(),
            message: "Expect expression.".to_string(),
        };
        assert_eq!(error.to_string(), "[line 3] Error at ';': Expect expression.");
    }

    #[test]
    fn test_compile_errors_one_per_line() {
        let errors = CompileErrors(vec![
            CompileError {
                line: 1,
                location: String::new(),
                message: "a".into(),
            },
            CompileError {
                line: 2,
                location: " at end".into(),
                message: "b".into(),
            },
        ]);
        assert_eq!(errors.to_string(), "[line 1] Error: a\n[line 2] Error at end: b");
    }
}
