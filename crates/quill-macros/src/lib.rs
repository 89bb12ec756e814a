// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Declarative macros for the Quill scripting engine.
//!
//! # Macros Overview
//!
//! ## Bytecode
//! - [`opcodes!`] - Declare the instruction set together with its operand-length table
//!
//! ## Native functions
//! - [`bail!`] - Raise a script exception from a native function
//! - [`ensure!`] - Raise a script exception unless a condition holds
//! - [`arity!`] - Check the argument count of a native call
//!
//! The native-function macros only rely on method names, so they work with any
//! receiver that exposes `error(String)` and `arity_error(&str, usize, usize, usize)`.

mod native;
mod opcodes;
