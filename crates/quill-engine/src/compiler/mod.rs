// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode compiler.
//!
//! Turns source text directly into bytecode for the VM.
//!
//! # Module Structure
//!
//! - `bytecode`: instruction set and code blobs
//! - `codegen`: the single-pass compiler
//! - `disasm`: human-readable listings

pub mod bytecode;
mod codegen;
pub mod disasm;

pub use bytecode::{ANY_EXCEPTION, Blob, CodeUnit, OpCode, UNPATCHED};
pub use disasm::disassemble;

use crate::error::CompileErrors;
use crate::gc::{Heap, ObjRef};

/// Compile `source` into a script function whose globals live in `module`.
///
/// Collection is paused while compiling: the objects the compiler creates are
/// not reachable from any root until the script function is returned.
pub fn compile(heap: &mut Heap, source: &str, module: ObjRef) -> Result<ObjRef, CompileErrors> {
    heap.pause();
    let result = codegen::Compiler::new(heap, source, module).compile();
    heap.resume();
    result
}
