// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode listings.

use std::fmt::Write;

use super::bytecode::{ANY_EXCEPTION, Blob, OpCode, UNPATCHED};
use crate::gc::{Heap, ObjRef};
use crate::runtime::format::{format_number, quote};
use crate::runtime::{Obj, Value};

/// List `function` and every function nested in its constants.
pub fn disassemble(heap: &Heap, function: ObjRef) -> String {
    let mut out = String::new();
    let mut pending = vec![function];
    while let Some(r) = pending.pop() {
        let Some(function) = heap.as_function(r) else {
            continue;
        };
        let name = function.name.map_or("<script>", |n| heap.str(n));
        let _ = writeln!(out, "== {name} ==");
        disassemble_blob(heap, &function.blob, &mut out);
        out.push('\n');

        // Nested functions are listed after their parent, in source order.
        let nested: Vec<ObjRef> = function
            .blob
            .constants
            .iter()
            .filter_map(|c| c.as_obj())
            .filter(|c| heap.as_function(*c).is_some())
            .collect();
        pending.extend(nested.into_iter().rev());
    }
    out
}

fn disassemble_blob(heap: &Heap, blob: &Blob, out: &mut String) {
    let mut offset = 0;
    let mut last_line = None;
    while offset < blob.len() {
        offset = instruction(heap, blob, offset, &mut last_line, out);
    }
}

/// Render one instruction and return the offset of the next.
fn instruction(
    heap: &Heap,
    blob: &Blob,
    offset: usize,
    last_line: &mut Option<u32>,
    out: &mut String,
) -> usize {
    let line = blob.line_at(offset);
    let _ = write!(out, "{offset:04} ");
    if *last_line == Some(line) {
        out.push_str("   | ");
    } else {
        let _ = write!(out, "{line:4} ");
        *last_line = Some(line);
    }

    let Some(op) = blob.op_at(offset) else {
        let _ = writeln!(out, "<bad byte {}>", blob.code[offset].byte);
        return offset + 1;
    };
    let _ = write!(out, "{:<18}", op.mnemonic());
    let next = offset + 1 + op.operand_len();
    let arg = |i: usize| blob.read_u16(offset + 1 + i);

    match op {
        OpCode::Constant
        | OpCode::Closure
        | OpCode::GetGlobal
        | OpCode::SetGlobal
        | OpCode::DefineGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSelfProperty
        | OpCode::SetSelfProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method
        | OpCode::StaticMethod
        | OpCode::Field
        | OpCode::StaticField
        | OpCode::Getter
        | OpCode::Setter
        | OpCode::Import => {
            let index = arg(0);
            let _ = write!(out, "{index:5} {}", constant(heap, blob, index));
        }
        OpCode::Invoke | OpCode::InvokeSelf | OpCode::SuperInvoke => {
            let index = arg(0);
            let argc = blob.code[offset + 3].byte;
            let _ = write!(out, "{index:5} {} ({argc} args)", constant(heap, blob, index));
        }
        OpCode::Call => {
            let _ = write!(out, "{:5}", blob.code[offset + 1].byte);
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfEmpty | OpCode::BreakPlaceholder => {
            let _ = write!(out, "{:5} -> {}", arg(0), next + arg(0) as usize);
        }
        OpCode::Loop => {
            let _ = write!(out, "{:5} -> {}", arg(0), next.saturating_sub(arg(0) as usize));
        }
        OpCode::ArgDefault => {
            let _ = write!(out, "{:5} -> {}", arg(0), next + arg(2) as usize);
        }
        OpCode::Try => {
            let class = match arg(0) {
                ANY_EXCEPTION => "*".to_string(),
                index => constant(heap, blob, index),
            };
            let address = |a: u16| match a {
                UNPATCHED => "-".to_string(),
                a => a.to_string(),
            };
            let _ = write!(
                out,
                "{class} catch {} finally {}",
                address(arg(2)),
                address(arg(4))
            );
        }
        _ if op.operand_len() == 2 => {
            let _ = write!(out, "{:5}", arg(0));
        }
        _ => {}
    }
    out.push('\n');
    next
}

fn constant(heap: &Heap, blob: &Blob, index: u16) -> String {
    match blob.constants.get(index as usize) {
        Some(value) => constant_text(heap, *value),
        None => "<bad constant>".to_string(),
    }
}

fn constant_text(heap: &Heap, value: Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Empty => "<empty>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::Obj(r) => match heap.get(r) {
            Obj::String(s) => quote(s.as_str()),
            Obj::Function(f) => match f.name {
                Some(name) => format!("<function {}>", heap.str(name)),
                None => "<function>".to_string(),
            },
            other => format!("<{}>", other.type_name()),
        },
    }
}
