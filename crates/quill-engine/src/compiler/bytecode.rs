// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.
//!
//! Code is a flat array of cells, each carrying one opcode or operand byte,
//! the source line it came from and whether it starts an instruction.
//! Multi-byte operands are big-endian `u16`s spread over consecutive cells.

use quill_macros::opcodes;

use crate::runtime::value::Value;

opcodes! {
    /// Bytecode operation codes. The number after `=>` is the operand length in bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum OpCode {
        /// Push constant `[u16]`
        Constant = 0 => 2,
        Null = 1 => 0,
        True = 2 => 0,
        False = 3 => 0,
        /// Push the empty sentinel
        Empty = 4 => 0,
        Pop = 5 => 0,
        Dup = 6 => 0,
        /// Duplicate the top two values, keeping their order
        DupTwo = 7 => 0,

        // Variables
        GetLocal = 8 => 2,
        SetLocal = 9 => 2,
        GetUpvalue = 10 => 2,
        SetUpvalue = 11 => 2,
        /// Close the upvalue aliasing the top slot, then pop it
        CloseUpvalue = 12 => 0,
        /// Read a module binding or built-in `[name u16]`
        GetGlobal = 13 => 2,
        SetGlobal = 14 => 2,
        DefineGlobal = 15 => 2,

        // Properties
        GetProperty = 16 => 2,
        SetProperty = 17 => 2,
        /// Property access through `this`; private names allowed
        GetSelfProperty = 18 => 2,
        SetSelfProperty = 19 => 2,
        /// Bind a superclass method `[name u16]`; pops the superclass
        GetSuper = 20 => 2,
        GetIndex = 21 => 0,
        SetIndex = 22 => 0,
        /// `target[lower:upper]`, either bound may be empty
        GetRangedIndex = 23 => 0,

        // Operators
        Equal = 24 => 0,
        NotEqual = 25 => 0,
        Greater = 26 => 0,
        GreaterEqual = 27 => 0,
        Less = 28 => 0,
        LessEqual = 29 => 0,
        Add = 30 => 0,
        Subtract = 31 => 0,
        Multiply = 32 => 0,
        Divide = 33 => 0,
        Modulo = 34 => 0,
        Power = 35 => 0,
        Negate = 36 => 0,
        Not = 37 => 0,
        BitAnd = 38 => 0,
        BitOr = 39 => 0,
        BitXor = 40 => 0,
        BitNot = 41 => 0,
        ShiftLeft = 42 => 0,
        ShiftRight = 43 => 0,
        InstanceOf = 44 => 0,
        /// Convert the top value to a string (interpolation)
        Stringify = 45 => 0,

        // Control flow
        /// Forward jump `[offset u16]`
        Jump = 46 => 2,
        /// Forward jump if the top value is falsey; does not pop
        JumpIfFalse = 47 => 2,
        /// Forward jump if the top value is the empty sentinel; does not pop
        JumpIfEmpty = 48 => 2,
        /// Backward jump `[offset u16]`
        Loop = 49 => 2,
        /// `break` awaiting its target; rewritten to `Jump` when the loop closes
        BreakPlaceholder = 50 => 2,
        /// Skip a default-value prologue if the argument was supplied `[slot u16, offset u16]`
        ArgDefault = 51 => 4,

        // Calls
        Call = 52 => 1,
        /// Call a method by name `[name u16, argc u8]`
        Invoke = 53 => 3,
        InvokeSelf = 54 => 3,
        /// Call a superclass method `[name u16, argc u8]`; pops the superclass
        SuperInvoke = 55 => 3,
        /// Wrap function constant `[u16]` into a closure
        Closure = 56 => 2,
        Return = 57 => 0,

        // Classes
        Class = 58 => 2,
        /// Stack: superclass, class. Pops the class.
        Inherit = 59 => 0,
        Method = 60 => 2,
        StaticMethod = 61 => 2,
        /// Add a per-instance field default `[name u16]`
        Field = 62 => 2,
        StaticField = 63 => 2,
        Getter = 64 => 2,
        Setter = 65 => 2,

        // Literals
        /// Build an array from `[count u16]` values
        Array = 66 => 2,
        /// Build a dict from `[count u16]` key/value pairs
        Dict = 67 => 2,
        Range = 68 => 0,

        // Iteration: stack holds iterable, cursor
        /// Advance the cursor; pushes the next cursor or empty
        IterNext = 69 => 0,
        IterKey = 70 => 0,
        IterValue = 71 => 0,

        // Exceptions
        /// Enter a try region `[class name u16, catch u16, finally u16]`
        Try = 72 => 6,
        /// Normal completion of a try or catch body
        EndTry = 73 => 0,
        /// Discard the innermost handler (jumping out of the region)
        PopTry = 74 => 0,
        /// End of a finally block; rethrows a pending exception
        EndFinally = 75 => 0,
        Throw = 76 => 0,
        /// Stack: condition, message
        Assert = 77 => 0,

        // Statements
        Echo = 78 => 0,
        /// Load a module `[path u16]`
        Import = 79 => 2,
    }
}

/// Operand placeholder for jumps that are patched later.
pub const UNPATCHED: u16 = 0xffff;

/// Class-name operand of a wildcard `catch`.
pub const ANY_EXCEPTION: u16 = 0xffff;

/// One byte of the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeUnit {
    pub byte: u8,
    pub line: u32,
    pub is_op: bool,
}

/// A compiled instruction stream plus its constant pool.
#[derive(Debug, Clone, Default)]
pub struct Blob {
    pub code: Vec<CodeUnit>,
    /// The constant pool
    pub constants: Vec<Value>,
}

impl Blob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Appends an opcode and returns its offset.
    pub fn write_op(&mut self, op: OpCode, line: u32) -> usize {
        self.code.push(CodeUnit {
            byte: op as u8,
            line,
            is_op: true,
        });
        self.code.len() - 1
    }

    pub fn write_byte(&mut self, byte: u8, line: u32) {
        self.code.push(CodeUnit {
            byte,
            line,
            is_op: false,
        });
    }

    pub fn write_u16(&mut self, value: u16, line: u32) {
        let [hi, lo] = value.to_be_bytes();
        self.write_byte(hi, line);
        self.write_byte(lo, line);
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset].byte, self.code[offset + 1].byte])
    }

    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.code[offset].byte = hi;
        self.code[offset + 1].byte = lo;
    }

    /// Opcode at `offset`, if that cell starts an instruction.
    pub fn op_at(&self, offset: usize) -> Option<OpCode> {
        let unit = self.code.get(offset)?;
        if !unit.is_op {
            return None;
        }
        OpCode::try_from(unit.byte).ok()
    }

    pub fn line_at(&self, offset: usize) -> u32 {
        self.code.get(offset).map_or(0, |unit| unit.line)
    }

    /// Adds a constant and returns its index, reusing an identical entry.
    pub fn add_constant(&mut self, value: Value) -> usize {
        if let Value::Obj(_) = value {
            if let Some(index) = self.constants.iter().position(|c| c.same_key(&value)) {
                return index;
            }
        }
        self.constants.push(value);
        self.constants.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_encoding_is_big_endian() {
        let mut blob = Blob::new();
        blob.write_op(OpCode::Constant, 1);
        blob.write_u16(0x1234, 1);
        assert_eq!(blob.code[1].byte, 0x12);
        assert_eq!(blob.code[2].byte, 0x34);
        assert_eq!(blob.read_u16(1), 0x1234);
        assert!(blob.code[0].is_op);
        assert!(!blob.code[1].is_op);
    }

    #[test]
    fn test_patch() {
        let mut blob = Blob::new();
        blob.write_op(OpCode::Jump, 3);
        blob.write_u16(UNPATCHED, 3);
        blob.patch_u16(1, 7);
        assert_eq!(blob.read_u16(1), 7);
        assert_eq!(blob.line_at(2), 3);
        assert_eq!(blob.op_at(0), Some(OpCode::Jump));
        assert_eq!(blob.op_at(1), None);
    }

    #[test]
    fn test_operand_lengths() {
        assert_eq!(OpCode::Try.operand_len(), 6);
        assert_eq!(OpCode::Invoke.operand_len(), 3);
        assert_eq!(OpCode::Call.operand_len(), 1);
        assert_eq!(OpCode::Return.operand_len(), 0);
        for (i, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i, "opcodes are dense");
        }
    }

    #[test]
    fn test_number_constants_are_not_merged() {
        let mut blob = Blob::new();
        assert_eq!(blob.add_constant(Value::Number(1.0)), 0);
        assert_eq!(blob.add_constant(Value::Number(1.0)), 1);
    }
}
