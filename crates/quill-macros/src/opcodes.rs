// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Instruction-set declaration.

/// Declare a byte-sized opcode enum with a fixed operand length per variant.
///
/// Generates the enum, `TryFrom<u8>`, `operand_len()` and `mnemonic()`. The
/// length table is the single source of truth for every pass that has to step
/// over encoded instructions.
///
/// # Example
///
/// ```
/// use quill_macros::opcodes;
///
/// opcodes! {
///     #[derive(Debug, Clone, Copy, PartialEq, Eq)]
///     pub enum Op {
///         Nop = 0 => 0,
///         Push = 1 => 2,
///     }
/// }
///
/// assert_eq!(Op::try_from(1), Ok(Op::Push));
/// assert_eq!(Op::Push.operand_len(), 2);
/// assert_eq!(Op::Nop.mnemonic(), "Nop");
/// assert!(Op::try_from(9).is_err());
/// ```
#[macro_export]
macro_rules! opcodes {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal => $len:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value
            ),+
        }

        impl $name {
            /// Every opcode, in encoding order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Number of operand bytes that follow this opcode.
            pub const fn operand_len(self) -> usize {
                match self {
                    $($name::$variant => $len,)+
                }
            }

            /// Name used by the disassembler.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, u8> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(other),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    opcodes! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum TestOp {
            /// No operands.
            Halt = 0 => 0,
            Load = 1 => 2,
            Branch = 7 => 6,
        }
    }

    #[test]
    fn test_round_trip_bytes() {
        for op in TestOp::ALL {
            assert_eq!(TestOp::try_from(*op as u8), Ok(*op));
        }
        assert_eq!(TestOp::try_from(2), Err(2));
    }

    #[test]
    fn test_operand_table() {
        assert_eq!(TestOp::Halt.operand_len(), 0);
        assert_eq!(TestOp::Load.operand_len(), 2);
        assert_eq!(TestOp::Branch.operand_len(), 6);
        assert_eq!(TestOp::Branch.mnemonic(), "Branch");
    }
}
