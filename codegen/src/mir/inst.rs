//! Machine IR instructions.

use crate::entity::entity_impl;
use crate::mir::operand::Operand;
use smallvec::SmallVec;

/// An opaque reference to a machine instruction.
///
/// Machine instructions live in a per-function arena and are sequenced by
/// per-block order vectors, so inserting into a block does not invalidate
/// references held by live ranges or call-site records.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MirInst(u32);
entity_impl!(MirInst, "mi");

/// A machine instruction: a target opcode and its operands.
///
/// Opcodes are plain `u32`s; each target defines its own numbering, and the
/// reserved band at the top of the space holds the target-independent
/// pseudo-opcodes of [`pseudo`].
#[derive(Clone, Debug)]
pub struct InstData {
    /// Target opcode, or a [`pseudo`] opcode awaiting expansion.
    pub opcode: u32,
    /// Operand list; shapes are dictated by the opcode.
    pub operands: SmallVec<[Operand; 3]>,
}

impl InstData {
    /// Create an instruction with the given operands.
    pub fn new(opcode: u32, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self {
            opcode,
            operands: operands.into_iter().collect(),
        }
    }
}

/// Target-independent pseudo-opcodes.
///
/// Instruction selection emits these for the high-level actions the target
/// lowering pass expands into real machine instructions. They occupy the top
/// of the `u32` opcode space so they can never collide with target opcodes.
pub mod pseudo {
    /// A call with calling-convention lowering still pending. Operands:
    /// `[result (register or multi-value, absent for void), callee, args...]`;
    /// the parameter types ride in the function's call-lowering side table.
    pub const CALL_LOWER: u32 = u32::MAX;
    /// A switch awaiting expansion. Operands:
    /// `[cond, default, case0_imm, case0_block, ...]`.
    pub const SWITCH_LOWER: u32 = CALL_LOWER - 1;
    /// A return awaiting result placement. Operands: `[value?]`.
    pub const RETURN_LOWER: u32 = SWITCH_LOWER - 1;
    /// `va_start` awaiting expansion. Operands: `[va_list pointer]`.
    pub const VA_START_LOWER: u32 = RETURN_LOWER - 1;
    /// `va_end` awaiting expansion. Operands: `[va_list pointer]`.
    pub const VA_END_LOWER: u32 = VA_START_LOWER - 1;
    /// First opcode of the reserved pseudo band.
    pub const FIRST: u32 = VA_END_LOWER;

    /// Is `opcode` a pseudo-opcode?
    pub fn is_pseudo(opcode: u32) -> bool {
        opcode >= FIRST
    }
}
