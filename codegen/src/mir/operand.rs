//! Machine IR operands.
//!
//! Operands are small `Copy` values; anything variable-sized (multi-value
//! result lists, external symbol names) lives in a side table on the machine
//! function or unit and is referenced by index.

use crate::entity::entity_impl;
use crate::ir;
use crate::ir::entities::ExtSym;

/// A machine register, physical or virtual.
///
/// A single `u32` id space covers both: ids below [`VREG_START`] name
/// physical registers of the current target, ids at or above it are virtual
/// registers waiting for allocation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Reg(pub u32);

/// First virtual register id.
pub const VREG_START: u32 = 1024;

impl Reg {
    /// Is this a virtual register?
    pub fn is_virtual(self) -> bool {
        self.0 >= VREG_START
    }

    /// Is this a physical register?
    pub fn is_physical(self) -> bool {
        self.0 < VREG_START
    }

    /// The index of a virtual register into per-function tables.
    pub fn virtual_index(self) -> usize {
        debug_assert!(self.is_virtual());
        (self.0 - VREG_START) as usize
    }
}

/// Operand flag bits.
///
/// The force-width flags request rewriting a register operand to the
/// correctly-sized alias of its physical register during target lowering.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct RegFlags(u8);

impl RegFlags {
    /// No flags set.
    pub const EMPTY: Self = Self(0);
    /// Rewrite to the 64-bit alias.
    pub const FORCE64: Self = Self(1 << 0);
    /// Rewrite to the 32-bit alias.
    pub const FORCE32: Self = Self(1 << 1);
    /// Rewrite to the 16-bit alias.
    pub const FORCE16: Self = Self(1 << 2);
    /// Rewrite to the 8-bit alias.
    pub const FORCE8: Self = Self(1 << 3);

    /// No flags.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Is `flag` set?
    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }

    /// The forced width in bytes, if any force flag is set.
    pub fn forced_size(self) -> Option<u64> {
        if self.contains(Self::FORCE64) {
            Some(8)
        } else if self.contains(Self::FORCE32) {
            Some(4)
        } else if self.contains(Self::FORCE16) {
            Some(2)
        } else if self.contains(Self::FORCE8) {
            Some(1)
        } else {
            None
        }
    }

    /// The force flag requesting `size` bytes.
    pub fn for_size(size: u64) -> Self {
        match size {
            1 => Self::FORCE8,
            2 => Self::FORCE16,
            4 => Self::FORCE32,
            _ => Self::FORCE64,
        }
    }
}

/// Width of an integer immediate.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum ImmSize {
    /// 1 byte.
    S1 = 1,
    /// 2 bytes.
    S2 = 2,
    /// 4 bytes.
    S4 = 4,
    /// 8 bytes.
    S8 = 8,
}

impl ImmSize {
    /// The width in bytes.
    pub fn bytes(self) -> u64 {
        self as u64
    }

    /// The immediate size holding a value of `bytes` bytes.
    pub fn from_bytes(bytes: u64) -> Self {
        match bytes {
            0 | 1 => ImmSize::S1,
            2 => ImmSize::S2,
            4 => ImmSize::S4,
            8 => ImmSize::S8,
            n => panic!("no immediate size for {n} bytes"),
        }
    }

    /// The smallest immediate size whose signed range contains `value`.
    pub fn for_value(value: i64) -> Self {
        if i8::try_from(value).is_ok() {
            ImmSize::S1
        } else if i16::try_from(value).is_ok() {
            ImmSize::S2
        } else if i32::try_from(value).is_ok() {
            ImmSize::S4
        } else {
            ImmSize::S8
        }
    }
}

/// An index into a machine function's stack frame.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// An index into a machine function's constant pool.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolConst(u32);
entity_impl!(PoolConst, "const");

/// An index into a machine function's multi-value table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MultiValue(u32);
entity_impl!(MultiValue, "mv");

/// A reference to a machine basic block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MirBlock(u32);
entity_impl!(MirBlock, "mb");

/// A machine instruction operand.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Operand {
    /// A register, with rewrite flags.
    Reg(Reg, RegFlags),
    /// An integer immediate of a given width.
    Imm(i64, ImmSize),
    /// A symbolic stack slot, resolved to `[fp ± offset]` during lowering.
    Frame(StackSlot),
    /// An entry of the function's constant pool.
    Constant(PoolConst),
    /// The address of a global variable or function of the unit.
    Global(ir::Value),
    /// A machine basic block, used as a branch target.
    Block(MirBlock),
    /// An external symbol registered on the unit.
    Sym(ExtSym),
    /// A multi-value result list; only legal during instruction selection.
    Multi(MultiValue),
}

impl Operand {
    /// Construct a flag-free register operand.
    pub fn reg(reg: Reg) -> Self {
        Operand::Reg(reg, RegFlags::empty())
    }

    /// The register, if this is a register operand.
    pub fn as_reg(self) -> Option<Reg> {
        match self {
            Operand::Reg(reg, _) => Some(reg),
            _ => None,
        }
    }

    /// Is this a register operand?
    pub fn is_reg(self) -> bool {
        matches!(self, Operand::Reg(..))
    }

    /// Is this an immediate operand?
    pub fn is_imm(self) -> bool {
        matches!(self, Operand::Imm(..))
    }

    /// Structural equality that ignores register flags.
    pub fn equals_ignoring_flags(self, other: Self) -> bool {
        match (self, other) {
            (Operand::Reg(a, _), Operand::Reg(b, _)) => a == b,
            _ => self == other,
        }
    }

    /// This operand with `flags` added (registers only; other kinds pass
    /// through unchanged).
    pub fn with_flags(self, flags: RegFlags) -> Self {
        match self {
            Operand::Reg(reg, old) => Operand::Reg(reg, RegFlags(old.0 | flags.0)),
            other => other,
        }
    }
}
