//! SSA values.

use crate::ir::entities::{Block, Func, Global, Inst, Value};
use crate::ir::types::Type;

/// Flag bits carried by a value.
///
/// `BYVAL` and `SRET` annotate pointer-typed function arguments; the
/// force-width flags request a specific sub-register alias when the value
/// ends up in a physical register.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct ValueFlags(u8);

impl ValueFlags {
    /// Pointer argument that is passed by value on the stack.
    pub const BYVAL: Self = Self(1 << 0);
    /// Pointer argument through which an aggregate is returned.
    pub const SRET: Self = Self(1 << 1);

    /// No flags set.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Is `flag` set in `self`?
    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }

    /// Set `flag`.
    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }
}

/// The discriminating payload of a value.
#[derive(Clone, Debug)]
pub enum ValueKind {
    /// An integer constant of the value's type.
    ConstInt(i64),
    /// A float constant, stored as its IEEE-754 bit pattern.
    ConstFloat(u64),
    /// A NUL-terminated string constant.
    ConstString(String),
    /// A struct constant; one operand per field.
    ConstStruct(Vec<Value>),
    /// An array constant; one operand per element.
    ConstArray(Vec<Value>),
    /// A constant address computation over a constant base.
    ConstGep {
        /// The constant being indexed.
        base: Value,
        /// Constant integer indices.
        indices: Vec<Value>,
    },
    /// An unspecified value of the value's type.
    Undef,
    /// The null value of the value's type.
    Null,
    /// A global variable address.
    GlobalVar(Global),
    /// A function address.
    Func(Func),
    /// A basic block used as a branch target operand.
    Block(Block),
    /// A formal argument of a function.
    Arg {
        /// The function this argument belongs to.
        func: Func,
        /// Zero-based position in the argument list.
        index: u32,
    },
    /// The result of an instruction.
    Inst(Inst),
}

/// A value: name, type, kind, uses and flags.
#[derive(Clone, Debug)]
pub struct ValueData {
    /// Possibly-empty symbolic name.
    pub name: String,
    /// The value's type.
    pub ty: Type,
    /// What the value is.
    pub kind: ValueKind,
    /// Instructions that reference this value, counted per edge: an
    /// instruction using the value twice appears twice.
    pub uses: Vec<Inst>,
    /// Flag bits.
    pub flags: ValueFlags,
}

impl ValueData {
    /// Create a value with no uses and no flags.
    pub fn new(name: impl Into<String>, ty: Type, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            ty,
            kind,
            uses: Vec::new(),
            flags: ValueFlags::empty(),
        }
    }

    /// Is this one of the constant kinds?
    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::ConstInt(_)
                | ValueKind::ConstFloat(_)
                | ValueKind::ConstString(_)
                | ValueKind::ConstStruct(_)
                | ValueKind::ConstArray(_)
                | ValueKind::ConstGep { .. }
                | ValueKind::Undef
                | ValueKind::Null
        )
    }

    /// The block payload, if this is a block value.
    pub fn as_block(&self) -> Option<Block> {
        match self.kind {
            ValueKind::Block(block) => Some(block),
            _ => None,
        }
    }

    /// The instruction payload, if this is an instruction result.
    pub fn as_inst(&self) -> Option<Inst> {
        match self.kind {
            ValueKind::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer constant.
    pub fn as_const_int(&self) -> Option<i64> {
        match self.kind {
            ValueKind::ConstInt(v) => Some(v),
            _ => None,
        }
    }
}
