//! IR instructions.
//!
//! An instruction is an opcode plus a flat operand list of values. Operand
//! layout conventions for the irregular opcodes:
//!
//! - `Jump`: `[target]` or `[then, else, cond]`.
//! - `Switch`: `[cond, default, case0_const, case0_block, case1_const, ...]`.
//! - `Phi`: interleaved `[value0, block0, value1, block1, ...]`.
//! - `Call`: `[callee, arg0, arg1, ...]`.
//! - `GetElementPtr`: `[ptr, index0, index1, ...]`.

use crate::ir::entities::{Block, Value};
use crate::ir::types::Type;
use cranelift_entity::packed_option::PackedOption;
use smallvec::SmallVec;

/// The opcode of an IR instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    /// Return, with an optional value operand.
    Ret,
    /// Reserve a stack slot; the result is a pointer to it.
    Allocate,
    /// Load through a pointer operand.
    Load,
    /// Store a value through a pointer; `[ptr, value]`.
    Store,
    /// Integer or float addition.
    Add,
    /// Integer or float subtraction.
    Sub,
    /// Integer equality.
    ICmpEq,
    /// Integer inequality.
    ICmpNe,
    /// Signed greater-than.
    ICmpGt,
    /// Signed greater-or-equal.
    ICmpGe,
    /// Signed less-than.
    ICmpLt,
    /// Signed less-or-equal.
    ICmpLe,
    /// Unsigned greater-than.
    UCmpGt,
    /// Unsigned greater-or-equal.
    UCmpGe,
    /// Unsigned less-than.
    UCmpLt,
    /// Unsigned less-or-equal.
    UCmpLe,
    /// Float equality.
    FCmpEq,
    /// Float inequality.
    FCmpNe,
    /// Float greater-than.
    FCmpGt,
    /// Float greater-or-equal.
    FCmpGe,
    /// Float less-than.
    FCmpLt,
    /// Float less-or-equal.
    FCmpLe,
    /// Unconditional or conditional branch.
    Jump,
    /// SSA φ-node.
    Phi,
    /// Address arithmetic over an aggregate pointer.
    GetElementPtr,
    /// Function call.
    Call,
    /// Zero extension.
    Zext,
    /// Sign extension.
    Sext,
    /// Integer truncation.
    Trunc,
    /// Float truncation (f64 → f32).
    Fptrunc,
    /// Float extension (f32 → f64).
    Fpext,
    /// Float to signed integer.
    Fptosi,
    /// Float to unsigned integer.
    Fptoui,
    /// Signed integer to float.
    Sitofp,
    /// Unsigned integer to float.
    Uitofp,
    /// Reinterpret bits at the same width.
    Bitcast,
    /// Pointer to integer.
    Ptrtoint,
    /// Integer to pointer.
    Inttoptr,
    /// Logical shift left.
    Shl,
    /// Logical shift right.
    LShr,
    /// Arithmetic shift right.
    AShr,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Signed division.
    IDiv,
    /// Unsigned division.
    UDiv,
    /// Float division.
    FDiv,
    /// Signed remainder.
    IRem,
    /// Unsigned remainder.
    URem,
    /// Signed multiplication.
    IMul,
    /// Unsigned multiplication.
    UMul,
    /// Float multiplication.
    FMul,
    /// Multi-way branch over an integer.
    Switch,
    /// Project one field out of a struct-typed value.
    ExtractValue,
}

impl Opcode {
    /// Is this one of the comparison opcodes?
    pub fn is_cmp(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            ICmpEq
                | ICmpNe
                | ICmpGt
                | ICmpGe
                | ICmpLt
                | ICmpLe
                | UCmpGt
                | UCmpGe
                | UCmpLt
                | UCmpLe
                | FCmpEq
                | FCmpNe
                | FCmpGt
                | FCmpGe
                | FCmpLt
                | FCmpLe
        )
    }

    /// Is this one of the cast opcodes?
    pub fn is_cast(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Zext | Sext
                | Trunc
                | Fptrunc
                | Fpext
                | Fptosi
                | Fptoui
                | Sitofp
                | Uitofp
                | Bitcast
                | Ptrtoint
                | Inttoptr
        )
    }

    /// Does this opcode end a block?
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Jump | Opcode::Switch)
    }

    /// Does this opcode have a side effect that pins it to program order?
    pub fn has_side_effect(self) -> bool {
        matches!(
            self,
            Opcode::Load
                | Opcode::Store
                | Opcode::Call
                | Opcode::Switch
                | Opcode::Phi
                | Opcode::Ret
                | Opcode::Jump
        )
    }

    /// The textual name of the opcode.
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Ret => "ret",
            Allocate => "alloca",
            Load => "load",
            Store => "store",
            Add => "add",
            Sub => "sub",
            ICmpEq => "icmp.eq",
            ICmpNe => "icmp.ne",
            ICmpGt => "icmp.sgt",
            ICmpGe => "icmp.sge",
            ICmpLt => "icmp.slt",
            ICmpLe => "icmp.sle",
            UCmpGt => "icmp.ugt",
            UCmpGe => "icmp.uge",
            UCmpLt => "icmp.ult",
            UCmpLe => "icmp.ule",
            FCmpEq => "fcmp.eq",
            FCmpNe => "fcmp.ne",
            FCmpGt => "fcmp.gt",
            FCmpGe => "fcmp.ge",
            FCmpLt => "fcmp.lt",
            FCmpLe => "fcmp.le",
            Jump => "br",
            Phi => "phi",
            GetElementPtr => "getelementptr",
            Call => "call",
            Zext => "zext",
            Sext => "sext",
            Trunc => "trunc",
            Fptrunc => "fptrunc",
            Fpext => "fpext",
            Fptosi => "fptosi",
            Fptoui => "fptoui",
            Sitofp => "sitofp",
            Uitofp => "uitofp",
            Bitcast => "bitcast",
            Ptrtoint => "ptrtoint",
            Inttoptr => "inttoptr",
            Shl => "shl",
            LShr => "lshr",
            AShr => "ashr",
            And => "and",
            Or => "or",
            Xor => "xor",
            IDiv => "sdiv",
            UDiv => "udiv",
            FDiv => "fdiv",
            IRem => "srem",
            URem => "urem",
            IMul => "smul",
            UMul => "umul",
            FMul => "fmul",
            Switch => "switch",
            ExtractValue => "extractvalue",
        }
    }
}

/// An instruction: opcode, operands, parent block and result value.
#[derive(Clone, Debug)]
pub struct InstData {
    /// The opcode.
    pub opcode: Opcode,
    /// Result type; void for instructions that produce no value.
    pub ty: Type,
    /// Operand values, multi-edge.
    pub operands: SmallVec<[Value; 4]>,
    /// The block containing this instruction, once inserted.
    pub block: PackedOption<Block>,
    /// The value representing this instruction's result, if it produces one.
    pub result: PackedOption<Value>,
}

impl InstData {
    /// Create a detached instruction with no operands.
    pub fn new(opcode: Opcode, ty: Type) -> Self {
        Self {
            opcode,
            ty,
            operands: SmallVec::new(),
            block: None.into(),
            result: None.into(),
        }
    }

    /// The incoming `(value, block)` pairs of a `Phi`.
    pub fn phi_incomings(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        debug_assert_eq!(self.opcode, Opcode::Phi);
        self.operands
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
    }

    /// The `(case_const, case_block)` pairs of a `Switch`.
    pub fn switch_cases(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        debug_assert_eq!(self.opcode, Opcode::Switch);
        self.operands[2..]
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
    }

    /// The callee of a `Call`.
    pub fn callee(&self) -> Value {
        debug_assert_eq!(self.opcode, Opcode::Call);
        self.operands[0]
    }

    /// The argument operands of a `Call`.
    pub fn call_args(&self) -> &[Value] {
        debug_assert_eq!(self.opcode, Opcode::Call);
        &self.operands[1..]
    }
}
