//! Static machine-instruction descriptions and insertion helpers.

use crate::isel::dag::NodeKind;
use crate::isel::pattern::Pattern;
use crate::mir::{self, pseudo, ImmSize, MirBlock, Operand, Reg, StackSlot};
use crate::result::CodegenResult;

/// Operand-kind restriction of one instruction operand.
#[derive(Copy, Clone, Debug)]
pub struct Restriction {
    mask: u32,
    written: bool,
    read: bool,
}

const KIND_REG: u32 = 1 << 0;
const KIND_IMM: u32 = 1 << 1;
const KIND_FRAME: u32 = 1 << 2;
const KIND_SYM: u32 = 1 << 3;

impl Restriction {
    /// A register operand that is only read.
    pub const fn reg_use() -> Self {
        Self {
            mask: KIND_REG,
            written: false,
            read: true,
        }
    }

    /// A register operand that is a pure definition.
    pub const fn reg_def() -> Self {
        Self {
            mask: KIND_REG,
            written: true,
            read: false,
        }
    }

    /// A register operand that is read and written (two-address style).
    pub const fn reg_rw() -> Self {
        Self {
            mask: KIND_REG,
            written: true,
            read: true,
        }
    }

    /// An immediate operand.
    pub const fn imm() -> Self {
        Self {
            mask: KIND_IMM,
            written: false,
            read: true,
        }
    }

    /// A block, global, external-symbol or constant-pool operand.
    pub const fn sym() -> Self {
        Self {
            mask: KIND_SYM,
            written: false,
            read: true,
        }
    }

    /// Any operand kind, read.
    pub const fn any() -> Self {
        Self {
            mask: KIND_REG | KIND_FRAME | KIND_IMM | KIND_SYM,
            written: false,
            read: true,
        }
    }

    /// Does `op` satisfy the restriction?
    pub fn allows(&self, op: Operand) -> bool {
        let bit = match op {
            Operand::Reg(..) => KIND_REG,
            Operand::Imm(..) => KIND_IMM,
            Operand::Frame(..) => KIND_FRAME,
            _ => KIND_SYM,
        };
        self.mask & bit != 0
    }

    /// Is the operand written?
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Is the operand read?
    pub fn is_read(&self) -> bool {
        self.read
    }

    /// Is this operand written without being read (a pure definition)?
    pub fn is_assigned(&self) -> bool {
        self.written && !self.read
    }
}

/// Static description of one machine opcode.
pub struct InstDesc {
    /// Mnemonic.
    pub name: &'static str,
    /// Number of leading operands that are definitions.
    pub num_defs: usize,
    /// Per-operand restrictions, in operand order.
    pub restrictions: &'static [Restriction],
    /// Physical registers the instruction clobbers implicitly.
    pub clobbers: &'static [Reg],
    /// Returns from the function.
    pub is_return: bool,
    /// Transfers control to a block operand (conditionally or not).
    pub is_jump: bool,
    /// Calls another function.
    pub is_call: bool,
}

impl InstDesc {
    /// A descriptor with no operands and no special properties.
    pub const fn simple(name: &'static str) -> Self {
        Self {
            name,
            num_defs: 0,
            restrictions: &[],
            clobbers: &[],
            is_return: false,
            is_jump: false,
            is_call: false,
        }
    }

    /// The restriction of operand `idx`; unconstrained when the descriptor
    /// lists fewer operands.
    pub fn restriction(&self, idx: usize) -> Restriction {
        self.restrictions
            .get(idx)
            .copied()
            .unwrap_or_else(Restriction::any)
    }
}

static CALL_LOWER_DESC: InstDesc = InstDesc::simple("call.lower");
static SWITCH_LOWER_DESC: InstDesc = InstDesc::simple("switch.lower");
static RETURN_LOWER_DESC: InstDesc = InstDesc {
    name: "return.lower",
    num_defs: 0,
    restrictions: &[],
    clobbers: &[],
    is_return: true,
    is_jump: false,
    is_call: false,
};
static VA_START_LOWER_DESC: InstDesc = InstDesc::simple("va_start.lower");
static VA_END_LOWER_DESC: InstDesc = InstDesc::simple("va_end.lower");

/// Target machine-instruction queries and insertion helpers.
///
/// The insertion helpers append or insert real target instructions and
/// return how many instructions they added, so callers can keep insertion
/// cursors accurate.
pub trait InstructionInfo: Send + Sync {
    /// The descriptor of a target opcode.
    fn target_desc(&self, opcode: u32) -> &InstDesc;

    /// The selection patterns for `kind`.
    fn patterns(&self, kind: NodeKind) -> &[Pattern];

    /// The descriptor of any opcode, pseudo band included.
    fn desc(&self, opcode: u32) -> &InstDesc {
        match opcode {
            pseudo::CALL_LOWER => &CALL_LOWER_DESC,
            pseudo::SWITCH_LOWER => &SWITCH_LOWER_DESC,
            pseudo::RETURN_LOWER => &RETURN_LOWER_DESC,
            pseudo::VA_START_LOWER => &VA_START_LOWER_DESC,
            pseudo::VA_END_LOWER => &VA_END_LOWER_DESC,
            _ => self.target_desc(opcode),
        }
    }

    /// Does `opcode` end a block?
    fn is_terminator(&self, opcode: u32) -> bool {
        if matches!(opcode, pseudo::SWITCH_LOWER | pseudo::RETURN_LOWER) {
            return true;
        }
        let desc = self.desc(opcode);
        desc.is_return || desc.is_jump
    }

    /// Insert a move of `size` bytes from `src` to `dst` at `pos`.
    fn mov(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        src: Operand,
        dst: Operand,
        size: u64,
        float: bool,
    ) -> CodegenResult<usize>;

    /// Insert a store of register `reg` into `slot` at `pos`.
    fn reg_to_slot(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
        slot: StackSlot,
    ) -> CodegenResult<usize>;

    /// Insert a load of `slot` into register `reg` at `pos`.
    fn slot_to_reg(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
        slot: StackSlot,
    ) -> CodegenResult<usize>;

    /// Insert a store of an immediate into `slot` at `pos`.
    fn imm_to_slot(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        value: i64,
        size: ImmSize,
        slot: StackSlot,
    ) -> CodegenResult<usize>;

    /// Insert instructions materializing the address of `slot` into `dst`.
    fn slot_addr(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        slot: StackSlot,
        dst: Reg,
    ) -> CodegenResult<usize>;

    /// Insert a save of callee- or caller-saved `reg` at `pos` (push or
    /// store-pair style, per target).
    fn save_reg(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
    ) -> CodegenResult<usize>;

    /// Insert the matching restore of `reg` at `pos`.
    fn restore_reg(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
    ) -> CodegenResult<usize>;

    /// Is `opcode` a plain register-to-register move whose source and
    /// destination are its two operands?
    fn is_reg_move(&self, opcode: u32) -> bool;

    /// Keep the stack pointer aligned around an odd number of
    /// register-sized saves; returns the instructions inserted.
    ///
    /// Targets whose save style preserves alignment return 0.
    fn align_pad(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        restore: bool,
    ) -> CodegenResult<usize> {
        let _ = (func, block, pos, restore);
        Ok(0)
    }
}

/// Pick an opcode by operand size, with separate float forms.
///
/// `int_ops` is indexed by size 1/2/4/8; `float_ops` by 4/8.
pub fn select_opcode(
    size: u64,
    float: bool,
    int_ops: [u32; 4],
    float_ops: [u32; 2],
) -> CodegenResult<u32> {
    use crate::result::CodegenError;
    if float {
        return match size {
            4 => Ok(float_ops[0]),
            8 => Ok(float_ops[1]),
            _ => Err(CodegenError::BadOperand(format!(
                "no float operation of {size} bytes"
            ))),
        };
    }
    match size {
        1 => Ok(int_ops[0]),
        2 => Ok(int_ops[1]),
        4 => Ok(int_ops[2]),
        8 => Ok(int_ops[3]),
        _ => Err(CodegenError::BadOperand(format!(
            "no operation of {size} bytes"
        ))),
    }
}
