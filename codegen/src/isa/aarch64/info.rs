//! AArch64 instruction tables and insertion helpers.

use crate::isa::aarch64::opcodes::{self, Opcode::*};
use crate::isa::aarch64::patterns;
use crate::isa::aarch64::regs::{self, class};
use crate::isa::instinfo::{InstDesc, InstructionInfo};
use crate::isa::reginfo::RegisterInfo;
use crate::isel::dag::NodeKind;
use crate::isel::pattern::{Pattern, PatternTable};
use crate::mir::{self, ImmSize, InstData, MirBlock, Operand, Reg, StackSlot};
use crate::result::{CodegenError, CodegenResult};
use std::sync::OnceLock;

/// The AArch64 instruction tables.
pub struct A64InstInfo {
    patterns: PatternTable,
}

/// The process-wide instruction-info instance.
pub fn instruction_info() -> &'static A64InstInfo {
    static INFO: OnceLock<A64InstInfo> = OnceLock::new();
    INFO.get_or_init(|| A64InstInfo {
        patterns: patterns::build(),
    })
}

fn reg_class_of(func: &mir::Function, reg: Reg) -> u32 {
    let reg_info: &'static dyn RegisterInfo = &regs::AAPCS64;
    reg_info.class_of(reg, func)
}

fn slot_disp(func: &mir::Function, slot: StackSlot) -> i64 {
    -func.frame.slot(slot).offset
}

fn imm(value: i64) -> Operand {
    Operand::Imm(value, ImmSize::S4)
}

fn fp() -> Operand {
    Operand::reg(regs::X29)
}

fn insert(func: &mut mir::Function, block: MirBlock, pos: usize, opcode: u32, ops: &[Operand]) {
    func.insert_inst(block, pos, InstData::new(opcode, ops.iter().copied()));
}

/// Fits the immediate form of `add`/`sub`/`cmp`?
pub fn fits_arith_imm(value: i64) -> bool {
    (0..=4095).contains(&value)
}

/// Fits the plain `mov` immediate synthesis?
pub fn fits_mov_imm(value: i64) -> bool {
    (-65536..=65535).contains(&value)
}

/// The sized load opcode for a register class.
pub fn load_for_class(class_id: u32) -> u32 {
    match class_id {
        class::GPR64 => Ldr64.u(),
        class::GPR32 => Ldr32.u(),
        class::FPR64 => LdrF64.u(),
        _ => LdrF32.u(),
    }
}

/// The sized store opcode for a register class.
pub fn store_for_class(class_id: u32) -> u32 {
    match class_id {
        class::GPR64 => Str64.u(),
        class::GPR32 => Str32.u(),
        class::FPR64 => StrF64.u(),
        _ => StrF32.u(),
    }
}

impl InstructionInfo for A64InstInfo {
    fn target_desc(&self, opcode: u32) -> &InstDesc {
        opcodes::desc(opcode)
    }

    fn patterns(&self, kind: NodeKind) -> &[Pattern] {
        self.patterns.get(kind)
    }

    fn mov(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        src: Operand,
        dst: Operand,
        size: u64,
        float: bool,
    ) -> CodegenResult<usize> {
        match (dst, src) {
            (Operand::Reg(..), Operand::Reg(..)) => {
                let opcode = match (float, size) {
                    (true, 4) => FMovRR32,
                    (true, _) => FMovRR64,
                    (false, 8) => MovRR64,
                    (false, _) => MovRR32,
                };
                insert(func, block, pos, opcode.u(), &[dst, src]);
                Ok(1)
            }
            (Operand::Reg(..), Operand::Imm(value, _)) => {
                if fits_mov_imm(value) {
                    let opcode = if size == 8 { Mov64i } else { Mov32i };
                    insert(func, block, pos, opcode.u(), &[dst, src]);
                } else {
                    let opcode = if size == 8 { LdrLit64 } else { LdrLit32 };
                    insert(func, block, pos, opcode.u(), &[dst, src]);
                }
                Ok(1)
            }
            (Operand::Reg(dst_reg, _), Operand::Frame(slot)) => {
                Ok(self.slot_addr(func, block, pos, slot, dst_reg)?)
            }
            (Operand::Reg(..), Operand::Global(_) | Operand::Sym(_)) => {
                insert(func, block, pos, Adrp.u(), &[dst, src]);
                insert(func, block, pos + 1, AddLo12.u(), &[dst, dst, src]);
                Ok(2)
            }
            (Operand::Frame(slot), Operand::Reg(reg, _)) => {
                let opcode = store_for_class(reg_class_of(func, reg));
                insert(
                    func,
                    block,
                    pos,
                    opcode,
                    &[fp(), imm(slot_disp(func, slot)), src],
                );
                Ok(1)
            }
            (Operand::Frame(slot), Operand::Imm(value, isize_)) => {
                Ok(self.imm_to_slot(func, block, pos, value, isize_, slot)?)
            }
            _ => Err(CodegenError::BadOperand(format!(
                "cannot move {src:?} into {dst:?}"
            ))),
        }
    }

    fn reg_to_slot(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
        slot: StackSlot,
    ) -> CodegenResult<usize> {
        let opcode = store_for_class(reg_class_of(func, reg));
        insert(
            func,
            block,
            pos,
            opcode,
            &[fp(), imm(slot_disp(func, slot)), Operand::reg(reg)],
        );
        Ok(1)
    }

    fn slot_to_reg(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
        slot: StackSlot,
    ) -> CodegenResult<usize> {
        let opcode = load_for_class(reg_class_of(func, reg));
        insert(
            func,
            block,
            pos,
            opcode,
            &[Operand::reg(reg), fp(), imm(slot_disp(func, slot))],
        );
        Ok(1)
    }

    fn imm_to_slot(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        value: i64,
        size: ImmSize,
        slot: StackSlot,
    ) -> CodegenResult<usize> {
        let scratch = Operand::reg(regs::SCRATCH);
        let mov = if fits_mov_imm(value) {
            Mov64i
        } else {
            LdrLit64
        };
        insert(func, block, pos, mov.u(), &[scratch, imm(value)]);
        let store = match size.bytes() {
            1 => Strb,
            2 => Strh,
            4 => Str32,
            _ => Str64,
        };
        let src = if size.bytes() == 8 {
            scratch
        } else {
            Operand::reg(regs::W16)
        };
        insert(
            func,
            block,
            pos + 1,
            store.u(),
            &[fp(), imm(slot_disp(func, slot)), src],
        );
        Ok(2)
    }

    fn slot_addr(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        slot: StackSlot,
        dst: Reg,
    ) -> CodegenResult<usize> {
        let offset = func.frame.slot(slot).offset;
        let (opcode, value) = if offset >= 0 {
            (Sub64ri, offset)
        } else {
            (Add64ri, -offset)
        };
        insert(
            func,
            block,
            pos,
            opcode.u(),
            &[Operand::reg(dst), fp(), imm(value)],
        );
        Ok(1)
    }

    fn save_reg(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
    ) -> CodegenResult<usize> {
        let class_id = reg_class_of(func, reg);
        let reg_info: &'static dyn RegisterInfo = &regs::AAPCS64;
        if reg_info.is_fp_class(class_id) {
            insert(
                func,
                block,
                pos,
                StrPreF64.u(),
                &[Operand::reg(reg), Operand::reg(regs::SP), imm(-16)],
            );
            return Ok(1);
        }
        insert(
            func,
            block,
            pos,
            StpPre64.u(),
            &[
                Operand::reg(reg),
                Operand::reg(regs::XZR),
                Operand::reg(regs::SP),
                imm(-16),
            ],
        );
        Ok(1)
    }

    fn restore_reg(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
    ) -> CodegenResult<usize> {
        let class_id = reg_class_of(func, reg);
        let reg_info: &'static dyn RegisterInfo = &regs::AAPCS64;
        if reg_info.is_fp_class(class_id) {
            insert(
                func,
                block,
                pos,
                LdrPostF64.u(),
                &[Operand::reg(reg), Operand::reg(regs::SP), imm(16)],
            );
            return Ok(1);
        }
        insert(
            func,
            block,
            pos,
            LdpPost64.u(),
            &[
                Operand::reg(reg),
                Operand::reg(regs::XZR),
                Operand::reg(regs::SP),
                imm(16),
            ],
        );
        Ok(1)
    }

    fn is_reg_move(&self, opcode: u32) -> bool {
        matches!(
            opcodes::Opcode::from_u32(opcode),
            Some(MovRR64 | MovRR32 | FMovRR64 | FMovRR32)
        )
    }
}
