//! x86-64 instruction tables and insertion helpers.

use crate::isa::instinfo::{InstDesc, InstructionInfo};
use crate::isa::reginfo::RegisterInfo;
use crate::isa::x64::opcodes::{self, Opcode::*};
use crate::isa::x64::patterns;
use crate::isa::x64::regs::{self, class};
use crate::isel::dag::NodeKind;
use crate::isel::pattern::{Pattern, PatternTable};
use crate::mir::{self, ImmSize, InstData, MirBlock, Operand, Reg, StackSlot};
use crate::result::{CodegenError, CodegenResult};
use std::sync::OnceLock;

/// The x86-64 instruction tables.
pub struct X64InstInfo {
    patterns: PatternTable,
}

/// The process-wide instruction-info instance.
pub fn instruction_info() -> &'static X64InstInfo {
    static INFO: OnceLock<X64InstInfo> = OnceLock::new();
    INFO.get_or_init(|| X64InstInfo {
        patterns: patterns::build(),
    })
}

fn reg_size_and_float(func: &mir::Function, reg: Reg) -> (u64, bool) {
    let reg_info: &'static dyn RegisterInfo = &regs::SYSV;
    let class = reg_info.class_of(reg, func);
    (reg_info.class(class).size, class == class::FPR)
}

fn slot_disp(func: &mir::Function, slot: StackSlot) -> i64 {
    -func.frame.slot(slot).offset
}

fn disp(value: i64) -> Operand {
    Operand::Imm(value, ImmSize::S4)
}

fn rbp() -> Operand {
    Operand::reg(regs::RBP)
}

fn insert(
    func: &mut mir::Function,
    block: MirBlock,
    pos: usize,
    opcode: u32,
    ops: &[Operand],
) {
    func.insert_inst(block, pos, InstData::new(opcode, ops.iter().copied()));
}

impl InstructionInfo for X64InstInfo {
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
        use crate::isa::select_opcode;
        match (dst, src) {
            (Operand::Reg(..), Operand::Reg(..)) => {
                let opcode = select_opcode(
                    size,
                    float,
                    [Mov8rr.u(), Mov16rr.u(), Mov32rr.u(), Mov64rr.u()],
                    [Movssrr.u(), Movsdrr.u()],
                )?;
                insert(func, block, pos, opcode, &[dst, src]);
                Ok(1)
            }
            (Operand::Reg(..), Operand::Imm(value, _)) => {
                if size == 8 && i32::try_from(value).is_err() {
                    insert(func, block, pos, Movabs64ri.u(), &[dst, src]);
                } else {
                    let opcode = select_opcode(
                        size,
                        false,
                        [Mov8ri.u(), Mov16ri.u(), Mov32ri.u(), Mov64ri.u()],
                        [0, 0],
                    )?;
                    insert(func, block, pos, opcode, &[dst, src]);
                }
                Ok(1)
            }
            (Operand::Reg(..), Operand::Frame(slot)) => {
                insert(
                    func,
                    block,
                    pos,
                    Lea64rm.u(),
                    &[dst, rbp(), disp(slot_disp(func, slot))],
                );
                Ok(1)
            }
            (Operand::Reg(..), Operand::Global(_) | Operand::Sym(_)) => {
                insert(
                    func,
                    block,
                    pos,
                    Lea64rm.u(),
                    &[dst, Operand::reg(regs::RIP), disp(0), src],
                );
                Ok(1)
            }
            (Operand::Frame(slot), Operand::Reg(reg, _)) => {
                let (_, src_float) = reg_size_and_float(func, reg);
                let opcode = select_opcode(
                    size,
                    src_float,
                    [Mov8mr.u(), Mov16mr.u(), Mov32mr.u(), Mov64mr.u()],
                    [Movssmr.u(), Movsdmr.u()],
                )?;
                insert(
                    func,
                    block,
                    pos,
                    opcode,
                    &[rbp(), disp(slot_disp(func, slot)), src],
                );
                Ok(1)
            }
            (Operand::Frame(slot), Operand::Imm(..)) => {
                let opcode = select_opcode(
                    size,
                    false,
                    [Mov8mi.u(), Mov16mi.u(), Mov32mi.u(), Mov64mi32.u()],
                    [0, 0],
                )?;
                insert(
                    func,
                    block,
                    pos,
                    opcode,
                    &[rbp(), disp(slot_disp(func, slot)), src],
                );
                Ok(1)
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
        use crate::isa::select_opcode;
        let (size, float) = reg_size_and_float(func, reg);
        let opcode = select_opcode(
            size,
            float,
            [Mov8mr.u(), Mov16mr.u(), Mov32mr.u(), Mov64mr.u()],
            [Movssmr.u(), Movsdmr.u()],
        )?;
        insert(
            func,
            block,
            pos,
            opcode,
            &[rbp(), disp(slot_disp(func, slot)), Operand::reg(reg)],
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
        use crate::isa::select_opcode;
        let (size, float) = reg_size_and_float(func, reg);
        let opcode = select_opcode(
            size,
            float,
            [Mov8rm.u(), Mov16rm.u(), Mov32rm.u(), Mov64rm.u()],
            [Movssrm.u(), Movsdrm.u()],
        )?;
        insert(
            func,
            block,
            pos,
            opcode,
            &[Operand::reg(reg), rbp(), disp(slot_disp(func, slot))],
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
        use crate::isa::select_opcode;
        let opcode = select_opcode(
            size.bytes(),
            false,
            [Mov8mi.u(), Mov16mi.u(), Mov32mi.u(), Mov64mi32.u()],
            [0, 0],
        )?;
        insert(
            func,
            block,
            pos,
            opcode,
            &[rbp(), disp(slot_disp(func, slot)), Operand::Imm(value, size)],
        );
        Ok(1)
    }

    fn slot_addr(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        slot: StackSlot,
        dst: Reg,
    ) -> CodegenResult<usize> {
        insert(
            func,
            block,
            pos,
            Lea64rm.u(),
            &[Operand::reg(dst), rbp(), disp(slot_disp(func, slot))],
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
        let (_, float) = reg_size_and_float(func, reg);
        if float {
            insert(
                func,
                block,
                pos,
                Sub64ri.u(),
                &[Operand::reg(regs::RSP), Operand::Imm(16, ImmSize::S1)],
            );
            insert(
                func,
                block,
                pos + 1,
                Movsdmr.u(),
                &[Operand::reg(regs::RSP), disp(0), Operand::reg(reg)],
            );
            return Ok(2);
        }
        insert(func, block, pos, Push64r.u(), &[Operand::reg(reg)]);
        Ok(1)
    }

    fn restore_reg(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        reg: Reg,
    ) -> CodegenResult<usize> {
        let (_, float) = reg_size_and_float(func, reg);
        if float {
            insert(
                func,
                block,
                pos,
                Movsdrm.u(),
                &[Operand::reg(reg), Operand::reg(regs::RSP), disp(0)],
            );
            insert(
                func,
                block,
                pos + 1,
                Add64ri.u(),
                &[Operand::reg(regs::RSP), Operand::Imm(16, ImmSize::S1)],
            );
            return Ok(2);
        }
        insert(func, block, pos, Pop64r.u(), &[Operand::reg(reg)]);
        Ok(1)
    }

    fn is_reg_move(&self, opcode: u32) -> bool {
        matches!(
            opcodes::Opcode::from_u32(opcode),
            Some(Mov8rr | Mov16rr | Mov32rr | Mov64rr | Movssrr | Movsdrr)
        )
    }

    fn align_pad(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        pos: usize,
        restore: bool,
    ) -> CodegenResult<usize> {
        let opcode = if restore { Add64ri } else { Sub64ri };
        insert(
            func,
            block,
            pos,
            opcode.u(),
            &[Operand::reg(regs::RSP), Operand::Imm(8, ImmSize::S1)],
        );
        Ok(1)
    }
}
