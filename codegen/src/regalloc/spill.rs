//! Spilling a register to a stack slot.
//!
//! Every occurrence of the spilled register is replaced with a fresh
//! virtual register of the same class: pure definitions get a store to the
//! slot inserted after them, uses get a load inserted before them, and
//! two-address operands get both. The rewrite restarts its block scan after
//! every change since insertion shifts positions.

use crate::isa::instinfo::InstructionInfo;
use crate::isa::reginfo::RegisterInfo;
use crate::mir::{self, Operand, Reg, StackSlot};
use crate::result::CodegenResult;

/// Spill `reg` into a fresh slot sized for its class.
pub fn spill(
    inst_info: &dyn InstructionInfo,
    reg_info: &dyn RegisterInfo,
    func: &mut mir::Function,
    reg: Reg,
) -> CodegenResult<StackSlot> {
    let class = reg_info.class_of(reg, func);
    let data = reg_info.class(class);
    let slot = func.frame.push(data.size as u32, data.align as u32);
    spill_to(inst_info, reg_info, func, reg, slot)?;
    Ok(slot)
}

/// Spill `reg` into `slot`.
pub fn spill_to(
    inst_info: &dyn InstructionInfo,
    reg_info: &dyn RegisterInfo,
    func: &mut mir::Function,
    reg: Reg,
    slot: StackSlot,
) -> CodegenResult<()> {
    let class = reg_info.class_of(reg, func);
    log::debug!("spilling {reg:?} to {slot:?}");
    for block in func.block_order.clone() {
        'rescan: loop {
            for pos in 0..func.blocks[block].insts.len() {
                let inst = func.blocks[block].insts[pos];
                let opcode = func.insts[inst].opcode;
                for op_idx in 0..func.insts[inst].operands.len() {
                    let op = func.insts[inst].operands[op_idx];
                    let (found, flags) = match op {
                        Operand::Reg(r, flags) if r == reg => (true, flags),
                        _ => (false, Default::default()),
                    };
                    if !found {
                        continue;
                    }
                    let fresh = func.new_vreg(class);
                    func.insts[inst].operands[op_idx] = Operand::Reg(fresh, flags);

                    let restriction = inst_info.desc(opcode).restriction(op_idx);
                    if restriction.is_read() || !restriction.is_written() {
                        inst_info.slot_to_reg(func, block, pos, fresh, slot)?;
                    }
                    if restriction.is_written() {
                        // The load (if any) shifted the defining instruction
                        // down by one.
                        let def_pos = if restriction.is_read() || !restriction.is_written()
                        {
                            pos + 2
                        } else {
                            pos + 1
                        };
                        inst_info.reg_to_slot(func, block, def_pos, fresh, slot)?;
                    }
                    continue 'rescan;
                }
            }
            break;
        }
    }
    Ok(())
}
