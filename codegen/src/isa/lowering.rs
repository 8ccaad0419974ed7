//! The target-lowering driver.
//!
//! Runs on machine IR after instruction selection and before register
//! allocation. The driver owns the target-independent parts: φ parallel-copy
//! resolution, the pseudo-expansion scan loop, and the final sub-register
//! rewrite of force-width operands. The target supplies the expansion of
//! each pseudo and the function prologue/epilogue.

use crate::context::Context;
use crate::ir::unit::Unit;
use crate::isa::instinfo::InstructionInfo;
use crate::isa::reginfo::RegisterInfo;
use crate::mir::{self, pseudo, MirBlock, Operand};
use crate::result::{CodegenError, CodegenResult};

/// Target hooks for pseudo expansion and frame finalization.
pub trait TargetLowering {
    /// The target's register file.
    fn reg_info(&self) -> &'static dyn RegisterInfo;

    /// The target's instruction tables.
    fn inst_info(&self) -> &'static dyn InstructionInfo;

    /// Expand a `CALL_LOWER` at `at` in `block`.
    fn lower_call(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()>;

    /// Expand a `SWITCH_LOWER` at `at` in `block`.
    fn lower_switch(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()>;

    /// Expand a `RETURN_LOWER` at `at` in `block`.
    fn lower_return(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()>;

    /// Expand a `VA_START_LOWER` at `at` in `block`.
    fn lower_va_start(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()>;

    /// Expand a `VA_END_LOWER` at `at` in `block`.
    fn lower_va_end(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
        block: MirBlock,
        at: usize,
    ) -> CodegenResult<()>;

    /// Apply the calling convention to the formal arguments and write the
    /// prologue and epilogues.
    fn lower_function(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: &mut mir::Function,
    ) -> CodegenResult<()>;
}

/// Run target lowering over one machine function.
pub fn run(
    lowering: &mut dyn TargetLowering,
    ctx: &mut Context,
    unit: &mut Unit,
    func: &mut mir::Function,
) -> CodegenResult<()> {
    lower_phis(lowering.inst_info(), lowering.reg_info(), func)?;

    for block in func.block_order.clone() {
        loop {
            let found = func.blocks[block]
                .insts
                .iter()
                .position(|&inst| pseudo::is_pseudo(func.insts[inst].opcode))
                .map(|idx| (idx, func.insts[func.blocks[block].insts[idx]].opcode));
            let (idx, opcode) = match found {
                Some(found) => found,
                None => break,
            };
            match opcode {
                pseudo::CALL_LOWER => lowering.lower_call(ctx, unit, func, block, idx)?,
                pseudo::SWITCH_LOWER => lowering.lower_switch(ctx, unit, func, block, idx)?,
                pseudo::RETURN_LOWER => lowering.lower_return(ctx, unit, func, block, idx)?,
                pseudo::VA_START_LOWER => {
                    lowering.lower_va_start(ctx, unit, func, block, idx)?
                }
                pseudo::VA_END_LOWER => lowering.lower_va_end(ctx, unit, func, block, idx)?,
                _ => {
                    return Err(CodegenError::BadOperand(format!(
                        "unknown pseudo opcode {opcode:#x}"
                    )))
                }
            }
        }
    }

    lowering.lower_function(ctx, unit, func)?;
    rewrite_forced_widths(lowering.reg_info(), func)?;
    Ok(())
}

/// Materialize the queued φ parallel copies of every block just before its
/// terminator.
pub fn lower_phis(
    inst_info: &dyn InstructionInfo,
    reg_info: &dyn RegisterInfo,
    func: &mut mir::Function,
) -> CodegenResult<()> {
    for block in func.block_order.clone() {
        if func.blocks[block].phi_copies.is_empty() {
            continue;
        }
        let copies = std::mem::take(&mut func.blocks[block].phi_copies);
        parallel_copy(inst_info, reg_info, func, block, copies)?;
    }
    Ok(())
}

/// Emit a set of register moves as if they executed simultaneously.
///
/// Ready copies (whose destination no pending copy still reads) are emitted
/// first; a cycle is broken by parking one destination in a scratch virtual
/// register.
fn parallel_copy(
    inst_info: &dyn InstructionInfo,
    reg_info: &dyn RegisterInfo,
    func: &mut mir::Function,
    block: MirBlock,
    copies: Vec<(Operand, Operand)>,
) -> CodegenResult<()> {
    let mut pending: Vec<(Operand, Operand)> = copies
        .into_iter()
        .filter(|(dst, src)| dst != src)
        .collect();
    let mut pos = first_terminator(inst_info, func, block);

    while !pending.is_empty() {
        let ready = pending.iter().position(|&(dst, _)| {
            !pending
                .iter()
                .any(|&(_, src)| src.equals_ignoring_flags(dst))
        });
        let (dst, src) = match ready {
            Some(idx) => pending.remove(idx),
            None => {
                // Every destination is still read by another copy: break the
                // cycle through a scratch register.
                let (dst, _) = pending[0];
                let reg = dst.as_reg().ok_or_else(|| {
                    CodegenError::BadOperand("phi copy into a non-register".to_string())
                })?;
                let class = reg_info.class_of(reg, func);
                let tmp = Operand::reg(func.new_vreg(class));
                let size = reg_info.class(class).size;
                let float = reg_info.is_fp_class(class);
                pos += inst_info.mov(func, block, pos, dst, tmp, size, float)?;
                for (_, src) in pending.iter_mut() {
                    if src.equals_ignoring_flags(dst) {
                        *src = tmp;
                    }
                }
                continue;
            }
        };
        let reg = dst.as_reg().ok_or_else(|| {
            CodegenError::BadOperand("phi copy into a non-register".to_string())
        })?;
        let class = reg_info.class_of(reg, func);
        let size = reg_info.class(class).size;
        let float = reg_info.is_fp_class(class);
        pos += inst_info.mov(func, block, pos, src, dst, size, float)?;
    }
    Ok(())
}

/// The position of the first terminator of `block`, or the block's end.
pub fn first_terminator(
    inst_info: &dyn InstructionInfo,
    func: &mir::Function,
    block: MirBlock,
) -> usize {
    func.blocks[block]
        .insts
        .iter()
        .position(|&inst| inst_info.is_terminator(func.insts[inst].opcode))
        .unwrap_or(func.blocks[block].insts.len())
}

/// Rewrite force-width register operands to the correctly-sized physical
/// alias.
fn rewrite_forced_widths(
    reg_info: &dyn RegisterInfo,
    func: &mut mir::Function,
) -> CodegenResult<()> {
    for block in func.block_order.clone() {
        for idx in 0..func.blocks[block].insts.len() {
            let inst = func.blocks[block].insts[idx];
            for op_idx in 0..func.insts[inst].operands.len() {
                let op = func.insts[inst].operands[op_idx];
                let (reg, flags) = match op {
                    Operand::Reg(reg, flags) => (reg, flags),
                    _ => continue,
                };
                let size = match flags.forced_size() {
                    Some(size) => size,
                    None => continue,
                };
                if !reg_info.is_physical(reg) {
                    continue;
                }
                let sized = reg_info.with_size(reg, size).ok_or_else(|| {
                    CodegenError::BadOperand(format!(
                        "register {} has no {size}-byte alias",
                        reg_info.name(reg)
                    ))
                })?;
                func.insts[inst].operands[op_idx] = Operand::reg(sized);
            }
        }
    }
    Ok(())
}

