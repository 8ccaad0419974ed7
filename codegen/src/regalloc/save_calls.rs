//! Call-site register save/restore.
//!
//! Runs after allocation, when only physical registers remain. Around every
//! call, caller-saved registers that are live across the call and do not
//! receive the return value are saved before the argument setup and
//! restored after the result moves. In the prologue, callee-saved registers
//! the body actually uses are saved, with the mirrored restores at every
//! epilogue.

use crate::context::Context;
use crate::fx::FxHashSet;
use crate::ir::unit::Unit;
use crate::isa::instinfo::InstructionInfo;
use crate::isa::reginfo::RegisterInfo;
use crate::mir::{self, MirBlock, MirInst, Reg};
use crate::passes::{CompileState, Pass};
use crate::regalloc::liveness;
use crate::result::CodegenResult;

/// The save/restore pass.
pub struct SaveCallRegsPass {
    reg_info: &'static dyn RegisterInfo,
    inst_info: &'static dyn InstructionInfo,
}

impl SaveCallRegsPass {
    /// Create the pass for one target.
    pub fn new(
        reg_info: &'static dyn RegisterInfo,
        inst_info: &'static dyn InstructionInfo,
    ) -> Self {
        Self {
            reg_info,
            inst_info,
        }
    }

    fn run_on_function(&self, func: &mut mir::Function) -> CodegenResult<()> {
        liveness::compute(func, self.reg_info, self.inst_info);
        self.save_callee_saved(func)?;
        self.save_around_calls(func)?;
        Ok(())
    }

    fn save_callee_saved(&self, func: &mut mir::Function) -> CodegenResult<()> {
        let used: Vec<Reg> = self
            .reg_info
            .callee_saved()
            .iter()
            .copied()
            .filter(|&reg| liveness::is_reg_ever_live(func, self.reg_info, reg))
            .collect();
        if used.is_empty() {
            return Ok(());
        }

        let entry = func.entry_block();
        let mut pos = func.prologue_size;
        let mut saved_insts = 0;
        for &reg in &used {
            let n = self.inst_info.save_reg(func, entry, pos, reg)?;
            pos += n;
            saved_insts += n;
        }
        if used.len() % 2 != 0 {
            saved_insts += self.inst_info.align_pad(func, entry, pos, false)?;
        }
        func.prologue_size += saved_insts;

        for block in func.block_order.clone() {
            if !self.block_returns(func, block) {
                continue;
            }
            // Restores go before the frame teardown (and before the return
            // itself when there is no teardown).
            let len = func.blocks[block].insts.len();
            let mut pos = len - 1 - func.blocks[block].epilogue_size;
            if used.len() % 2 != 0 {
                pos += self.inst_info.align_pad(func, block, pos, true)?;
            }
            for &reg in used.iter().rev() {
                pos += self.inst_info.restore_reg(func, block, pos, reg)?;
            }
        }
        Ok(())
    }

    fn block_returns(&self, func: &mir::Function, block: MirBlock) -> bool {
        match func.blocks[block].insts.last() {
            Some(&inst) => self.inst_info.desc(func.insts[inst].opcode).is_return,
            None => false,
        }
    }

    fn save_around_calls(&self, func: &mut mir::Function) -> CodegenResult<()> {
        let mut visited: FxHashSet<MirInst> = FxHashSet::default();
        for block in func.block_order.clone() {
            loop {
                let found = func.blocks[block].insts.iter().copied().find(|&inst| {
                    !visited.contains(&inst)
                        && self.inst_info.desc(func.insts[inst].opcode).is_call
                });
                let call = match found {
                    Some(call) => call,
                    None => break,
                };
                visited.insert(call);
                self.save_one_call(func, block, call)?;
            }
        }
        Ok(())
    }

    fn save_one_call(
        &self,
        func: &mut mir::Function,
        block: MirBlock,
        call: MirInst,
    ) -> CodegenResult<()> {
        let site = func.call_sites.get(&call).cloned().unwrap_or_default();
        let indices = func.linear_indices();
        let call_linear = indices[&call];

        let mut saved: Vec<Reg> = Vec::new();
        for &reg in self.reg_info.caller_saved() {
            if site
                .ret_regs
                .iter()
                .any(|&ret| self.reg_info.is_same_register(ret, reg))
            {
                continue;
            }
            if !liveness::is_reg_live(func, self.reg_info, &indices, call_linear, reg, false) {
                continue;
            }
            saved.push(reg);
        }
        if saved.is_empty() {
            return Ok(());
        }
        log::debug!("saving {} caller-saved registers around call", saved.len());

        // Saves go before the argument setup, restores after the result
        // moves, so the call's own register traffic stays inside.
        let call_pos = func.inst_pos(block, call);
        let mut pos = call_pos - site.start_offset;
        for &reg in &saved {
            pos += self.inst_info.save_reg(func, block, pos, reg)?;
        }
        if saved.len() % 2 != 0 {
            self.inst_info.align_pad(func, block, pos, false)?;
        }

        let call_pos = func.inst_pos(block, call);
        let mut pos = call_pos + site.end_offset + 1;
        if saved.len() % 2 != 0 {
            pos += self.inst_info.align_pad(func, block, pos, true)?;
        }
        for &reg in saved.iter().rev() {
            pos += self.inst_info.restore_reg(func, block, pos, reg)?;
        }
        Ok(())
    }
}

impl Pass for SaveCallRegsPass {
    fn name(&self) -> &'static str {
        "save-call-registers"
    }

    fn run(
        &mut self,
        _ctx: &mut Context,
        unit: &mut Unit,
        state: &mut CompileState,
    ) -> CodegenResult<()> {
        let funcs: Vec<_> = state.machine.keys().copied().collect();
        let _ = unit;
        for func in funcs {
            self.run_on_function(state.machine.get_mut(&func).unwrap())?;
        }
        Ok(())
    }
}
