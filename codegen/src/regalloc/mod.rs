//! Register allocation.
//!
//! Graph coloring over live intervals with cost-weighted spilling
//! ([`coloring`]), plus the post-allocation call-site register save/restore
//! pass ([`save_calls`]).

pub mod coloring;
pub mod liveness;
pub mod save_calls;
pub mod spill;

use crate::context::Context;
use crate::fx::FxHashMap;
use crate::ir::unit::Unit;
use crate::isa::instinfo::InstructionInfo;
use crate::isa::reginfo::RegisterInfo;
use crate::mir::{self, Operand};
use crate::passes::{CompileState, Pass};
use crate::result::CodegenResult;

pub use self::save_calls::SaveCallRegsPass;

/// The allocation pass: after it runs, no virtual register remains in any
/// operand and the prologue/epilogue frame immediates are final.
pub struct RegAllocPass {
    reg_info: &'static dyn RegisterInfo,
    inst_info: &'static dyn InstructionInfo,
}

impl RegAllocPass {
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
}

impl Pass for RegAllocPass {
    fn name(&self) -> &'static str {
        "regalloc"
    }

    fn run(
        &mut self,
        _ctx: &mut Context,
        unit: &mut Unit,
        state: &mut CompileState,
    ) -> CodegenResult<()> {
        let funcs: Vec<_> = state.machine.keys().copied().collect();
        for func in funcs {
            // Spill weights scale with the IR loop nesting of each block.
            let ir_func = state.machine[&func].ir_func;
            let forest_depths: FxHashMap<crate::ir::Block, u32> = {
                let blocks = unit.funcs[ir_func].blocks.clone();
                let forest = unit.loop_forest(ir_func);
                blocks.iter().map(|&b| (b, forest.depth(b))).collect()
            };
            let mfunc = state.machine.get_mut(&func).unwrap();
            let mut depths: FxHashMap<mir::MirBlock, u32> = FxHashMap::default();
            for &mb in &mfunc.block_order {
                if let Some(ir_block) = mfunc.blocks[mb].ir_block.expand() {
                    depths.insert(mb, forest_depths.get(&ir_block).copied().unwrap_or(0));
                }
            }

            coloring::allocate(mfunc, self.reg_info, self.inst_info, &depths)?;
            finalize_frame(mfunc);
            debug_assert!(no_virtuals_remain(mfunc));
        }
        Ok(())
    }
}

/// Patch the prologue/epilogue immediates with the final frame size.
fn finalize_frame(func: &mut mir::Function) {
    let size = (func.frame.size() + 15) / 16 * 16;
    for inst in func.frame_fixups.clone() {
        for op in func.insts[inst].operands.iter_mut() {
            if let Operand::Imm(value, _) = op {
                *value = size as i64;
            }
        }
    }
}

fn no_virtuals_remain(func: &mir::Function) -> bool {
    func.block_order.iter().all(|&block| {
        func.blocks[block].insts.iter().all(|&inst| {
            func.insts[inst]
                .operands
                .iter()
                .all(|op| op.as_reg().map(|r| !r.is_virtual()).unwrap_or(true))
        })
    })
}
