//! The target-independent passes of the lowering pipeline.
//!
//! Targets assemble their pipeline from these plus their own lowering in
//! `TargetIsa::add_passes_for_code_generation`: instruction selection, the
//! target-lowering driver, register allocation, call-site save/restore, and
//! the assembly printer.

use crate::context::Context;
use crate::datalayout::DataLayout;
use crate::ir;
use crate::ir::unit::Unit;
use crate::ir::Intrinsic;
use crate::isa::instinfo::InstructionInfo;
use crate::isa::lowering::{self, TargetLowering};
use crate::isa::reginfo::RegisterInfo;
use crate::isa::{AsmPrinter, CallConv};
use crate::isel::{DagBuilder, Isel};
use crate::mir::{self, Operand};
use crate::passes::{CompileState, OptLevel, Pass};
use crate::result::CodegenResult;

/// Instruction selection: IR functions become machine IR with virtual
/// registers and pseudo-instructions.
pub struct IselPass {
    reg_info: &'static dyn RegisterInfo,
    inst_info: &'static dyn InstructionInfo,
    layout: DataLayout,
    default_cc: CallConv,
    opt_level: OptLevel,
}

impl IselPass {
    /// Create the pass.
    pub fn new(
        reg_info: &'static dyn RegisterInfo,
        inst_info: &'static dyn InstructionInfo,
        layout: DataLayout,
        default_cc: CallConv,
        opt_level: OptLevel,
    ) -> Self {
        Self {
            reg_info,
            inst_info,
            layout,
            default_cc,
            opt_level,
        }
    }

    fn lower_function(
        &self,
        ctx: &mut Context,
        unit: &mut Unit,
        func: ir::Func,
    ) -> CodegenResult<mir::Function> {
        let name = unit.funcs[func].name.clone();
        let mut mfunc = mir::Function::new(name, func);

        // Machine blocks mirror the IR blocks and their CFG edges.
        let blocks = unit.funcs[func].blocks.clone();
        for &block in &blocks {
            let name = unit.blocks[block].name.clone();
            mfunc.add_block(mir::BlockData::new(name, block));
        }
        for &block in &blocks {
            let mb = mfunc.ir_block_map[&block];
            for &succ in &unit.blocks[block].succs {
                let ms = mfunc.ir_block_map[&succ];
                mfunc.blocks[mb].succs.push(ms);
                mfunc.blocks[ms].preds.push(mb);
            }
        }

        // Formal arguments start life in fresh virtual registers; the
        // calling convention binds them during target lowering.
        let args = unit.funcs[func].args.clone();
        for &arg in &args {
            let ty = unit.values[arg].ty;
            let class = self.reg_info.class_for_type(&ctx.types, &self.layout, ty);
            let vreg = mfunc.new_vreg(class);
            mfunc.args.push(Some(Operand::reg(vreg)));
        }

        let dag = DagBuilder::new(ctx, unit, func, &mut mfunc, &self.layout, self.default_cc)
            .build()?;
        let mut isel = Isel::new(
            ctx,
            &dag,
            &mut mfunc,
            &self.layout,
            self.reg_info,
            self.inst_info,
            self.opt_level,
            self.default_cc,
        );
        isel.run(&blocks)?;
        Ok(mfunc)
    }
}

impl Pass for IselPass {
    fn name(&self) -> &'static str {
        "isel"
    }

    fn run(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        state: &mut CompileState,
    ) -> CodegenResult<()> {
        let funcs: Vec<ir::Func> = unit.funcs.keys().collect();
        for func in funcs {
            if unit.funcs[func].is_declaration() {
                continue;
            }
            if Intrinsic::from_name(&unit.funcs[func].name).is_some() {
                continue;
            }
            log::debug!("selecting instructions for {}", unit.funcs[func].name);
            let mfunc = self.lower_function(ctx, unit, func)?;
            state.machine.insert(func, mfunc);
        }
        Ok(())
    }
}

/// The target-lowering driver pass.
pub struct LoweringPass {
    lowering: Box<dyn TargetLowering + Send>,
}

impl LoweringPass {
    /// Wrap a target's lowering hooks.
    pub fn new(lowering: Box<dyn TargetLowering + Send>) -> Self {
        Self { lowering }
    }
}

impl Pass for LoweringPass {
    fn name(&self) -> &'static str {
        "target-lowering"
    }

    fn run(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        state: &mut CompileState,
    ) -> CodegenResult<()> {
        let funcs: Vec<ir::Func> = state.machine.keys().copied().collect();
        for func in funcs {
            let mfunc = state.machine.get_mut(&func).unwrap();
            lowering::run(&mut *self.lowering, ctx, unit, mfunc)?;
        }
        Ok(())
    }
}

/// Renders the finished machine functions as assembly text into the
/// compile state's output buffer.
pub struct AsmPrintPass {
    printer: &'static dyn AsmPrinter,
}

impl AsmPrintPass {
    /// Wrap a target printer.
    pub fn new(printer: &'static dyn AsmPrinter) -> Self {
        Self { printer }
    }
}

impl Pass for AsmPrintPass {
    fn name(&self) -> &'static str {
        "asm-print"
    }

    fn run(
        &mut self,
        ctx: &mut Context,
        unit: &mut Unit,
        state: &mut CompileState,
    ) -> CodegenResult<()> {
        let mut out = String::new();
        self.printer.print(ctx, unit, &state.machine, &mut out)?;
        state.output.push_str(&out);
        Ok(())
    }
}
