//! The x86-64 back-end.

pub mod info;
pub mod lower;
pub mod opcodes;
pub mod patterns;
pub mod printer;
pub mod regs;

use crate::datalayout::DataLayout;
use crate::isa::instinfo::InstructionInfo;
use crate::isa::reginfo::RegisterInfo;
use crate::isa::{CallConv, FileType, TargetIsa};
use crate::passes::{OptLevel, PassManager};
use crate::pipeline::{AsmPrintPass, IselPass, LoweringPass};
use crate::regalloc::{RegAllocPass, SaveCallRegsPass};
use crate::result::{CodegenError, CodegenResult};
use target_lexicon::Triple;

/// The x86-64 target.
pub struct X64Target {
    triple: Triple,
    layout: DataLayout,
    cc: CallConv,
}

impl X64Target {
    /// Create the target for `triple`.
    pub fn new(triple: Triple) -> Self {
        let cc = CallConv::triple_default(&triple).unwrap_or(CallConv::SysV);
        Self {
            triple,
            layout: DataLayout::lp64(),
            cc,
        }
    }
}

impl TargetIsa for X64Target {
    fn name(&self) -> &'static str {
        "x64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn data_layout(&self) -> &DataLayout {
        &self.layout
    }

    fn register_info(&self) -> &'static dyn RegisterInfo {
        match self.cc {
            CallConv::Win64 => &regs::WIN64,
            _ => &regs::SYSV,
        }
    }

    fn instruction_info(&self) -> &'static dyn InstructionInfo {
        info::instruction_info()
    }

    fn default_call_conv(&self) -> CallConv {
        self.cc
    }

    fn add_passes_for_code_generation(
        &self,
        pm: &mut PassManager,
        file_type: FileType,
        opt_level: OptLevel,
    ) -> CodegenResult<()> {
        if file_type == FileType::Object {
            return Err(CodegenError::Unsupported(
                "object emission requires an external object sink".to_string(),
            ));
        }
        pm.add(Box::new(IselPass::new(
            self.register_info(),
            self.instruction_info(),
            self.layout,
            self.cc,
            opt_level,
        )));
        pm.add(Box::new(LoweringPass::new(Box::new(lower::X64Lowering::new(
            self.cc,
        )))));
        pm.add(Box::new(RegAllocPass::new(
            self.register_info(),
            self.instruction_info(),
        )));
        pm.add(Box::new(SaveCallRegsPass::new(
            self.register_info(),
            self.instruction_info(),
        )));
        pm.add(Box::new(AsmPrintPass::new(&printer::X64Printer)));
        Ok(())
    }
}
