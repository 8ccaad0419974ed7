//! The AArch64 back-end.

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
use target_lexicon::{OperatingSystem, Triple};

static ELF_PRINTER: printer::A64Printer = printer::A64Printer { macho: false };
static MACHO_PRINTER: printer::A64Printer = printer::A64Printer { macho: true };

/// The AArch64 target.
pub struct A64Target {
    triple: Triple,
    layout: DataLayout,
}

impl A64Target {
    /// Create the target for `triple`.
    pub fn new(triple: Triple) -> Self {
        Self {
            triple,
            layout: DataLayout::lp64(),
        }
    }

    fn is_macho(&self) -> bool {
        matches!(
            self.triple.operating_system,
            OperatingSystem::Darwin | OperatingSystem::MacOSX { .. }
        )
    }
}

impl TargetIsa for A64Target {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn data_layout(&self) -> &DataLayout {
        &self.layout
    }

    fn register_info(&self) -> &'static dyn RegisterInfo {
        &regs::AAPCS64
    }

    fn instruction_info(&self) -> &'static dyn InstructionInfo {
        info::instruction_info()
    }

    fn default_call_conv(&self) -> CallConv {
        CallConv::Aapcs64
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
            CallConv::Aapcs64,
            opt_level,
        )));
        pm.add(Box::new(LoweringPass::new(Box::new(
            lower::A64Lowering::new(),
        ))));
        pm.add(Box::new(RegAllocPass::new(
            self.register_info(),
            self.instruction_info(),
        )));
        pm.add(Box::new(SaveCallRegsPass::new(
            self.register_info(),
            self.instruction_info(),
        )));
        let printer: &'static printer::A64Printer = if self.is_macho() {
            &MACHO_PRINTER
        } else {
            &ELF_PRINTER
        };
        pm.add(Box::new(AsmPrintPass::new(printer)));
        Ok(())
    }
}
