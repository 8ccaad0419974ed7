//! Target back-ends.
//!
//! A back-end is selected by `(architecture, operating system)` through
//! [`lookup`]; the returned [`TargetIsa`] exposes the target's data layout,
//! register file, instruction tables, and the pass pipeline that lowers a
//! unit to machine code.

pub mod aarch64;
pub mod callconv;
pub mod instinfo;
pub mod lowering;
pub mod reginfo;
pub mod x64;

pub use self::callconv::{AggregateReturn, ArgAssign, CallConv, CallConvData, CallInfo};
pub use self::instinfo::{select_opcode, InstDesc, InstructionInfo, Restriction};
pub use self::reginfo::{RegisterClassData, RegisterDesc, RegisterInfo};

use crate::datalayout::DataLayout;
use crate::passes::{OptLevel, PassManager};
use crate::result::{CodegenError, CodegenResult};
use target_lexicon::{Architecture, OperatingSystem, Triple};

/// The kind of output file a compilation produces.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FileType {
    /// Assembly text in the target's syntax.
    Assembly,
    /// A relocatable object file, written through an external [`ObjectSink`].
    Object,
}

/// Renders lowered machine functions as assembly text.
pub trait AsmPrinter: Send + Sync {
    /// Append the whole unit's assembly to `out`.
    fn print(
        &self,
        ctx: &crate::context::Context,
        unit: &crate::ir::Unit,
        machine: &crate::fx::FxHashMap<crate::ir::Func, crate::mir::Function>,
        out: &mut String,
    ) -> CodegenResult<()>;
}

/// Interface to the external relocatable-object writer.
///
/// Object encoding (ELF, Mach-O, COFF) is not part of this crate; a driver
/// that wants object output supplies an implementation of this sink.
pub trait ObjectSink {
    /// Start a symbol at the current offset of the text section.
    fn define_symbol(&mut self, name: &str, global: bool);
    /// Append encoded bytes to the text section.
    fn append_code(&mut self, bytes: &[u8]);
    /// Record a relocation against `symbol` at `offset`.
    fn reloc(&mut self, offset: u64, symbol: &str);
}

/// A target back-end.
pub trait TargetIsa: Send + Sync {
    /// Short name ("x64", "aarch64").
    fn name(&self) -> &'static str;

    /// The triple this instance was constructed for.
    fn triple(&self) -> &Triple;

    /// The target's data layout.
    fn data_layout(&self) -> &DataLayout;

    /// The target's register file.
    fn register_info(&self) -> &'static dyn RegisterInfo;

    /// The target's instruction tables.
    fn instruction_info(&self) -> &'static dyn InstructionInfo;

    /// The default calling convention for this triple.
    fn default_call_conv(&self) -> CallConv;

    /// Populate `pm` with the passes lowering a unit to `file_type` output.
    fn add_passes_for_code_generation(
        &self,
        pm: &mut PassManager,
        file_type: FileType,
        opt_level: OptLevel,
    ) -> CodegenResult<()>;
}

/// Look up the back-end for `triple`.
pub fn lookup(triple: Triple) -> CodegenResult<Box<dyn TargetIsa>> {
    match triple.architecture {
        Architecture::X86_64 => match triple.operating_system {
            OperatingSystem::Linux | OperatingSystem::Windows => {
                Ok(Box::new(x64::X64Target::new(triple)))
            }
            _ => Err(CodegenError::TargetMissing(triple.to_string())),
        },
        Architecture::Aarch64(_) => match triple.operating_system {
            OperatingSystem::Linux
            | OperatingSystem::Darwin
            | OperatingSystem::MacOSX { .. } => Ok(Box::new(aarch64::A64Target::new(triple))),
            _ => Err(CodegenError::TargetMissing(triple.to_string())),
        },
        _ => Err(CodegenError::TargetMissing(triple.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn lookup_known_triples() {
        for name in [
            "x86_64-unknown-linux-gnu",
            "x86_64-pc-windows-msvc",
            "aarch64-unknown-linux-gnu",
            "aarch64-apple-darwin",
        ] {
            let triple = Triple::from_str(name).unwrap();
            assert!(lookup(triple).is_ok(), "no backend for {name}");
        }
    }

    #[test]
    fn lookup_rejects_unknown_targets() {
        let triple = Triple::from_str("riscv64gc-unknown-linux-gnu").unwrap();
        assert!(matches!(
            lookup(triple),
            Err(CodegenError::TargetMissing(_))
        ));
    }
}
