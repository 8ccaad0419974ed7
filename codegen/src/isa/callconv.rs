//! Calling-convention classification.
//!
//! Each convention is a small data-driven table (ordered GP list, ordered
//! FP list, shadow-space bytes, return-register lists, aggregate-return
//! strategy) fed through one generic classification function. The result is
//! a [`CallInfo`]: one [`ArgAssign`] per parameter plus the return
//! assignment list.

use crate::datalayout::DataLayout;
use crate::ir::types::{Type, TypeData, TypeStore};
use crate::isa::reginfo::RegisterInfo;
use crate::mir::Reg;
use crate::result::{CodegenError, CodegenResult};
use target_lexicon::{Architecture, OperatingSystem, Triple};

/// Calling convention identifiers.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CallConv {
    /// System V AMD64 ABI, used on x86-64 Linux and macOS.
    SysV,
    /// The Windows x64 convention.
    Win64,
    /// The AArch64 procedure call standard.
    Aapcs64,
}

impl CallConv {
    /// The default convention of a target triple.
    pub fn triple_default(triple: &Triple) -> Option<Self> {
        match triple.architecture {
            Architecture::X86_64 => match triple.operating_system {
                OperatingSystem::Windows => Some(CallConv::Win64),
                _ => Some(CallConv::SysV),
            },
            Architecture::Aarch64(_) => Some(CallConv::Aapcs64),
            _ => None,
        }
    }
}

/// How a convention returns small aggregates.
#[derive(Copy, Clone, Debug)]
pub enum AggregateReturn {
    /// One return register per scalar field (SysV).
    PerField,
    /// By total size: one register when it fits, a pair for 16 bytes
    /// (Win64).
    BySize,
    /// In the first return register, spilling into the second above 8 bytes
    /// (AAPCS64).
    BySizePair,
}

/// The static table describing one convention.
pub struct CallConvData {
    /// Argument GP registers, in order.
    pub gp: &'static [Reg],
    /// Argument FP registers, in order.
    pub fp: &'static [Reg],
    /// Shadow space the caller reserves below the arguments, in bytes.
    pub shadow_bytes: u64,
    /// Return GP registers, in order.
    pub ret_gp: &'static [Reg],
    /// Return FP registers, in order.
    pub ret_fp: &'static [Reg],
    /// When set, an argument consumes its position in *both* register
    /// lists (Win64: a float at position 3 lands in xmm3).
    pub positional: bool,
    /// Aggregate-return strategy.
    pub aggregate_return: AggregateReturn,
}

/// Where one argument goes.
#[derive(Clone, Copy, Debug)]
pub enum ArgAssign {
    /// In a register, possibly a sub-register alias for narrow values.
    Reg {
        /// The physical register.
        reg: Reg,
        /// The value size in bytes.
        size: u64,
    },
    /// On the stack.
    Stack,
}

/// The classification result for one call site or function signature.
#[derive(Debug, Default)]
pub struct CallInfo {
    /// One entry per parameter.
    pub args: Vec<ArgAssign>,
    /// Return assignments; empty for void, up to two registers for small
    /// aggregates.
    pub rets: Vec<ArgAssign>,
    /// Shadow space the caller must reserve, in bytes.
    pub shadow_bytes: u64,
}

impl CallInfo {
    /// Classify `types` (return type at index 0, then parameters) under the
    /// convention described by `cc`.
    pub fn analyze(
        cc: &CallConvData,
        reg_info: &dyn RegisterInfo,
        types: &TypeStore,
        layout: &DataLayout,
        sig: &[Type],
        vararg: bool,
    ) -> CodegenResult<Self> {
        let _ = vararg;
        let mut info = CallInfo {
            shadow_bytes: cc.shadow_bytes,
            ..Default::default()
        };
        let mut used_gp = 0;
        let mut used_fp = 0;

        for &ty in &sig[1..] {
            let float = types.is_float(ty);
            let size = layout.size_of(types, ty);
            let position = if cc.positional {
                used_gp.max(used_fp)
            } else if float {
                used_fp
            } else {
                used_gp
            };
            let (bank, used) = if float {
                (cc.fp, &mut used_fp)
            } else {
                (cc.gp, &mut used_gp)
            };
            if position >= bank.len() {
                info.args.push(ArgAssign::Stack);
                if cc.positional {
                    used_gp = position + 1;
                    used_fp = position + 1;
                }
                continue;
            }
            let base = bank[position];
            if cc.positional {
                used_gp = position + 1;
                used_fp = position + 1;
            } else {
                *used += 1;
            }
            let reg = if float {
                base
            } else {
                sized(reg_info, base, size)?
            };
            info.args.push(ArgAssign::Reg { reg, size });
        }

        info.classify_return(cc, reg_info, types, layout, sig[0])?;
        Ok(info)
    }

    fn classify_return(
        &mut self,
        cc: &CallConvData,
        reg_info: &dyn RegisterInfo,
        types: &TypeStore,
        layout: &DataLayout,
        ret: Type,
    ) -> CodegenResult<()> {
        if types.is_void(ret) {
            return Ok(());
        }
        if types.is_float(ret) {
            self.rets.push(ArgAssign::Reg {
                reg: cc.ret_fp[0],
                size: layout.size_of(types, ret),
            });
            return Ok(());
        }
        if let TypeData::Struct { ref fields, .. } = *types.data(ret) {
            match cc.aggregate_return {
                AggregateReturn::PerField => {
                    let mut used_gp = 0;
                    let mut used_fp = 0;
                    for &field in fields {
                        let size = layout.size_of(types, field);
                        if types.is_float(field) && used_fp < cc.ret_fp.len() {
                            self.rets.push(ArgAssign::Reg {
                                reg: cc.ret_fp[used_fp],
                                size,
                            });
                            used_fp += 1;
                        } else if types.is_int(field) || types.is_pointer(field) {
                            if used_gp >= cc.ret_gp.len() {
                                return Err(CodegenError::BadOperand(
                                    "aggregate return does not fit in registers".to_string(),
                                ));
                            }
                            self.rets.push(ArgAssign::Reg {
                                reg: sized(reg_info, cc.ret_gp[used_gp], size)?,
                                size,
                            });
                            used_gp += 1;
                        } else {
                            return Err(CodegenError::BadOperand(
                                "unsupported aggregate return field".to_string(),
                            ));
                        }
                    }
                }
                AggregateReturn::BySize | AggregateReturn::BySizePair => {
                    let size = layout.size_of(types, ret);
                    if size > 16 {
                        return Err(CodegenError::BadOperand(
                            "aggregate return does not fit in registers".to_string(),
                        ));
                    }
                    self.rets.push(ArgAssign::Reg {
                        reg: cc.ret_gp[0],
                        size: size.min(8),
                    });
                    if size > 8 {
                        self.rets.push(ArgAssign::Reg {
                            reg: cc.ret_gp[1],
                            size: 8,
                        });
                    }
                }
            }
            return Ok(());
        }
        let size = layout.size_of(types, ret);
        self.rets.push(ArgAssign::Reg {
            reg: sized(reg_info, cc.ret_gp[0], size)?,
            size,
        });
        Ok(())
    }
}

/// The static table of a convention.
pub fn call_conv_data(cc: CallConv) -> &'static CallConvData {
    use crate::isa::aarch64::regs as a64;
    use crate::isa::x64::regs as x64;
    static SYSV: CallConvData = CallConvData {
        gp: &[x64::RDI, x64::RSI, x64::RDX, x64::RCX, x64::R8, x64::R9],
        fp: &[
            x64::XMM0,
            x64::XMM1,
            x64::XMM2,
            x64::XMM3,
            x64::XMM4,
            x64::XMM5,
            x64::XMM6,
            x64::XMM7,
        ],
        shadow_bytes: 0,
        ret_gp: &[x64::RAX, x64::RDX],
        ret_fp: &[x64::XMM0, x64::XMM1],
        positional: false,
        aggregate_return: AggregateReturn::PerField,
    };
    static WIN64: CallConvData = CallConvData {
        gp: &[x64::RCX, x64::RDX, x64::R8, x64::R9],
        fp: &[x64::XMM0, x64::XMM1, x64::XMM2, x64::XMM3],
        shadow_bytes: 32,
        ret_gp: &[x64::RAX, x64::RDX],
        ret_fp: &[x64::XMM0],
        positional: true,
        aggregate_return: AggregateReturn::BySize,
    };
    static AAPCS64: CallConvData = CallConvData {
        gp: &[
            a64::X0,
            a64::X1,
            a64::X2,
            a64::X3,
            a64::X4,
            a64::X5,
            a64::X6,
            a64::X7,
        ],
        fp: &[
            a64::D0,
            a64::D1,
            a64::D2,
            a64::D3,
            a64::D4,
            a64::D5,
            a64::D6,
            a64::D7,
        ],
        shadow_bytes: 0,
        ret_gp: &[a64::X0, a64::X1],
        ret_fp: &[a64::D0, a64::D1],
        positional: false,
        aggregate_return: AggregateReturn::BySizePair,
    };
    match cc {
        CallConv::SysV => &SYSV,
        CallConv::Win64 => &WIN64,
        CallConv::Aapcs64 => &AAPCS64,
    }
}

fn sized(reg_info: &dyn RegisterInfo, base: Reg, size: u64) -> CodegenResult<Reg> {
    reg_info.with_size(base, size).ok_or_else(|| {
        CodegenError::BadOperand(format!(
            "register {} has no {size}-byte alias",
            reg_info.name(base)
        ))
    })
}
