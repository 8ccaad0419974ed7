//! x86-64 register file.
//!
//! Descriptor order follows the hardware naming: the 64-bit registers
//! first, then their 32/16/8-bit aliases at matching positions within each
//! class, the legacy high-byte registers, the XMM bank, and `rip`.

use crate::datalayout::DataLayout;
use crate::ir::types::{Type, TypeStore};
use crate::isa::reginfo::{RegisterClassData, RegisterDesc, RegisterInfo};
use crate::mir::Reg;

macro_rules! regs {
    ($($name:ident = $id:expr;)*) => {
        $(
            #[allow(missing_docs)]
            pub const $name: Reg = Reg($id);
        )*
    }
}

regs! {
    RAX = 0; RBX = 1; RCX = 2; RDX = 3; RSI = 4; RDI = 5; RBP = 6; RSP = 7;
    R8 = 8; R9 = 9; R10 = 10; R11 = 11; R12 = 12; R13 = 13; R14 = 14; R15 = 15;

    EAX = 16; EBX = 17; ECX = 18; EDX = 19; ESI = 20; EDI = 21; EBP = 22; ESP = 23;
    R8D = 24; R9D = 25; R10D = 26; R11D = 27; R12D = 28; R13D = 29; R14D = 30; R15D = 31;

    AX = 32; BX = 33; CX = 34; DX = 35; SI = 36; DI = 37; BP = 38; SP = 39;
    R8W = 40; R9W = 41; R10W = 42; R11W = 43; R12W = 44; R13W = 45; R14W = 46; R15W = 47;

    AL = 48; BL = 49; CL = 50; DL = 51; SIL = 52; DIL = 53; BPL = 54; SPL = 55;
    R8B = 56; R9B = 57; R10B = 58; R11B = 59; R12B = 60; R13B = 61; R14B = 62; R15B = 63;

    AH = 64; BH = 65; CH = 66; DH = 67;

    XMM0 = 68; XMM1 = 69; XMM2 = 70; XMM3 = 71; XMM4 = 72; XMM5 = 73; XMM6 = 74;
    XMM7 = 75; XMM8 = 76; XMM9 = 77; XMM10 = 78; XMM11 = 79; XMM12 = 80; XMM13 = 81;
    XMM14 = 82; XMM15 = 83;

    RIP = 84;
}

/// Register classes of this target.
#[allow(missing_docs)]
pub mod class {
    pub const GPR64: u32 = 0;
    pub const GPR32: u32 = 1;
    pub const GPR16: u32 = 2;
    pub const GPR8: u32 = 3;
    pub const FPR: u32 = 4;
}

macro_rules! gpr_desc {
    ($name:expr, $class:expr, [$($alias:expr),*]) => {
        RegisterDesc {
            name: $name,
            class: $class,
            aliases: &[$($alias),*],
        }
    };
}

static DESCS: &[RegisterDesc] = &[
    gpr_desc!("rax", class::GPR64, [EAX, AX, AL, AH]),
    gpr_desc!("rbx", class::GPR64, [EBX, BX, BL, BH]),
    gpr_desc!("rcx", class::GPR64, [ECX, CX, CL, CH]),
    gpr_desc!("rdx", class::GPR64, [EDX, DX, DL, DH]),
    gpr_desc!("rsi", class::GPR64, [ESI, SI, SIL]),
    gpr_desc!("rdi", class::GPR64, [EDI, DI, DIL]),
    gpr_desc!("rbp", class::GPR64, [EBP, BP, BPL]),
    gpr_desc!("rsp", class::GPR64, [ESP, SP, SPL]),
    gpr_desc!("r8", class::GPR64, [R8D, R8W, R8B]),
    gpr_desc!("r9", class::GPR64, [R9D, R9W, R9B]),
    gpr_desc!("r10", class::GPR64, [R10D, R10W, R10B]),
    gpr_desc!("r11", class::GPR64, [R11D, R11W, R11B]),
    gpr_desc!("r12", class::GPR64, [R12D, R12W, R12B]),
    gpr_desc!("r13", class::GPR64, [R13D, R13W, R13B]),
    gpr_desc!("r14", class::GPR64, [R14D, R14W, R14B]),
    gpr_desc!("r15", class::GPR64, [R15D, R15W, R15B]),
    gpr_desc!("eax", class::GPR32, [RAX, AX, AL, AH]),
    gpr_desc!("ebx", class::GPR32, [RBX, BX, BL, BH]),
    gpr_desc!("ecx", class::GPR32, [RCX, CX, CL, CH]),
    gpr_desc!("edx", class::GPR32, [RDX, DX, DL, DH]),
    gpr_desc!("esi", class::GPR32, [RSI, SI, SIL]),
    gpr_desc!("edi", class::GPR32, [RDI, DI, DIL]),
    gpr_desc!("ebp", class::GPR32, [RBP, BP, BPL]),
    gpr_desc!("esp", class::GPR32, [RSP, SP, SPL]),
    gpr_desc!("r8d", class::GPR32, [R8, R8W, R8B]),
    gpr_desc!("r9d", class::GPR32, [R9, R9W, R9B]),
    gpr_desc!("r10d", class::GPR32, [R10, R10W, R10B]),
    gpr_desc!("r11d", class::GPR32, [R11, R11W, R11B]),
    gpr_desc!("r12d", class::GPR32, [R12, R12W, R12B]),
    gpr_desc!("r13d", class::GPR32, [R13, R13W, R13B]),
    gpr_desc!("r14d", class::GPR32, [R14, R14W, R14B]),
    gpr_desc!("r15d", class::GPR32, [R15, R15W, R15B]),
    gpr_desc!("ax", class::GPR16, [RAX, EAX, AL, AH]),
    gpr_desc!("bx", class::GPR16, [RBX, EBX, BL, BH]),
    gpr_desc!("cx", class::GPR16, [RCX, ECX, CL, CH]),
    gpr_desc!("dx", class::GPR16, [RDX, EDX, DL, DH]),
    gpr_desc!("si", class::GPR16, [RSI, ESI, SIL]),
    gpr_desc!("di", class::GPR16, [RDI, EDI, DIL]),
    gpr_desc!("bp", class::GPR16, [RBP, EBP, BPL]),
    gpr_desc!("sp", class::GPR16, [RSP, ESP, SPL]),
    gpr_desc!("r8w", class::GPR16, [R8, R8D, R8B]),
    gpr_desc!("r9w", class::GPR16, [R9, R9D, R9B]),
    gpr_desc!("r10w", class::GPR16, [R10, R10D, R10B]),
    gpr_desc!("r11w", class::GPR16, [R11, R11D, R11B]),
    gpr_desc!("r12w", class::GPR16, [R12, R12D, R12B]),
    gpr_desc!("r13w", class::GPR16, [R13, R13D, R13B]),
    gpr_desc!("r14w", class::GPR16, [R14, R14D, R14B]),
    gpr_desc!("r15w", class::GPR16, [R15, R15D, R15B]),
    gpr_desc!("al", class::GPR8, [RAX, EAX, AX, AH]),
    gpr_desc!("bl", class::GPR8, [RBX, EBX, BX, BH]),
    gpr_desc!("cl", class::GPR8, [RCX, ECX, CX, CH]),
    gpr_desc!("dl", class::GPR8, [RDX, EDX, DX, DH]),
    gpr_desc!("sil", class::GPR8, [RSI, ESI, SI]),
    gpr_desc!("dil", class::GPR8, [RDI, EDI, DI]),
    gpr_desc!("bpl", class::GPR8, [RBP, EBP, BP]),
    gpr_desc!("spl", class::GPR8, [RSP, ESP, SP]),
    gpr_desc!("r8b", class::GPR8, [R8, R8D, R8W]),
    gpr_desc!("r9b", class::GPR8, [R9, R9D, R9W]),
    gpr_desc!("r10b", class::GPR8, [R10, R10D, R10W]),
    gpr_desc!("r11b", class::GPR8, [R11, R11D, R11W]),
    gpr_desc!("r12b", class::GPR8, [R12, R12D, R12W]),
    gpr_desc!("r13b", class::GPR8, [R13, R13D, R13W]),
    gpr_desc!("r14b", class::GPR8, [R14, R14D, R14W]),
    gpr_desc!("r15b", class::GPR8, [R15, R15D, R15W]),
    gpr_desc!("ah", class::GPR8, [RAX, EAX, AX, AL]),
    gpr_desc!("bh", class::GPR8, [RBX, EBX, BX, BL]),
    gpr_desc!("ch", class::GPR8, [RCX, ECX, CX, CL]),
    gpr_desc!("dh", class::GPR8, [RDX, EDX, DX, DL]),
    gpr_desc!("xmm0", class::FPR, []),
    gpr_desc!("xmm1", class::FPR, []),
    gpr_desc!("xmm2", class::FPR, []),
    gpr_desc!("xmm3", class::FPR, []),
    gpr_desc!("xmm4", class::FPR, []),
    gpr_desc!("xmm5", class::FPR, []),
    gpr_desc!("xmm6", class::FPR, []),
    gpr_desc!("xmm7", class::FPR, []),
    gpr_desc!("xmm8", class::FPR, []),
    gpr_desc!("xmm9", class::FPR, []),
    gpr_desc!("xmm10", class::FPR, []),
    gpr_desc!("xmm11", class::FPR, []),
    gpr_desc!("xmm12", class::FPR, []),
    gpr_desc!("xmm13", class::FPR, []),
    gpr_desc!("xmm14", class::FPR, []),
    gpr_desc!("xmm15", class::FPR, []),
    gpr_desc!("rip", class::GPR64, []),
];

static CLASSES: &[RegisterClassData] = &[
    RegisterClassData {
        regs: &[
            RAX, RBX, RCX, RDX, RSI, RDI, RBP, RSP, R8, R9, R10, R11, R12, R13, R14, R15,
            RIP,
        ],
        size: 8,
        align: 8,
    },
    RegisterClassData {
        regs: &[
            EAX, EBX, ECX, EDX, ESI, EDI, EBP, ESP, R8D, R9D, R10D, R11D, R12D, R13D,
            R14D, R15D,
        ],
        size: 4,
        align: 4,
    },
    RegisterClassData {
        regs: &[
            AX, BX, CX, DX, SI, DI, BP, SP, R8W, R9W, R10W, R11W, R12W, R13W, R14W, R15W,
        ],
        size: 2,
        align: 2,
    },
    RegisterClassData {
        regs: &[
            AL, BL, CL, DL, SIL, DIL, BPL, SPL, R8B, R9B, R10B, R11B, R12B, R13B, R14B,
            R15B, AH, BH, CH, DH,
        ],
        size: 1,
        align: 1,
    },
    RegisterClassData {
        regs: &[
            XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7, XMM8, XMM9, XMM10, XMM11,
            XMM12, XMM13, XMM14, XMM15,
        ],
        size: 8,
        align: 16,
    },
];

// r11 is kept out of allocation as the address scratch register.
static AVAILABLE_GPR64: &[Reg] = &[
    RAX, RBX, RCX, RDX, RSI, RDI, R8, R9, R10, R12, R13, R14, R15,
];
static AVAILABLE_GPR32: &[Reg] = &[
    EAX, EBX, ECX, EDX, ESI, EDI, R8D, R9D, R10D, R12D, R13D, R14D, R15D,
];
static AVAILABLE_GPR16: &[Reg] = &[
    AX, BX, CX, DX, SI, DI, R8W, R9W, R10W, R12W, R13W, R14W, R15W,
];
static AVAILABLE_GPR8: &[Reg] = &[
    AL, BL, CL, DL, SIL, DIL, R8B, R9B, R10B, R12B, R13B, R14B, R15B,
];
static AVAILABLE_FPR: &[Reg] = &[
    XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7, XMM8, XMM9, XMM10, XMM11, XMM12,
    XMM13, XMM14, XMM15,
];

static RESERVED_GPR64: &[Reg] = &[RSP, RBP, RIP, R11];
static RESERVED_GPR32: &[Reg] = &[ESP, EBP, R11D];
static RESERVED_GPR16: &[Reg] = &[SP, BP, R11W];
static RESERVED_GPR8: &[Reg] = &[SPL, BPL, R11B, AH, BH, CH, DH];
static RESERVED_FPR: &[Reg] = &[];

static SYSV_CALLER_SAVED: &[Reg] = &[
    RAX, RCX, RDX, RSI, RDI, R8, R9, R10, R11, XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6,
    XMM7, XMM8, XMM9, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15,
];
static SYSV_CALLEE_SAVED: &[Reg] = &[RBX, R12, R13, R14, R15];

static WIN64_CALLER_SAVED: &[Reg] = &[
    RAX, RCX, RDX, R8, R9, R10, R11, XMM0, XMM1, XMM2, XMM3, XMM4, XMM5,
];
static WIN64_CALLEE_SAVED: &[Reg] = &[RBX, RSI, RDI, R12, R13, R14, R15];

/// The x86-64 register file, parameterized over the save lists of the
/// active calling convention.
pub struct X64RegInfo {
    caller_saved: &'static [Reg],
    callee_saved: &'static [Reg],
}

/// The SysV flavor (Linux, macOS).
pub static SYSV: X64RegInfo = X64RegInfo {
    caller_saved: SYSV_CALLER_SAVED,
    callee_saved: SYSV_CALLEE_SAVED,
};

/// The Win64 flavor.
pub static WIN64: X64RegInfo = X64RegInfo {
    caller_saved: WIN64_CALLER_SAVED,
    callee_saved: WIN64_CALLEE_SAVED,
};

impl RegisterInfo for X64RegInfo {
    fn desc(&self, reg: Reg) -> &RegisterDesc {
        &DESCS[reg.0 as usize]
    }

    fn num_regs(&self) -> usize {
        DESCS.len()
    }

    fn class(&self, class: u32) -> &RegisterClassData {
        &CLASSES[class as usize]
    }

    fn num_classes(&self) -> usize {
        CLASSES.len()
    }

    fn class_for_type(&self, types: &TypeStore, layout: &DataLayout, ty: Type) -> u32 {
        if types.is_float(ty) {
            return class::FPR;
        }
        match layout.size_of(types, ty) {
            1 => class::GPR8,
            2 => class::GPR16,
            4 => class::GPR32,
            _ => class::GPR64,
        }
    }

    fn fp_class(&self) -> u32 {
        class::FPR
    }

    fn caller_saved(&self) -> &'static [Reg] {
        self.caller_saved
    }

    fn callee_saved(&self) -> &'static [Reg] {
        self.callee_saved
    }

    fn reserved(&self, class: u32) -> &'static [Reg] {
        match class {
            class::GPR64 => RESERVED_GPR64,
            class::GPR32 => RESERVED_GPR32,
            class::GPR16 => RESERVED_GPR16,
            class::GPR8 => RESERVED_GPR8,
            _ => RESERVED_FPR,
        }
    }

    fn available(&self, class: u32) -> &'static [Reg] {
        match class {
            class::GPR64 => AVAILABLE_GPR64,
            class::GPR32 => AVAILABLE_GPR32,
            class::GPR16 => AVAILABLE_GPR16,
            class::GPR8 => AVAILABLE_GPR8,
            _ => AVAILABLE_FPR,
        }
    }
}

/// The reserved address scratch register.
pub const SCRATCH: Reg = R11;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_aliases() {
        let ri = &SYSV;
        assert_eq!(ri.with_size(RAX, 4), Some(EAX));
        assert_eq!(ri.with_size(EAX, 8), Some(RAX));
        assert_eq!(ri.with_size(R9, 1), Some(R9B));
        assert_eq!(ri.with_size(RAX, 8), Some(RAX));
        assert_eq!(ri.with_size(XMM3, 8), Some(XMM3));
    }

    #[test]
    fn alias_identity() {
        let ri = &SYSV;
        assert!(ri.is_same_register(RAX, EAX));
        assert!(ri.is_same_register(AL, RAX));
        assert!(!ri.is_same_register(RAX, RBX));
        assert_eq!(ri.canonical(EAX), RAX);
        assert_eq!(ri.canonical(RAX), RAX);
    }
}
