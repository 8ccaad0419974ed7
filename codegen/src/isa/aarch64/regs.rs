//! AArch64 register file.

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
    X0 = 0; X1 = 1; X2 = 2; X3 = 3; X4 = 4; X5 = 5; X6 = 6; X7 = 7;
    X8 = 8; X9 = 9; X10 = 10; X11 = 11; X12 = 12; X13 = 13; X14 = 14; X15 = 15;
    X16 = 16; X17 = 17; X18 = 18; X19 = 19; X20 = 20; X21 = 21; X22 = 22; X23 = 23;
    X24 = 24; X25 = 25; X26 = 26; X27 = 27; X28 = 28; X29 = 29; X30 = 30;
    SP = 31; XZR = 32;

    W0 = 33; W1 = 34; W2 = 35; W3 = 36; W4 = 37; W5 = 38; W6 = 39; W7 = 40;
    W8 = 41; W9 = 42; W10 = 43; W11 = 44; W12 = 45; W13 = 46; W14 = 47; W15 = 48;
    W16 = 49; W17 = 50; W18 = 51; W19 = 52; W20 = 53; W21 = 54; W22 = 55; W23 = 56;
    W24 = 57; W25 = 58; W26 = 59; W27 = 60; W28 = 61; W29 = 62; W30 = 63;
    WSP = 64; WZR = 65;

    D0 = 66; D1 = 67; D2 = 68; D3 = 69; D4 = 70; D5 = 71; D6 = 72; D7 = 73;
    D8 = 74; D9 = 75; D10 = 76; D11 = 77; D12 = 78; D13 = 79; D14 = 80; D15 = 81;
    D16 = 82; D17 = 83; D18 = 84; D19 = 85; D20 = 86; D21 = 87; D22 = 88; D23 = 89;
    D24 = 90; D25 = 91; D26 = 92; D27 = 93; D28 = 94; D29 = 95; D30 = 96; D31 = 97;

    S0 = 98; S1 = 99; S2 = 100; S3 = 101; S4 = 102; S5 = 103; S6 = 104; S7 = 105;
    S8 = 106; S9 = 107; S10 = 108; S11 = 109; S12 = 110; S13 = 111; S14 = 112;
    S15 = 113; S16 = 114; S17 = 115; S18 = 116; S19 = 117; S20 = 118; S21 = 119;
    S22 = 120; S23 = 121; S24 = 122; S25 = 123; S26 = 124; S27 = 125; S28 = 126;
    S29 = 127; S30 = 128; S31 = 129;
}

/// Register classes of this target.
#[allow(missing_docs)]
pub mod class {
    pub const GPR64: u32 = 0;
    pub const GPR32: u32 = 1;
    pub const FPR64: u32 = 2;
    pub const FPR32: u32 = 3;
}

/// The intraprocedural scratch registers, kept out of allocation.
pub const SCRATCH: Reg = X16;
/// Second scratch, for sequences needing two temporaries.
pub const SCRATCH2: Reg = X17;

const NUM_REGS: usize = 130;

fn build_descs() -> Vec<RegisterDesc> {
    const X_NAMES: [&str; 31] = [
        "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12",
        "x13", "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23",
        "x24", "x25", "x26", "x27", "x28", "x29", "x30",
    ];
    const W_NAMES: [&str; 31] = [
        "w0", "w1", "w2", "w3", "w4", "w5", "w6", "w7", "w8", "w9", "w10", "w11", "w12",
        "w13", "w14", "w15", "w16", "w17", "w18", "w19", "w20", "w21", "w22", "w23",
        "w24", "w25", "w26", "w27", "w28", "w29", "w30",
    ];
    const D_NAMES: [&str; 32] = [
        "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9", "d10", "d11", "d12",
        "d13", "d14", "d15", "d16", "d17", "d18", "d19", "d20", "d21", "d22", "d23",
        "d24", "d25", "d26", "d27", "d28", "d29", "d30", "d31",
    ];
    const S_NAMES: [&str; 32] = [
        "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "s12",
        "s13", "s14", "s15", "s16", "s17", "s18", "s19", "s20", "s21", "s22", "s23",
        "s24", "s25", "s26", "s27", "s28", "s29", "s30", "s31",
    ];

    // Alias slices are leaked once at startup; the tables live for the
    // program's lifetime like their x86-64 counterparts.
    let mut descs = Vec::with_capacity(NUM_REGS);
    for i in 0..31 {
        descs.push(RegisterDesc {
            name: X_NAMES[i],
            class: class::GPR64,
            aliases: Vec::leak(vec![Reg(33 + i as u32)]),
        });
    }
    descs.push(RegisterDesc {
        name: "sp",
        class: class::GPR64,
        aliases: Vec::leak(vec![WSP]),
    });
    descs.push(RegisterDesc {
        name: "xzr",
        class: class::GPR64,
        aliases: Vec::leak(vec![WZR]),
    });
    for i in 0..31 {
        descs.push(RegisterDesc {
            name: W_NAMES[i],
            class: class::GPR32,
            aliases: Vec::leak(vec![Reg(i as u32)]),
        });
    }
    descs.push(RegisterDesc {
        name: "wsp",
        class: class::GPR32,
        aliases: Vec::leak(vec![SP]),
    });
    descs.push(RegisterDesc {
        name: "wzr",
        class: class::GPR32,
        aliases: Vec::leak(vec![XZR]),
    });
    for i in 0..32 {
        descs.push(RegisterDesc {
            name: D_NAMES[i],
            class: class::FPR64,
            aliases: Vec::leak(vec![Reg(98 + i as u32)]),
        });
    }
    for i in 0..32 {
        descs.push(RegisterDesc {
            name: S_NAMES[i],
            class: class::FPR32,
            aliases: Vec::leak(vec![Reg(66 + i as u32)]),
        });
    }
    descs
}

fn descs() -> &'static [RegisterDesc] {
    use std::sync::OnceLock;
    static DESCS: OnceLock<Vec<RegisterDesc>> = OnceLock::new();
    DESCS.get_or_init(build_descs)
}

static GPR64_REGS: &[Reg] = &[
    X0, X1, X2, X3, X4, X5, X6, X7, X8, X9, X10, X11, X12, X13, X14, X15, X16, X17, X18,
    X19, X20, X21, X22, X23, X24, X25, X26, X27, X28, X29, X30, SP, XZR,
];
static GPR32_REGS: &[Reg] = &[
    W0, W1, W2, W3, W4, W5, W6, W7, W8, W9, W10, W11, W12, W13, W14, W15, W16, W17, W18,
    W19, W20, W21, W22, W23, W24, W25, W26, W27, W28, W29, W30, WSP, WZR,
];
static FPR64_REGS: &[Reg] = &[
    D0, D1, D2, D3, D4, D5, D6, D7, D8, D9, D10, D11, D12, D13, D14, D15, D16, D17, D18,
    D19, D20, D21, D22, D23, D24, D25, D26, D27, D28, D29, D30, D31,
];
static FPR32_REGS: &[Reg] = &[
    S0, S1, S2, S3, S4, S5, S6, S7, S8, S9, S10, S11, S12, S13, S14, S15, S16, S17, S18,
    S19, S20, S21, S22, S23, S24, S25, S26, S27, S28, S29, S30, S31,
];

static CLASSES: &[RegisterClassData] = &[
    RegisterClassData {
        regs: GPR64_REGS,
        size: 8,
        align: 8,
    },
    RegisterClassData {
        regs: GPR32_REGS,
        size: 4,
        align: 4,
    },
    RegisterClassData {
        regs: FPR64_REGS,
        size: 8,
        align: 8,
    },
    RegisterClassData {
        regs: FPR32_REGS,
        size: 4,
        align: 4,
    },
];

static AVAILABLE_GPR64: &[Reg] = &[
    X0, X1, X2, X3, X4, X5, X6, X7, X8, X9, X10, X11, X12, X13, X14, X15, X19, X20, X21,
    X22, X23, X24, X25, X26, X27, X28,
];
static AVAILABLE_GPR32: &[Reg] = &[
    W0, W1, W2, W3, W4, W5, W6, W7, W8, W9, W10, W11, W12, W13, W14, W15, W19, W20, W21,
    W22, W23, W24, W25, W26, W27, W28,
];
static AVAILABLE_FPR64: &[Reg] = &[
    D0, D1, D2, D3, D4, D5, D6, D7, D8, D9, D10, D11, D12, D13, D14, D15, D16, D17, D18,
    D19, D20, D21, D22, D23, D24, D25, D26, D27, D28, D29, D30, D31,
];
static AVAILABLE_FPR32: &[Reg] = &[
    S0, S1, S2, S3, S4, S5, S6, S7, S8, S9, S10, S11, S12, S13, S14, S15, S16, S17, S18,
    S19, S20, S21, S22, S23, S24, S25, S26, S27, S28, S29, S30, S31,
];

static RESERVED_GPR64: &[Reg] = &[SP, XZR, X16, X17, X18, X29, X30];
static RESERVED_GPR32: &[Reg] = &[WSP, WZR, W16, W17, W18, W29, W30];
static RESERVED_FPR: &[Reg] = &[];

static CALLER_SAVED: &[Reg] = &[
    X0, X1, X2, X3, X4, X5, X6, X7, X8, X9, X10, X11, X12, X13, X14, X15, D0, D1, D2,
    D3, D4, D5, D6, D7, D16, D17, D18, D19, D20, D21, D22, D23, D24, D25, D26, D27,
    D28, D29, D30, D31,
];
static CALLEE_SAVED: &[Reg] = &[
    X19, X20, X21, X22, X23, X24, X25, X26, X27, X28, D8, D9, D10, D11, D12, D13, D14,
    D15,
];

/// The AArch64 register file.
pub struct A64RegInfo;

/// The single AAPCS64 instance.
pub static AAPCS64: A64RegInfo = A64RegInfo;

impl RegisterInfo for A64RegInfo {
    fn desc(&self, reg: Reg) -> &RegisterDesc {
        &descs()[reg.0 as usize]
    }

    fn num_regs(&self) -> usize {
        NUM_REGS
    }

    fn class(&self, class: u32) -> &RegisterClassData {
        &CLASSES[class as usize]
    }

    fn num_classes(&self) -> usize {
        CLASSES.len()
    }

    fn class_for_type(&self, types: &TypeStore, layout: &DataLayout, ty: Type) -> u32 {
        if types.is_float(ty) {
            return if layout.size_of(types, ty) == 4 {
                class::FPR32
            } else {
                class::FPR64
            };
        }
        if layout.size_of(types, ty) == 8 {
            class::GPR64
        } else {
            class::GPR32
        }
    }

    fn fp_class(&self) -> u32 {
        class::FPR64
    }

    fn is_fp_class(&self, class: u32) -> bool {
        class == self::class::FPR64 || class == self::class::FPR32
    }

    fn caller_saved(&self) -> &'static [Reg] {
        CALLER_SAVED
    }

    fn callee_saved(&self) -> &'static [Reg] {
        CALLEE_SAVED
    }

    fn reserved(&self, class: u32) -> &'static [Reg] {
        match class {
            self::class::GPR64 => RESERVED_GPR64,
            self::class::GPR32 => RESERVED_GPR32,
            _ => RESERVED_FPR,
        }
    }

    fn available(&self, class: u32) -> &'static [Reg] {
        match class {
            self::class::GPR64 => AVAILABLE_GPR64,
            self::class::GPR32 => AVAILABLE_GPR32,
            self::class::FPR64 => AVAILABLE_FPR64,
            _ => AVAILABLE_FPR32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_aliases() {
        let ri = &AAPCS64;
        assert_eq!(ri.with_size(X0, 4), Some(W0));
        assert_eq!(ri.with_size(W5, 8), Some(X5));
        assert_eq!(ri.with_size(D3, 4), Some(S3));
        assert_eq!(ri.with_size(S7, 8), Some(D7));
    }

    #[test]
    fn alias_identity() {
        let ri = &AAPCS64;
        assert!(ri.is_same_register(X1, W1));
        assert!(!ri.is_same_register(X1, X2));
        assert_eq!(ri.canonical(W4), X4);
        assert_eq!(ri.canonical(S9), D9);
    }
}
